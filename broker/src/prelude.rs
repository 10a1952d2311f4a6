//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types from the transitflow-broker crate.

pub use crate::connection::{declare_topology, BrokerConnection};
pub use crate::publisher::NotificationPublisher;
