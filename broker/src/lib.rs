//! Producer-side broker plumbing for the TransitFlow notification pipeline
//!
//! Provides the shared connection cell used by both sides of the pipeline
//! and the publisher invoked by the request-handling path, supporting:
//! - Durable direct exchange and queue with a fixed binding
//! - Message persistence
//! - Dead letter exchange for undeliverable messages
//! - Publisher confirms

pub mod connection;
pub mod publisher;
pub mod prelude;

pub use connection::{declare_topology, BrokerConnection};
pub use publisher::NotificationPublisher;
