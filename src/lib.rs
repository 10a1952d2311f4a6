//! # TransitFlow Notify
//!
//! Asynchronous notification delivery pipeline for the TransitFlow back
//! office: the request-handling path publishes one event per persisted
//! notification row, an external broker queues it durably, and a background
//! worker drains the queue with at-least-once delivery.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use transitflow_notify::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = BrokerConfig::from_env().expect("broker configuration");
//!     let publisher = NotificationPublisher::new(config);
//!
//!     // Called after the notification row is durably persisted.
//!     publisher
//!         .publish_created_best_effort(42, "Delay", "Line 5 delayed 10 min", "alert", Some(7))
//!         .await;
//! }
//! ```

pub mod prelude;

// Re-export the public surface of the member crates.
pub use transitflow_broker::{declare_topology, BrokerConnection, NotificationPublisher};
pub use transitflow_core::{BrokerConfig, NotificationEvent, NotificationHandler, NotifyError};
pub use transitflow_worker::{AuditLogHandler, EmailHandler, NotificationConsumer};
