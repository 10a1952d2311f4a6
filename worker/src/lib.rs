//! Background worker for the TransitFlow notification pipeline
//!
//! Drains `notification_queue` one delivery at a time, runs the
//! side-effecting handler pipeline, and acknowledges only after successful
//! processing. Failed deliveries are retried a bounded number of times and
//! then dead-lettered.

pub mod consumer;
pub mod handlers;

pub use consumer::NotificationConsumer;
pub use handlers::{AuditLogHandler, EmailHandler};
