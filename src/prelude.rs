//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types across the pipeline crates.

pub use transitflow_broker::prelude::*;
pub use transitflow_core::prelude::*;
pub use transitflow_worker::{AuditLogHandler, EmailHandler, NotificationConsumer};
