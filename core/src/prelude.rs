//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types from the transitflow-core crate.

pub use crate::config::{BrokerConfig, RETRY_COUNT_HEADER};
pub use crate::errors::NotifyError;
pub use crate::event::NotificationEvent;
pub use crate::handler::NotificationHandler;
