//! Handler trait for side-effecting notification processing

use async_trait::async_trait;

use crate::errors::NotifyError;
use crate::event::NotificationEvent;

/// A side-effecting step in the worker's processing pipeline.
///
/// Handlers run in registration order, one delivery at a time. Returning an
/// error fails the whole delivery and triggers the worker's retry policy.
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    /// Handler name used in log lines.
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}
