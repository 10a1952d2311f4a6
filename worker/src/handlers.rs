//! Side-effecting handlers run by the worker for every delivery

use async_trait::async_trait;
use tokio::time::Duration;
use tracing::info;

use transitflow_core::{NotificationEvent, NotificationHandler, NotifyError};

/// Dispatches an email for the notification.
///
/// The SMTP round-trip is currently simulated with a short delay; the real
/// dispatch is wired in at deployment time.
pub struct EmailHandler;

#[async_trait]
impl NotificationHandler for EmailHandler {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn handle(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!(
            notification_id = event.notification_id,
            title = %event.title,
            "Email notification sent"
        );

        Ok(())
    }
}

/// Writes a structured audit record for the notification.
pub struct AuditLogHandler;

#[async_trait]
impl NotificationHandler for AuditLogHandler {
    fn name(&self) -> &'static str {
        "audit-log"
    }

    async fn handle(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        tokio::time::sleep(Duration::from_millis(50)).await;

        let recipient = match event.user_id {
            Some(user_id) => user_id.to_string(),
            None => "broadcast".to_string(),
        };

        info!(
            notification_id = event.notification_id,
            title = %event.title,
            kind = %event.kind,
            recipient = %recipient,
            "Notification recorded"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn email_handler_succeeds() {
        let event = NotificationEvent::created(1, "Delay", "Line 5 delayed 10 min", "alert", Some(42));
        assert!(EmailHandler.handle(&event).await.is_ok());
    }

    #[tokio::test]
    async fn audit_handler_accepts_broadcast_copy() {
        let event = NotificationEvent::broadcast(2, "Notice", "Schedule change", "info");
        assert!(AuditLogHandler.handle(&event).await.is_ok());
    }
}
