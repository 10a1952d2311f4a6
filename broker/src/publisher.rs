//! Publisher invoked by the request-handling path after a notification row
//! is durably persisted

use std::sync::Arc;

use lapin::{options::BasicPublishOptions, BasicProperties};
use tracing::{error, info};

use transitflow_core::{BrokerConfig, NotificationEvent, NotifyError};

use crate::connection::BrokerConnection;

/// Persistent delivery mode per AMQP 0.9.1.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Serializes notification events and hands them to the broker.
///
/// The fallible `publish_*` methods surface the delivery outcome; the
/// `*_best_effort` variants keep the back office's fire-and-forget contract,
/// logging failures instead of returning them. A persisted notification row
/// whose publish fails is not retried from this side.
pub struct NotificationPublisher {
    connection: Arc<BrokerConnection>,
}

impl NotificationPublisher {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            connection: Arc::new(BrokerConnection::new(config)),
        }
    }

    /// Build a publisher over an existing connection cell, sharing it with
    /// other publishers in the same process.
    pub fn with_connection(connection: Arc<BrokerConnection>) -> Self {
        Self { connection }
    }

    /// Publish that notification `notification_id` was created for
    /// `user_id` (or with no target user when `None`).
    pub async fn publish_created(
        &self,
        notification_id: i64,
        title: &str,
        message: &str,
        kind: &str,
        user_id: Option<i64>,
    ) -> Result<(), NotifyError> {
        let event = NotificationEvent::created(notification_id, title, message, kind, user_id);
        self.publish(event).await
    }

    /// Publish that notification `notification_id` is a broadcast
    /// announcement.
    ///
    /// The back office currently expands broadcasts into one row and one
    /// `publish_created` per active user, so this path is not exercised by
    /// the default flow; it is kept for a future single-event fan-out.
    pub async fn publish_broadcast(
        &self,
        notification_id: i64,
        title: &str,
        message: &str,
        kind: &str,
    ) -> Result<(), NotifyError> {
        let event = NotificationEvent::broadcast(notification_id, title, message, kind);
        self.publish(event).await
    }

    /// Fire-and-forget variant of [`publish_created`](Self::publish_created):
    /// failures are logged and swallowed, never surfaced to the caller.
    pub async fn publish_created_best_effort(
        &self,
        notification_id: i64,
        title: &str,
        message: &str,
        kind: &str,
        user_id: Option<i64>,
    ) {
        if let Err(e) = self
            .publish_created(notification_id, title, message, kind, user_id)
            .await
        {
            error!(notification_id, error = %e, "Failed to publish notification event");
        }
    }

    /// Fire-and-forget variant of [`publish_broadcast`](Self::publish_broadcast).
    pub async fn publish_broadcast_best_effort(
        &self,
        notification_id: i64,
        title: &str,
        message: &str,
        kind: &str,
    ) {
        if let Err(e) = self
            .publish_broadcast(notification_id, title, message, kind)
            .await
        {
            error!(notification_id, error = %e, "Failed to publish broadcast notification event");
        }
    }

    async fn publish(&self, event: NotificationEvent) -> Result<(), NotifyError> {
        let channel = self.connection.ensure().await?;
        let config = self.connection.config();

        let payload = serde_json::to_vec(&event)?;

        let properties = BasicProperties::default()
            .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
            .with_content_type("application/json".into());

        channel
            .basic_publish(
                &config.exchange,
                &config.routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await
            .map_err(|e| {
                error!(
                    exchange = %config.exchange,
                    routing_key = %config.routing_key,
                    notification_id = event.notification_id,
                    error = %e,
                    "Failed to publish to broker"
                );
                NotifyError::Publish(format!("publish failed: {}", e))
            })?
            .await
            .map_err(|e| {
                error!(
                    exchange = %config.exchange,
                    routing_key = %config.routing_key,
                    notification_id = event.notification_id,
                    error = %e,
                    "Failed to confirm publish"
                );
                NotifyError::Publish(format!("publish confirmation failed: {}", e))
            })?;

        info!(
            exchange = %config.exchange,
            routing_key = %config.routing_key,
            notification_id = event.notification_id,
            broadcast = event.is_broadcast,
            "Notification event published"
        );

        Ok(())
    }
}
