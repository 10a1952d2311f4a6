//! Queue consumer with bounded retry and dead-lettering

use std::sync::Arc;

use futures_util::stream::StreamExt;
use lapin::{
    message::Delivery,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel,
};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use transitflow_broker::BrokerConnection;
use transitflow_core::config::RETRY_COUNT_HEADER;
use transitflow_core::{BrokerConfig, NotificationEvent, NotificationHandler, NotifyError};

/// Persistent delivery mode per AMQP 0.9.1.
const DELIVERY_MODE_PERSISTENT: u8 = 2;

/// Long-running consumer draining the notification queue.
///
/// Owns its own connection cell, never shared with any publisher. With the
/// default prefetch of 1 the broker hands over one delivery at a time in
/// enqueue order, so a failure isolates to a single message.
pub struct NotificationConsumer {
    connection: BrokerConnection,
    handlers: Vec<Arc<dyn NotificationHandler>>,
}

impl NotificationConsumer {
    pub fn new(config: BrokerConfig, handlers: Vec<Arc<dyn NotificationHandler>>) -> Self {
        Self {
            connection: BrokerConnection::new(config),
            handlers,
        }
    }

    /// Run until `shutdown` is cancelled or the run fails.
    ///
    /// A connect or setup failure is terminal for this run: it is returned
    /// after teardown, and the process supervisor is the retry mechanism.
    /// Teardown always closes the connection, on the error path included.
    /// In-flight deliveries are never force-acked, so a kill mid-handler
    /// redelivers on the next start.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), NotifyError> {
        let startup_delay = self.connection.config().startup_delay_ms;
        if startup_delay > 0 {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_millis(startup_delay)) => {}
            }
        }

        let result = self.consume(&shutdown).await;
        self.connection.close().await;
        result
    }

    async fn consume(&self, shutdown: &CancellationToken) -> Result<(), NotifyError> {
        let channel = self.connection.ensure().await?;
        let config = self.connection.config();

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| NotifyError::Consume(format!("QoS setup failed: {}", e)))?;

        let consumer_tag = format!("notification-worker-{}", Uuid::new_v4());

        let mut consumer = channel
            .basic_consume(
                &config.queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| NotifyError::Consume(format!("consume setup failed: {}", e)))?;

        info!(
            queue = %config.queue,
            consumer_tag = %consumer_tag,
            prefetch = config.prefetch_count,
            "Worker started and waiting for messages"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping consumer");
                    break;
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => self.process(&channel, delivery).await,
                        Some(Err(e)) => error!(error = %e, "Consumer stream error"),
                        None => {
                            warn!("Delivery stream ended, stopping consumer");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn process(&self, channel: &Channel, delivery: Delivery) {
        let event: NotificationEvent = match serde_json::from_slice(&delivery.data) {
            Ok(event) => event,
            Err(e) => {
                // Undeserializable payloads can never succeed; route them to
                // the dead letter queue instead of redelivering.
                error!(error = %e, "Failed to deserialize notification event, dead-lettering");
                self.reject(delivery).await;
                return;
            }
        };

        info!(
            notification_id = event.notification_id,
            title = %event.title,
            redelivered = delivery.redelivered,
            "Processing notification"
        );

        match self.run_handlers(&event).await {
            Ok(()) => {
                if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                    error!(
                        notification_id = event.notification_id,
                        error = %e,
                        "Failed to ack delivery"
                    );
                } else {
                    info!(
                        notification_id = event.notification_id,
                        "Successfully processed notification"
                    );
                }
            }
            Err(e) => {
                error!(
                    notification_id = event.notification_id,
                    error = %e,
                    "Handler pipeline failed"
                );
                self.retry_or_dead_letter(channel, delivery, &event).await;
            }
        }
    }

    async fn run_handlers(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        for handler in &self.handlers {
            handler
                .handle(event)
                .await
                .map_err(|e| NotifyError::Handler(format!("{}: {}", handler.name(), e)))?;
        }
        Ok(())
    }

    /// Bounded retry: republish the payload with an incremented
    /// `x-retry-count` header and ack the original, or dead-letter once the
    /// attempt cap is reached. A plain requeue cannot carry an attempt
    /// counter, which is why failed deliveries are republished instead.
    async fn retry_or_dead_letter(
        &self,
        channel: &Channel,
        delivery: Delivery,
        event: &NotificationEvent,
    ) {
        let config = self.connection.config();
        let attempts = retry_count(&delivery.properties) + 1;

        if attempts < config.max_delivery_attempts {
            match self.republish(channel, &delivery.data, attempts).await {
                Ok(()) => {
                    info!(
                        notification_id = event.notification_id,
                        attempts, "Delivery requeued for retry"
                    );
                    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
                        error!(error = %e, "Failed to ack delivery after requeue");
                    }
                }
                Err(e) => {
                    // Could not requeue; hand the unit back to the broker
                    // unchanged rather than lose it.
                    error!(error = %e, "Failed to requeue delivery, returning it to the broker");
                    let _ = delivery
                        .nack(BasicNackOptions {
                            requeue: true,
                            ..Default::default()
                        })
                        .await;
                }
            }
        } else {
            warn!(
                notification_id = event.notification_id,
                attempts, "Delivery attempts exhausted, dead-lettering"
            );
            self.reject(delivery).await;
        }
    }

    /// Nack without requeue; the broker routes the unit to the dead letter
    /// exchange when one is bound.
    async fn reject(&self, delivery: Delivery) {
        if let Err(e) = delivery
            .nack(BasicNackOptions {
                requeue: false,
                ..Default::default()
            })
            .await
        {
            error!(error = %e, "Failed to nack delivery");
        }
    }

    async fn republish(
        &self,
        channel: &Channel,
        payload: &[u8],
        attempts: u32,
    ) -> Result<(), NotifyError> {
        let config = self.connection.config();

        channel
            .basic_publish(
                &config.exchange,
                &config.routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(DELIVERY_MODE_PERSISTENT)
                    .with_content_type("application/json".into())
                    .with_headers(retry_headers(attempts)),
            )
            .await
            .map_err(|e| NotifyError::Publish(format!("requeue publish failed: {}", e)))?
            .await
            .map_err(|e| NotifyError::Publish(format!("requeue confirmation failed: {}", e)))?;

        Ok(())
    }
}

/// Completed delivery attempts recorded on the message; absent means none.
fn retry_count(properties: &BasicProperties) -> u32 {
    properties
        .headers()
        .as_ref()
        .and_then(|headers| {
            headers
                .inner()
                .iter()
                .find(|(name, _)| name.as_str() == RETRY_COUNT_HEADER)
                .map(|(_, value)| value)
        })
        .and_then(|value| match value {
            AMQPValue::LongInt(v) => Some(*v as u32),
            AMQPValue::LongUInt(v) => Some(*v),
            AMQPValue::LongLongInt(v) => Some(*v as u32),
            _ => None,
        })
        .unwrap_or(0)
}

fn retry_headers(attempts: u32) -> FieldTable {
    let mut headers = FieldTable::default();
    headers.insert(
        RETRY_COUNT_HEADER.into(),
        AMQPValue::LongInt(attempts as i32),
    );
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingHandler {
        calls: AtomicU32,
        fail_first: bool,
    }

    impl CountingHandler {
        fn new(fail_first: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                fail_first,
            })
        }
    }

    #[async_trait]
    impl NotificationHandler for CountingHandler {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _event: &NotificationEvent) -> Result<(), NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && call == 0 {
                return Err(NotifyError::Handler("transient failure".to_string()));
            }
            Ok(())
        }
    }

    fn consumer_with(handlers: Vec<Arc<dyn NotificationHandler>>) -> NotificationConsumer {
        NotificationConsumer::new(BrokerConfig::default(), handlers)
    }

    #[test]
    fn retry_count_defaults_to_zero_without_headers() {
        assert_eq!(retry_count(&BasicProperties::default()), 0);
    }

    #[test]
    fn retry_count_reads_back_written_header() {
        let properties = BasicProperties::default().with_headers(retry_headers(2));
        assert_eq!(retry_count(&properties), 2);
    }

    #[test]
    fn retry_count_ignores_non_numeric_header() {
        let mut headers = FieldTable::default();
        headers.insert(
            RETRY_COUNT_HEADER.into(),
            AMQPValue::LongString("two".to_string().into()),
        );
        let properties = BasicProperties::default().with_headers(headers);
        assert_eq!(retry_count(&properties), 0);
    }

    #[tokio::test]
    async fn handler_pipeline_runs_all_handlers() {
        let first = CountingHandler::new(false);
        let second = CountingHandler::new(false);
        let consumer = consumer_with(vec![first.clone(), second.clone()]);

        let event = NotificationEvent::created(1, "t", "m", "info", Some(1));
        consumer.run_handlers(&event).await.unwrap();

        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_pipeline_stops_at_first_failure() {
        let failing = CountingHandler::new(true);
        let never_reached = CountingHandler::new(false);
        let consumer = consumer_with(vec![failing.clone(), never_reached.clone()]);

        let event = NotificationEvent::created(1, "t", "m", "info", Some(1));

        let err = consumer.run_handlers(&event).await.unwrap_err();
        assert!(matches!(err, NotifyError::Handler(_)));
        assert_eq!(never_reached.calls.load(Ordering::SeqCst), 0);

        // The failing handler succeeds on its second attempt.
        consumer.run_handlers(&event).await.unwrap();
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
        assert_eq!(never_reached.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits_startup_delay() {
        let config = BrokerConfig {
            startup_delay_ms: 60_000,
            ..BrokerConfig::default()
        };
        let consumer = NotificationConsumer::new(config, vec![]);

        let shutdown = CancellationToken::new();
        shutdown.cancel();

        // Returns immediately instead of sleeping out the delay.
        consumer.run(shutdown).await.unwrap();
    }
}
