//! Lazily-established, shared broker connection cell

use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel, Connection, ConnectionProperties, ExchangeKind,
};
use tokio::sync::RwLock;
use tracing::{info, warn};

use transitflow_core::{BrokerConfig, NotifyError};

struct ChannelPair {
    connection: Connection,
    channel: Channel,
}

impl ChannelPair {
    fn is_open(&self) -> bool {
        self.connection.status().connected() && self.channel.status().connected()
    }
}

/// Thread-safe cell owning one connection/channel pair.
///
/// The pair is established on first use and re-established on demand when
/// either side reports closed. Concurrent callers on the fast path share a
/// read lock; reconnection is serialized behind the write lock with a
/// re-check so only one caller pays for it. The raw connection and channel
/// are never exposed — only a cloned [`Channel`] handle.
pub struct BrokerConnection {
    config: BrokerConfig,
    state: RwLock<Option<ChannelPair>>,
}

impl BrokerConnection {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Return an open channel, connecting and declaring the topology first
    /// if needed.
    ///
    /// Connect failures propagate to the caller; no internal retry and no
    /// cached failure state — the next call attempts again.
    pub async fn ensure(&self) -> Result<Channel, NotifyError> {
        {
            let state = self.state.read().await;
            if let Some(pair) = state.as_ref() {
                if pair.is_open() {
                    return Ok(pair.channel.clone());
                }
            }
        }

        let mut state = self.state.write().await;

        // Another caller may have reconnected while we waited for the lock.
        if let Some(pair) = state.as_ref() {
            if pair.is_open() {
                return Ok(pair.channel.clone());
            }
        }

        if let Some(stale) = state.take() {
            let _ = stale.connection.close(200, "stale connection").await;
        }

        let connection = Connection::connect(&self.config.url(), ConnectionProperties::default())
            .await
            .map_err(|e| {
                NotifyError::Connection(format!(
                    "failed to connect to broker at {}:{}: {}",
                    self.config.host, self.config.port, e
                ))
            })?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| NotifyError::Connection(format!("channel creation failed: {}", e)))?;

        declare_topology(&channel, &self.config).await?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            exchange = %self.config.exchange,
            queue = %self.config.queue,
            "Connected to broker"
        );

        *state = Some(ChannelPair {
            connection,
            channel: channel.clone(),
        });

        Ok(channel)
    }

    /// Close and release the pair. Safe to call when never connected.
    pub async fn close(&self) {
        let mut state = self.state.write().await;

        if let Some(pair) = state.take() {
            if let Err(e) = pair.channel.close(200, "normal shutdown").await {
                warn!(error = %e, "Failed to close channel gracefully");
            }
            if let Err(e) = pair.connection.close(200, "normal shutdown").await {
                warn!(error = %e, "Failed to close connection gracefully");
            }
        }
    }
}

/// Declare the exchange/queue/binding topology, including the dead letter
/// side when configured.
///
/// Every declaration is idempotent; the publisher and the worker both call
/// this with identical parameters since either side may start first.
pub async fn declare_topology(channel: &Channel, config: &BrokerConfig) -> Result<(), NotifyError> {
    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| NotifyError::Connection(format!("exchange declaration failed: {}", e)))?;

    let mut queue_arguments = FieldTable::default();

    if let Some(dlx) = &config.dead_letter_exchange {
        channel
            .exchange_declare(
                dlx,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                NotifyError::Connection(format!("dead letter exchange declaration failed: {}", e))
            })?;

        channel
            .queue_declare(
                &config.dead_letter_queue(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                NotifyError::Connection(format!("dead letter queue declaration failed: {}", e))
            })?;

        channel
            .queue_bind(
                &config.dead_letter_queue(),
                dlx,
                &config.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                NotifyError::Connection(format!("dead letter queue bind failed: {}", e))
            })?;

        queue_arguments.insert(
            "x-dead-letter-exchange".into(),
            lapin::types::AMQPValue::LongString(dlx.clone().into()),
        );
    }

    channel
        .queue_declare(
            &config.queue,
            QueueDeclareOptions {
                durable: true,
                exclusive: false,
                auto_delete: false,
                ..Default::default()
            },
            queue_arguments,
        )
        .await
        .map_err(|e| NotifyError::Connection(format!("queue declaration failed: {}", e)))?;

    channel
        .queue_bind(
            &config.queue,
            &config.exchange,
            &config.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| NotifyError::Connection(format!("queue bind failed: {}", e)))?;

    Ok(())
}
