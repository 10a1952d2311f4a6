//! TransitFlow notification worker binary

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transitflow_core::{BrokerConfig, NotificationHandler};
use transitflow_worker::{AuditLogHandler, EmailHandler, NotificationConsumer};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "transitflow_worker=info,transitflow_broker=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match BrokerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid broker configuration");
            std::process::exit(1);
        }
    };

    let handlers: Vec<Arc<dyn NotificationHandler>> =
        vec![Arc::new(EmailHandler), Arc::new(AuditLogHandler)];

    let consumer = NotificationConsumer::new(config, handlers);
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_token.cancel();
        }
    });

    let worker = tokio::spawn(async move { consumer.run(shutdown).await });

    match worker.await {
        Ok(Ok(())) => info!("Worker stopped"),
        Ok(Err(e)) => {
            // Terminal for this run; the process supervisor restarts us.
            error!(error = %e, "Worker run failed");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "Worker task panicked");
            std::process::exit(1);
        }
    }
}
