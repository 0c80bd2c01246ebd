//! # fairq Server
//!
//! Runs the scheduler, both result listeners and the housekeeper against
//! PostgreSQL and RabbitMQ until Ctrl+C or SIGTERM.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use fairq_core::config::ConfigManager;
use fairq_core::constants::NOTIFICATION_CHANNEL_CAPACITY;
use fairq_core::domain::BroadcastNotificationSink;
use fairq_core::logging::init_structured_logging;
use fairq_core::orchestration::ProcessingSystem;

#[tokio::main]
async fn main() -> Result<()> {
    init_structured_logging();

    let manager = ConfigManager::load()?;
    info!(
        environment = manager.environment(),
        config_directory = %manager.config_directory().display(),
        "Configuration loaded"
    );

    let sink = Arc::new(BroadcastNotificationSink::new(NOTIFICATION_CHANNEL_CAPACITY));
    spawn_notification_log(&sink);

    let system = ProcessingSystem::connect(manager.config().clone(), sink).await?;
    let handle = system.start().await?;

    info!("🔄 fairq running... Press Ctrl+C to shutdown gracefully");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, initiating graceful shutdown...");
        }
        result = wait_for_sigterm() => {
            match result {
                Ok(_) => info!("🛑 Received SIGTERM, initiating graceful shutdown..."),
                Err(e) => warn!("⚠️  Error setting up SIGTERM handler: {}", e),
            }
        }
    }

    handle.shutdown().await?;
    info!("✅ fairq shutdown complete");

    Ok(())
}

/// Log pushed notifications until a push transport subscribes
fn spawn_notification_log(sink: &BroadcastNotificationSink) {
    let mut receiver = sink.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(pushed) => debug!(
                    tenant_id = %pushed.tenant_id,
                    destination = %pushed.destination,
                    "Notification pushed"
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Notification log fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Wait for SIGTERM signal (for container deployments)
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
