//! # Processing System Bootstrap
//!
//! Wires the store, broker, artifact repository and notification sink into the
//! scheduler, both result listeners and the housekeeper, and manages their
//! lifecycle as background tasks sharing one `watch` shutdown channel.
//!
//! ```text
//! ProcessingSystem::connect(config, sink)   // Postgres + RabbitMQ
//! ProcessingSystem::assemble(config, ...)   // any backends, e.g. in-memory
//!         │
//!         ▼
//!   system.start()  ──►  ProcessingSystemHandle
//!         ├── scheduler loop
//!         ├── document result listener
//!         ├── transcription result listener
//!         └── housekeeper
//!   handle.shutdown().await
//! ```

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::enqueuer::TaskEnqueuer;
use super::housekeeping::Housekeeper;
use super::lifecycle::TaskLifecycle;
use super::notifications::NotificationDispatcher;
use super::result_consumer::{
    DocumentResultConsumer, ResultHandler, ResultListener, TranscriptionResultConsumer,
};
use super::scheduler::RoundRobinScheduler;
use crate::config::FairqConfig;
use crate::constants::components;
use crate::domain::{
    AccessRegistry, ArtifactRepository, NotificationSink, PgAccessRegistry, PgArtifactRepository,
};
use crate::error::{FairqError, Result};
use crate::logging::log_error;
use crate::messaging::{BrokerProvider, RabbitMqBroker};
use crate::state_machine::TaskState;
use crate::store::{PgTaskStore, TaskStore};

/// Point-in-time view of a running system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemStatus {
    pub broker_provider: &'static str,
    pub broker_healthy: bool,
    pub pending: i64,
    pub dispatching: i64,
    pub cursor_position: u64,
}

pub struct ProcessingSystem {
    config: FairqConfig,
    broker: Arc<BrokerProvider>,
    lifecycle: Arc<TaskLifecycle>,
    enqueuer: Arc<TaskEnqueuer>,
    scheduler: Arc<RoundRobinScheduler>,
    document_listener: Arc<ResultListener<DocumentResultConsumer>>,
    transcription_listener: Arc<ResultListener<TranscriptionResultConsumer>>,
    housekeeper: Arc<Housekeeper>,
}

impl std::fmt::Debug for ProcessingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingSystem")
            .field("broker", &self.broker.provider_name())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl ProcessingSystem {
    /// Connect to Postgres and RabbitMQ, run migrations and wire everything up
    pub async fn connect(config: FairqConfig, sink: Arc<dyn NotificationSink>) -> Result<Self> {
        config.validate()?;

        info!(
            max_connections = config.database.max_connections,
            "Connecting to database"
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .connect(&config.database.url)
            .await?;

        let store = PgTaskStore::new(pool.clone());
        store.migrate().await?;

        let broker =
            RabbitMqBroker::connect(config.rabbitmq.clone(), config.topology.clone()).await?;

        Ok(Self::assemble(
            config,
            Arc::new(store),
            Arc::new(PgArtifactRepository::new(pool.clone())),
            Arc::new(PgAccessRegistry::new(pool)),
            sink,
            Arc::new(BrokerProvider::RabbitMq(broker)),
        ))
    }

    /// Wire collaborators that are already constructed
    pub fn assemble(
        config: FairqConfig,
        store: Arc<dyn TaskStore>,
        artifacts: Arc<dyn ArtifactRepository>,
        access: Arc<dyn AccessRegistry>,
        sink: Arc<dyn NotificationSink>,
        broker: Arc<BrokerProvider>,
    ) -> Self {
        let lifecycle = Arc::new(TaskLifecycle::new(store.clone(), artifacts.clone()));
        let notifications = Arc::new(NotificationDispatcher::new(
            artifacts.clone(),
            access,
            sink,
            config.notifications.delivery_timeout(),
        ));

        let enqueuer = Arc::new(TaskEnqueuer::new(store, artifacts));
        let scheduler = Arc::new(RoundRobinScheduler::new(
            lifecycle.clone(),
            broker.clone(),
            notifications.clone(),
            config.scheduler.clone(),
        ));
        let document_listener = Arc::new(ResultListener::new(
            Arc::new(DocumentResultConsumer::new(
                lifecycle.clone(),
                notifications.clone(),
            )),
            broker.clone(),
            config.consumer.concurrency,
        ));
        let transcription_listener = Arc::new(ResultListener::new(
            Arc::new(TranscriptionResultConsumer::new(
                lifecycle.clone(),
                notifications.clone(),
            )),
            broker.clone(),
            config.consumer.concurrency,
        ));
        let housekeeper = Arc::new(Housekeeper::new(
            lifecycle.clone(),
            notifications,
            config.retention.clone(),
            config.reaper.clone(),
        ));

        Self {
            config,
            broker,
            lifecycle,
            enqueuer,
            scheduler,
            document_listener,
            transcription_listener,
            housekeeper,
        }
    }

    pub fn config(&self) -> &FairqConfig {
        &self.config
    }

    pub fn enqueuer(&self) -> &Arc<TaskEnqueuer> {
        &self.enqueuer
    }

    pub fn scheduler(&self) -> &Arc<RoundRobinScheduler> {
        &self.scheduler
    }

    pub fn document_listener(&self) -> &Arc<ResultListener<DocumentResultConsumer>> {
        &self.document_listener
    }

    pub fn transcription_listener(&self) -> &Arc<ResultListener<TranscriptionResultConsumer>> {
        &self.transcription_listener
    }

    pub fn housekeeper(&self) -> &Arc<Housekeeper> {
        &self.housekeeper
    }

    pub fn lifecycle(&self) -> &Arc<TaskLifecycle> {
        &self.lifecycle
    }

    pub fn broker(&self) -> &Arc<BrokerProvider> {
        &self.broker
    }

    pub async fn status(&self) -> Result<SystemStatus> {
        let store = self.lifecycle.store();
        Ok(SystemStatus {
            broker_provider: self.broker.provider_name(),
            broker_healthy: self.broker.health_check().await?,
            pending: store.count_by_status(TaskState::Pending).await?,
            dispatching: store.count_by_status(TaskState::Dispatching).await?,
            cursor_position: self.scheduler.cursor_position(),
        })
    }

    /// Declare the broker topology and spawn every background loop
    pub async fn start(&self) -> Result<ProcessingSystemHandle> {
        self.broker.declare_topology().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(4);

        let scheduler = self.scheduler.clone();
        let rx = shutdown_rx.clone();
        tasks.push((
            components::SCHEDULER,
            tokio::spawn(async move { scheduler.run(rx).await }),
        ));

        tasks.push(spawn_listener(
            self.document_listener.clone(),
            shutdown_rx.clone(),
        ));
        tasks.push(spawn_listener(
            self.transcription_listener.clone(),
            shutdown_rx.clone(),
        ));

        let housekeeper = self.housekeeper.clone();
        tasks.push((
            components::HOUSEKEEPER,
            tokio::spawn(async move { housekeeper.run(shutdown_rx).await }),
        ));

        info!(
            broker = self.broker.provider_name(),
            tasks = tasks.len(),
            "Processing system started"
        );

        Ok(ProcessingSystemHandle {
            shutdown_tx: Some(shutdown_tx),
            tasks,
        })
    }
}

fn spawn_listener<H: ResultHandler>(
    listener: Arc<ResultListener<H>>,
    shutdown: watch::Receiver<bool>,
) -> (&'static str, JoinHandle<()>) {
    let component = listener.component();
    let handle = tokio::spawn(async move {
        if let Err(e) = listener.run(shutdown).await {
            log_error(component, "run", &e.to_string(), None);
        }
    });
    (component, handle)
}

/// Handle to the spawned background loops
#[derive(Debug)]
pub struct ProcessingSystemHandle {
    shutdown_tx: Option<watch::Sender<bool>>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl ProcessingSystemHandle {
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Signal every loop to stop and wait for all of them to exit
    pub async fn shutdown(mut self) -> Result<()> {
        let Some(sender) = self.shutdown_tx.take() else {
            warn!("Processing system already stopped");
            return Ok(());
        };

        sender.send(true).map_err(|_| {
            FairqError::Orchestration("Failed to send shutdown signal".to_string())
        })?;
        info!("Processing system shutdown requested");

        let mut failures = 0usize;
        for (component, task) in self.tasks.drain(..) {
            if let Err(e) = task.await {
                failures += 1;
                error!(component = component, error = %e, "Background task ended abnormally");
            }
        }

        if failures > 0 {
            return Err(FairqError::Orchestration(format!(
                "{failures} background task(s) ended abnormally"
            )));
        }

        info!("Processing system stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        InMemoryAccessRegistry, InMemoryArtifactRepository, RecordingNotificationSink,
    };
    use crate::messaging::{InMemoryBroker, WorkTopic};
    use crate::models::NewTaskRecord;
    use crate::store::InMemoryTaskStore;

    fn system(broker: InMemoryBroker) -> (Arc<InMemoryArtifactRepository>, ProcessingSystem) {
        let artifacts = Arc::new(InMemoryArtifactRepository::new());
        let mut config = FairqConfig::default();
        config.scheduler.tick_interval_ms = 10;
        let system = ProcessingSystem::assemble(
            config,
            Arc::new(InMemoryTaskStore::new()),
            artifacts.clone(),
            Arc::new(InMemoryAccessRegistry::new()),
            Arc::new(RecordingNotificationSink::new()),
            Arc::new(BrokerProvider::InMemory(broker)),
        );
        (artifacts, system)
    }

    #[tokio::test]
    async fn test_start_declares_topology_and_shuts_down() {
        let broker = InMemoryBroker::new();
        let (_, system) = system(broker.clone());

        let handle = system.start().await.unwrap();
        assert!(broker.topology_declared());
        assert!(handle.is_running());

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_running_system_dispatches_submissions() {
        let broker = InMemoryBroker::new();
        let (artifacts, system) = system(broker.clone());
        artifacts.add_document("C-1", 1, "a.pdf");

        let handle = system.start().await.unwrap();
        system
            .enqueuer()
            .submit(NewTaskRecord::document("a@x", 1, "C-1", 1, "a.pdf", "s3://a"))
            .await
            .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while broker.published(WorkTopic::DocumentProcessing).is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let status = system.status().await.unwrap();
        assert_eq!(status.pending, 0);
        assert_eq!(status.dispatching, 1);
        assert_eq!(status.broker_provider, "in_memory");

        handle.shutdown().await.unwrap();
    }
}
