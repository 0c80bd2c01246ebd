//! # Round-Robin Scheduler
//!
//! Fixed-delay dispatch loop that rotates across tenants instead of draining
//! the queue in global FIFO order. Each dispatch re-reads the set of tenants with
//! pending work, picks `tenants[cursor % len]`, advances the cursor and
//! dispatches that tenant's oldest pending record.
//!
//! The cursor is process-local and starts from zero on every restart. Only one
//! scheduler may run against a store; there is no cross-process claim.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use super::lifecycle::{LifecycleOutcome, TaskLifecycle};
use super::notifications::{InterrogationActivity, NotificationDispatcher, WorkspaceActivity};
use crate::config::SchedulerConfig;
use crate::constants::{components, ARTIFACT_MISSING_ERROR};
use crate::domain::InterrogationNotificationStatus;
use crate::error::Result;
use crate::logging::log_error;
use crate::messaging::{BrokerProvider, WorkMessage};
use crate::models::{ArtifactKind, TaskRecord};
use crate::state_machine::TaskState;

/// Monotonic rotation counter, reduced modulo the current tenant count
#[derive(Debug, Default)]
pub struct RotationCursor(AtomicU64);

impl RotationCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current position, then advance by one
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    pub fn position(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Pick the tenant at the cursor and advance
    pub fn select<'a>(&self, tenants: &'a [String]) -> Option<&'a String> {
        if tenants.is_empty() {
            return None;
        }
        let position = self.advance();
        tenants.get((position % tenants.len() as u64) as usize)
    }
}

/// What one dispatch attempt did
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No tenant has pending work
    Idle,
    /// Record published and left `DISPATCHING`
    Published(TaskRecord),
    /// Broker rejected the publish; record failed with the error text
    PublishFailed { record: TaskRecord, error: String },
    /// Record's artifact was deleted before dispatch; record failed
    ArtifactMissing(TaskRecord),
    /// Another writer claimed the record first; nothing published
    Abandoned,
}

pub struct RoundRobinScheduler {
    lifecycle: Arc<TaskLifecycle>,
    broker: Arc<BrokerProvider>,
    notifications: Arc<NotificationDispatcher>,
    cursor: RotationCursor,
    config: SchedulerConfig,
}

impl std::fmt::Debug for RoundRobinScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobinScheduler")
            .field("cursor", &self.cursor)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RoundRobinScheduler {
    pub fn new(
        lifecycle: Arc<TaskLifecycle>,
        broker: Arc<BrokerProvider>,
        notifications: Arc<NotificationDispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            lifecycle,
            broker,
            notifications,
            cursor: RotationCursor::new(),
            config,
        }
    }

    pub fn cursor_position(&self) -> u64 {
        self.cursor.position()
    }

    /// Run until `shutdown` flips to `true`
    ///
    /// Fixed-delay: the interval is measured from the end of one tick to the
    /// start of the next. Tick errors are logged and never end the loop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            tick_interval_ms = self.config.tick_interval_ms,
            dispatch_batch_size = self.config.dispatch_batch_size,
            "Starting round-robin scheduler"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.tick().await {
                log_error(components::SCHEDULER, "tick", &e.to_string(), None);
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.tick_interval()) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(cursor = self.cursor.position(), "Round-robin scheduler stopped");
    }

    /// Dispatch up to `dispatch_batch_size` records, one tenant rotation per record
    ///
    /// Stops early when the queue is empty or a dispatch race is lost.
    pub async fn tick(&self) -> Result<Vec<DispatchOutcome>> {
        let mut outcomes = Vec::with_capacity(self.config.dispatch_batch_size);

        for _ in 0..self.config.dispatch_batch_size {
            let outcome = self.dispatch_next().await?;
            let stop = matches!(outcome, DispatchOutcome::Idle | DispatchOutcome::Abandoned);
            outcomes.push(outcome);
            if stop {
                break;
            }
        }

        Ok(outcomes)
    }

    #[instrument(skip(self), fields(cursor = self.cursor.position()))]
    async fn dispatch_next(&self) -> Result<DispatchOutcome> {
        let store = self.lifecycle.store();
        let tenants = store
            .distinct_tenants_with_status(TaskState::Pending)
            .await?;

        let Some(tenant) = self.cursor.select(&tenants) else {
            debug!("No pending tasks");
            return Ok(DispatchOutcome::Idle);
        };

        let Some(record) = store.next_pending_for_tenant(tenant).await? else {
            debug!(tenant_id = %tenant, "Tenant queue drained before dispatch");
            return Ok(DispatchOutcome::Abandoned);
        };

        info!(
            task_id = %record.id,
            tenant_id = %record.tenant_id,
            workspace_id = %record.workspace_id,
            artifact = %record.artifact,
            tenants = tenants.len(),
            "Selected task by round-robin"
        );

        match self.lifecycle.dispatch(&record).await {
            Ok(LifecycleOutcome::Applied { record, .. }) => Ok(self.publish(record).await),
            Ok(LifecycleOutcome::ArtifactUnsynced { record, error }) => {
                warn!(task_id = %record.id, error = %error, "Publishing despite stale artifact status");
                Ok(self.publish(record).await)
            }
            Ok(LifecycleOutcome::ArtifactMissing { record }) => {
                warn!(task_id = %record.id, artifact = %record.artifact, "Artifact deleted before dispatch");
                if let Err(e) = self.lifecycle.fail_record(&record, ARTIFACT_MISSING_ERROR).await {
                    log_error(components::SCHEDULER, "fail_record", &e.to_string(), None);
                }
                Ok(DispatchOutcome::ArtifactMissing(record))
            }
            Ok(other) => {
                debug!(outcome = ?other, "Dispatch abandoned");
                Ok(DispatchOutcome::Abandoned)
            }
            Err(e) if e.is_invalid_transition() => {
                debug!(task_id = %record.id, error = %e, "Record no longer pending; abandoning tick");
                Ok(DispatchOutcome::Abandoned)
            }
            Err(e) => Err(e),
        }
    }

    /// Publish a dispatched record; a broker error fails it immediately
    async fn publish(&self, record: TaskRecord) -> DispatchOutcome {
        let message = WorkMessage::from_record(&record);
        let topic = message.topic();

        match self.broker.publish(topic, &message).await {
            Ok(()) => {
                info!(
                    task_id = %record.id,
                    topic = %topic,
                    workspace_id = %record.workspace_id,
                    "Task sent to processing queue"
                );
                self.notify_queued(&record).await;
                DispatchOutcome::Published(record)
            }
            Err(publish_error) => {
                let error = publish_error.to_string();
                error!(
                    task_id = %record.id,
                    topic = %topic,
                    error = %error,
                    "Failed to publish task; failing record"
                );

                let failed = match self.lifecycle.fail_record(&record, error.clone()).await {
                    Ok(outcome) => outcome.record().cloned().unwrap_or(record),
                    Err(e) => {
                        log_error(components::SCHEDULER, "fail_record", &e.to_string(), None);
                        record
                    }
                };

                self.notify_publish_failed(&failed, &error).await;
                DispatchOutcome::PublishFailed {
                    record: failed,
                    error,
                }
            }
        }
    }

    async fn notify_queued(&self, record: &TaskRecord) {
        match record.kind() {
            ArtifactKind::Document => {
                self.notifications
                    .notify_workspace(
                        &record.workspace_id,
                        WorkspaceActivity::queued(record.artifact.id, &record.artifact_name),
                    )
                    .await
            }
            ArtifactKind::Audio => {
                self.notifications
                    .notify_interrogation(
                        &record.workspace_id,
                        InterrogationActivity::new(
                            record.parent_id,
                            record.artifact.id,
                            InterrogationNotificationStatus::Queued,
                        ),
                    )
                    .await
            }
        }
    }

    async fn notify_publish_failed(&self, record: &TaskRecord, error: &str) {
        match record.kind() {
            ArtifactKind::Document => {
                self.notifications
                    .notify_workspace(
                        &record.workspace_id,
                        WorkspaceActivity::queue_failed(
                            record.artifact.id,
                            &record.artifact_name,
                            error,
                        ),
                    )
                    .await
            }
            ArtifactKind::Audio => {
                self.notifications
                    .notify_interrogation(
                        &record.workspace_id,
                        InterrogationActivity::new(
                            record.parent_id,
                            record.artifact.id,
                            InterrogationNotificationStatus::Failed,
                        )
                        .with_error(Some(error.to_string())),
                    )
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_rotates_modulo_tenant_count() {
        let cursor = RotationCursor::new();
        let tenants = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let picks: Vec<&String> = (0..4).filter_map(|_| cursor.select(&tenants)).collect();
        assert_eq!(picks, vec!["a", "b", "c", "a"]);
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_empty_tenant_set_does_not_advance() {
        let cursor = RotationCursor::new();
        assert!(cursor.select(&[]).is_none());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn test_shrinking_set_stays_in_bounds() {
        let cursor = RotationCursor::new();
        let four: Vec<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        cursor.select(&four);
        cursor.select(&four);
        cursor.select(&four);
        let one = vec!["z".to_string()];
        assert_eq!(cursor.select(&one).map(String::as_str), Some("z"));
    }
}
