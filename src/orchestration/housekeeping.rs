//! # Housekeeper
//!
//! Two periodic jobs against the task store:
//!
//! - **Retention purge**: deletes COMPLETED and FAILED records whose
//!   `completed_at` is older than the retention window.
//! - **Stale-dispatch reaper**: fails records left DISPATCHING longer than the
//!   staleness threshold. It uses the normal failure path, so documents become
//!   FAILED, audio answers roll back to PENDING, and subscribers are notified.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::lifecycle::{LifecycleOutcome, TaskLifecycle};
use super::notifications::{InterrogationActivity, NotificationDispatcher, WorkspaceActivity};
use crate::config::{ReaperConfig, RetentionConfig};
use crate::constants::{components, STALE_DISPATCH_ERROR};
use crate::domain::InterrogationNotificationStatus;
use crate::error::Result;
use crate::logging::log_error;
use crate::models::ArtifactKind;

/// Counts from one reaper pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    pub examined: usize,
    pub failed: usize,
}

pub struct Housekeeper {
    lifecycle: Arc<TaskLifecycle>,
    notifications: Arc<NotificationDispatcher>,
    retention: RetentionConfig,
    reaper: ReaperConfig,
}

impl std::fmt::Debug for Housekeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Housekeeper")
            .field("retention", &self.retention)
            .field("reaper", &self.reaper)
            .finish_non_exhaustive()
    }
}

impl Housekeeper {
    pub fn new(
        lifecycle: Arc<TaskLifecycle>,
        notifications: Arc<NotificationDispatcher>,
        retention: RetentionConfig,
        reaper: ReaperConfig,
    ) -> Self {
        Self {
            lifecycle,
            notifications,
            retention,
            reaper,
        }
    }

    /// Delete terminal records that finished before `now - ttl`
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - self.retention.ttl();
        let purged = self.lifecycle.store().purge_terminal_before(cutoff).await?;

        if purged > 0 {
            info!(purged = purged, cutoff = %cutoff, "Purged expired task records");
        } else {
            debug!(cutoff = %cutoff, "No expired task records");
        }
        Ok(purged)
    }

    /// Fail every record dispatched before `now - stale_after`
    pub async fn reap_stale(&self, now: DateTime<Utc>) -> Result<ReapReport> {
        let cutoff = now - self.reaper.stale_after();
        let stale = self.lifecycle.store().stale_dispatching(cutoff).await?;
        let mut report = ReapReport {
            examined: stale.len(),
            failed: 0,
        };

        for record in stale {
            warn!(
                task_id = %record.id,
                artifact = %record.artifact,
                dispatched_at = ?record.dispatched_at,
                "Failing stale dispatch"
            );

            let outcome = match self.lifecycle.fail_record(&record, STALE_DISPATCH_ERROR).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log_error(
                        components::HOUSEKEEPER,
                        "reap_stale",
                        &e.to_string(),
                        Some(&record.id.to_string()),
                    );
                    continue;
                }
            };

            // A result that raced the reaper wins; nothing to announce
            let Some(failed) = outcome.record() else {
                continue;
            };
            report.failed += 1;

            if matches!(outcome, LifecycleOutcome::ArtifactMissing { .. }) {
                continue;
            }

            match failed.kind() {
                ArtifactKind::Document => {
                    self.notifications
                        .notify_workspace(
                            &failed.workspace_id,
                            WorkspaceActivity::failed(
                                failed.artifact.id,
                                &failed.artifact_name,
                                STALE_DISPATCH_ERROR,
                            ),
                        )
                        .await
                }
                ArtifactKind::Audio => {
                    self.notifications
                        .notify_interrogation(
                            &failed.workspace_id,
                            InterrogationActivity::new(
                                failed.parent_id,
                                failed.artifact.id,
                                InterrogationNotificationStatus::Failed,
                            )
                            .with_error(Some(STALE_DISPATCH_ERROR.to_string())),
                        )
                        .await
                }
            }
        }

        if report.examined > 0 {
            info!(
                examined = report.examined,
                failed = report.failed,
                "Stale dispatch sweep finished"
            );
        }
        Ok(report)
    }

    /// Run both jobs on their intervals until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut purge_timer = interval(self.retention.sweep_interval());
        purge_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reap_timer = interval(self.reaper.interval());
        reap_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            retention_days = self.retention.completed_ttl_days,
            reaper_enabled = self.reaper.enabled,
            stale_after_seconds = self.reaper.stale_after_seconds,
            "Starting housekeeper"
        );

        loop {
            tokio::select! {
                _ = purge_timer.tick() => {
                    if let Err(e) = self.purge_expired(Utc::now()).await {
                        log_error(components::HOUSEKEEPER, "purge_expired", &e.to_string(), None);
                    }
                }
                _ = reap_timer.tick(), if self.reaper.enabled => {
                    if let Err(e) = self.reap_stale(Utc::now()).await {
                        log_error(components::HOUSEKEEPER, "reap_stale", &e.to_string(), None);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Housekeeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        InMemoryAccessRegistry, InMemoryArtifactRepository, RecordingNotificationSink,
    };
    use crate::models::{ArtifactRef, ArtifactStatus, CaseFileStatus, NewTaskRecord, QaStatus};
    use crate::state_machine::TaskState;
    use crate::store::{InMemoryTaskStore, TaskStore};
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryTaskStore>,
        artifacts: Arc<InMemoryArtifactRepository>,
        sink: Arc<RecordingNotificationSink>,
        housekeeper: Housekeeper,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryTaskStore::new());
        let artifacts = Arc::new(InMemoryArtifactRepository::new());
        let access = Arc::new(InMemoryAccessRegistry::new());
        access.grant("C-1", "a@x");
        let sink = Arc::new(RecordingNotificationSink::new());
        let lifecycle = Arc::new(TaskLifecycle::new(store.clone(), artifacts.clone()));
        let notifications = Arc::new(NotificationDispatcher::new(
            artifacts.clone(),
            access,
            sink.clone(),
            std::time::Duration::from_millis(100),
        ));
        let housekeeper = Housekeeper::new(
            lifecycle,
            notifications,
            RetentionConfig::default(),
            ReaperConfig::default(),
        );
        Fixture {
            store,
            artifacts,
            sink,
            housekeeper,
        }
    }

    #[tokio::test]
    async fn test_reaper_fails_stale_dispatches_by_kind() {
        let f = fixture();
        let doc = f.artifacts.add_document("C-1", 1, "a.pdf");
        let answer = f.artifacts.add_answer("C-1", 2, "Q1");
        let doc_id = f
            .store
            .enqueue(NewTaskRecord::document("a@x", 1, "C-1", 1, "a.pdf", "s3://a"))
            .await
            .unwrap();
        let audio_id = f
            .store
            .enqueue(NewTaskRecord::audio("a@x", 5, "C-1", 2, "q.webm", "s3://q", "ru"))
            .await
            .unwrap();

        let long_ago = Utc::now() - Duration::hours(2);
        f.store.mark_dispatching(doc_id, long_ago).await.unwrap();
        f.store.mark_dispatching(audio_id, long_ago).await.unwrap();

        let report = f.housekeeper.reap_stale(Utc::now()).await.unwrap();
        assert_eq!(report, ReapReport { examined: 2, failed: 2 });

        let doc_record = f.store.find(doc_id).await.unwrap().unwrap();
        assert_eq!(doc_record.status, TaskState::Failed);
        assert_eq!(doc_record.error_message.as_deref(), Some(STALE_DISPATCH_ERROR));
        assert_eq!(
            f.artifacts.status_of(doc),
            Some(ArtifactStatus::File(CaseFileStatus::Failed))
        );
        assert_eq!(
            f.artifacts.status_of(answer),
            Some(ArtifactStatus::Qa(QaStatus::Pending))
        );
        assert_eq!(f.sink.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_reaper_ignores_recent_dispatches() {
        let f = fixture();
        f.artifacts.add_document("C-1", 1, "a.pdf");
        let id = f
            .store
            .enqueue(NewTaskRecord::document("a@x", 1, "C-1", 1, "a.pdf", "s3://a"))
            .await
            .unwrap();
        f.store.mark_dispatching(id, Utc::now()).await.unwrap();

        let report = f.housekeeper.reap_stale(Utc::now()).await.unwrap();
        assert_eq!(report, ReapReport::default());
        assert_eq!(
            f.store.find(id).await.unwrap().unwrap().status,
            TaskState::Dispatching
        );
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_terminal_records() {
        let f = fixture();
        let now = Utc::now();
        let old = f
            .store
            .enqueue(NewTaskRecord::document("a@x", 1, "C-1", 1, "old.pdf", "s3://o"))
            .await
            .unwrap();
        let recent = f
            .store
            .enqueue(NewTaskRecord::document("a@x", 1, "C-1", 2, "new.pdf", "s3://n"))
            .await
            .unwrap();
        let pending = f
            .store
            .enqueue(NewTaskRecord::document("a@x", 1, "C-1", 3, "wait.pdf", "s3://w"))
            .await
            .unwrap();

        for id in [old, recent] {
            f.store.mark_dispatching(id, now - Duration::days(40)).await.unwrap();
        }
        f.store
            .mark_completed(old, None, now - Duration::days(31))
            .await
            .unwrap();
        f.store
            .mark_failed(recent, "boom", now - Duration::days(2))
            .await
            .unwrap();

        assert_eq!(f.housekeeper.purge_expired(now).await.unwrap(), 1);
        assert!(f.store.find(old).await.unwrap().is_none());
        assert!(f.store.find(recent).await.unwrap().is_some());
        assert!(f.store.find(pending).await.unwrap().is_some());
        assert!(f
            .store
            .find_latest_for_artifact(ArtifactRef::document(1))
            .await
            .unwrap()
            .is_none());
    }
}
