//! # Task Lifecycle
//!
//! Joins the task store, the artifact repository and the state machine. Every
//! operation decides the transition, persists it with a compare-and-set, and
//! only then applies the matching artifact status. Lost transitions never
//! touch the artifact, and a late result that disagrees with a terminal record
//! is absorbed, so a finished artifact is never regressed.
//!
//! A duplicate of the event that finished a record re-applies the record's
//! artifact status when the artifact does not show it yet. That repairs an
//! artifact whose first write failed after the record was persisted.

use chrono::{Local, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::domain::{ArtifactRepository, ArtifactUpdate};
use crate::error::Result;
use crate::logging::log_task_operation;
use crate::models::{ArtifactKind, ArtifactRef, ArtifactStatus, TaskId, TaskRecord};
use crate::state_machine::{Decision, StateMachineError, TaskEvent, TaskState, TaskStateMachine};
use crate::store::{MarkOutcome, TaskStore};

/// Result of applying one event to a task record
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleOutcome {
    /// Transition persisted and the artifact updated
    Applied {
        record: TaskRecord,
        artifact_status: ArtifactStatus,
    },
    /// Transition persisted, but the artifact has been deleted upstream
    ArtifactMissing { record: TaskRecord },
    /// Dispatch claim persisted, but the artifact write failed
    ArtifactUnsynced { record: TaskRecord, error: String },
    /// Record was already terminal; nothing changed
    Absorbed { task_id: TaskId, state: TaskState },
    /// Another writer moved the record first
    LostRace { task_id: TaskId, current: TaskState },
    /// No task record exists for the artifact
    Untracked { artifact: ArtifactRef },
}

impl LifecycleOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Updated record when the transition was persisted
    pub fn record(&self) -> Option<&TaskRecord> {
        match self {
            Self::Applied { record, .. }
            | Self::ArtifactMissing { record }
            | Self::ArtifactUnsynced { record, .. } => Some(record),
            _ => None,
        }
    }
}

pub struct TaskLifecycle {
    store: Arc<dyn TaskStore>,
    artifacts: Arc<dyn ArtifactRepository>,
}

impl std::fmt::Debug for TaskLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLifecycle").finish_non_exhaustive()
    }
}

impl TaskLifecycle {
    pub fn new(store: Arc<dyn TaskStore>, artifacts: Arc<dyn ArtifactRepository>) -> Self {
        Self { store, artifacts }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactRepository> {
        &self.artifacts
    }

    /// Claim a pending record for publishing (`PENDING -> DISPATCHING`)
    ///
    /// Returns `Err` with an invalid-transition error if the record is no longer
    /// pending at decision time. Once the claim is persisted the call never
    /// fails on the artifact write; the caller must still publish or fail the
    /// record.
    #[instrument(skip(self, record), fields(task_id = %record.id, artifact = %record.artifact))]
    pub async fn dispatch(&self, record: &TaskRecord) -> Result<LifecycleOutcome> {
        self.apply(record, TaskEvent::Dispatch).await
    }

    /// Worker reported that processing has started
    pub async fn acknowledge(&self, artifact: ArtifactRef) -> Result<LifecycleOutcome> {
        self.apply_to_artifact(artifact, TaskEvent::Acknowledge).await
    }

    pub async fn complete(
        &self,
        artifact: ArtifactRef,
        result: Option<String>,
    ) -> Result<LifecycleOutcome> {
        self.apply_to_artifact(artifact, TaskEvent::Complete(result))
            .await
    }

    pub async fn fail(
        &self,
        artifact: ArtifactRef,
        error: impl Into<String>,
    ) -> Result<LifecycleOutcome> {
        self.apply_to_artifact(artifact, TaskEvent::fail_with_error(error))
            .await
    }

    /// Fail a specific record (publish errors, stale dispatches)
    pub async fn fail_record(
        &self,
        record: &TaskRecord,
        error: impl Into<String>,
    ) -> Result<LifecycleOutcome> {
        self.apply(record, TaskEvent::fail_with_error(error)).await
    }

    async fn apply_to_artifact(
        &self,
        artifact: ArtifactRef,
        event: TaskEvent,
    ) -> Result<LifecycleOutcome> {
        match self.store.find_latest_for_artifact(artifact).await? {
            Some(record) => self.apply(&record, event).await,
            None => {
                warn!(
                    artifact = %artifact,
                    event = event.event_type(),
                    "No task record found for artifact"
                );
                Ok(LifecycleOutcome::Untracked { artifact })
            }
        }
    }

    async fn apply(&self, record: &TaskRecord, event: TaskEvent) -> Result<LifecycleOutcome> {
        let decision = TaskStateMachine::decide(Some(record.status), &event)?;

        let to = match decision {
            Decision::Absorbed(state) if Self::settles_in(&event) == Some(state) => {
                return self.reconcile_artifact(record).await;
            }
            Decision::Absorbed(state) => {
                debug!(
                    task_id = %record.id,
                    state = %state,
                    event = event.event_type(),
                    "Event absorbed by terminal record"
                );
                return Ok(LifecycleOutcome::Absorbed {
                    task_id: record.id,
                    state,
                });
            }
            Decision::Apply { to, .. } => to,
        };

        let updated = match self.persist(record, &event).await? {
            MarkOutcome::Applied(updated) => updated,
            MarkOutcome::Conflict { current } => {
                return Ok(Self::resolve_conflict(record.id, current, &event));
            }
        };

        log_task_operation(
            event.event_type(),
            Some(&updated.id.to_string()),
            Some(&updated.tenant_id),
            Some(&updated.artifact.to_string()),
            to.as_str(),
            event.error_message(),
        );

        self.apply_artifact_effect(updated, &event, Local::now().naive_local())
            .await
    }

    /// Terminal state an event drives a record into
    fn settles_in(event: &TaskEvent) -> Option<TaskState> {
        match event {
            TaskEvent::Complete(_) => Some(TaskState::Completed),
            TaskEvent::Fail(_) => Some(TaskState::Failed),
            _ => None,
        }
    }

    /// Bring the artifact in line with a record that is already terminal
    ///
    /// The update is rebuilt from the stored record, so the first result,
    /// error and completion time win over whatever the duplicate carries.
    async fn reconcile_artifact(&self, record: &TaskRecord) -> Result<LifecycleOutcome> {
        let event = match record.status {
            TaskState::Completed => TaskEvent::Complete(record.result.clone()),
            TaskState::Failed => {
                TaskEvent::fail_with_error(record.error_message.clone().unwrap_or_default())
            }
            state => {
                return Ok(LifecycleOutcome::Absorbed {
                    task_id: record.id,
                    state,
                })
            }
        };
        let expected = TaskStateMachine::artifact_effect(record.kind(), &event);

        match self.artifacts.find_artifact(record.artifact).await? {
            Some(snapshot) if snapshot.status != expected => {
                info!(
                    task_id = %record.id,
                    artifact = %record.artifact,
                    state = %record.status,
                    artifact_status = ?snapshot.status,
                    "Re-applying artifact status for terminal record"
                );
                let completed_at = record
                    .completed_at
                    .map(|at| at.with_timezone(&Local).naive_local())
                    .unwrap_or_else(|| Local::now().naive_local());
                self.apply_artifact_effect(record.clone(), &event, completed_at)
                    .await
            }
            _ => {
                debug!(
                    task_id = %record.id,
                    state = %record.status,
                    "Duplicate terminal event absorbed"
                );
                Ok(LifecycleOutcome::Absorbed {
                    task_id: record.id,
                    state: record.status,
                })
            }
        }
    }

    async fn persist(&self, record: &TaskRecord, event: &TaskEvent) -> Result<MarkOutcome> {
        let now = Utc::now();
        let outcome = match event {
            TaskEvent::Dispatch => self.store.mark_dispatching(record.id, now).await?,
            // Record stays DISPATCHING; only the artifact moves
            TaskEvent::Acknowledge => MarkOutcome::Applied(record.clone()),
            TaskEvent::Complete(result) => {
                self.store
                    .mark_completed(record.id, result.clone(), now)
                    .await?
            }
            TaskEvent::Fail(error) => self.store.mark_failed(record.id, error, now).await?,
            TaskEvent::Submit => {
                return Err(
                    StateMachineError::invalid_transition(Some(record.status), "submit").into(),
                )
            }
        };
        Ok(outcome)
    }

    /// Re-decide once against the status another writer left behind
    fn resolve_conflict(task_id: TaskId, current: TaskState, event: &TaskEvent) -> LifecycleOutcome {
        match TaskStateMachine::decide(Some(current), event) {
            Ok(Decision::Absorbed(state)) => {
                debug!(task_id = %task_id, state = %state, "Concurrent writer finished record first");
                LifecycleOutcome::Absorbed { task_id, state }
            }
            _ => {
                info!(
                    task_id = %task_id,
                    current = %current,
                    event = event.event_type(),
                    "Lost compare-and-set race"
                );
                LifecycleOutcome::LostRace { task_id, current }
            }
        }
    }

    async fn apply_artifact_effect(
        &self,
        record: TaskRecord,
        event: &TaskEvent,
        completed_at: NaiveDateTime,
    ) -> Result<LifecycleOutcome> {
        let status = TaskStateMachine::artifact_effect(record.kind(), event);
        let mut update = ArtifactUpdate::status(status);

        match event {
            TaskEvent::Complete(result) => {
                update = update.with_completed_at(completed_at);
                if record.kind() == ArtifactKind::Audio {
                    update = update.with_answer(result.clone());
                }
            }
            TaskEvent::Fail(error) if record.kind() == ArtifactKind::Document => {
                update = update
                    .with_completed_at(completed_at)
                    .with_error(error.clone());
            }
            _ => {}
        }

        match self.artifacts.update_status(record.artifact, update).await {
            Ok(()) => Ok(LifecycleOutcome::Applied {
                record,
                artifact_status: status,
            }),
            Err(e) if e.is_not_found() => {
                warn!(
                    task_id = %record.id,
                    artifact = %record.artifact,
                    "Artifact deleted upstream; task record updated without it"
                );
                Ok(LifecycleOutcome::ArtifactMissing { record })
            }
            // A persisted claim must still reach publish
            Err(e) if matches!(event, TaskEvent::Dispatch) => {
                warn!(
                    task_id = %record.id,
                    artifact = %record.artifact,
                    error = %e,
                    "Failed to update artifact on dispatch"
                );
                Ok(LifecycleOutcome::ArtifactUnsynced {
                    record,
                    error: e.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
