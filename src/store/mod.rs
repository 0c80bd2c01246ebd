//! # Task Store
//!
//! Durable collection of task records and the single source of truth for
//! dispatch eligibility.
//!
//! Every mutation is a single-record compare-and-set on the expected current
//! status, so two scheduler ticks, or a tick and a result consumer, can never both
//! move the same record. Marking an already-terminal record again reports a
//! [`MarkOutcome::Conflict`] rather than an error, because brokers redeliver.
//!
//! Two backends ship with the crate:
//!
//! - [`PgTaskStore`] - PostgreSQL via sqlx (`task_queue` table, see `migrations/`)
//! - [`InMemoryTaskStore`] - process-local store for tests and local runs

pub mod errors;
pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{ArtifactRef, NewTaskRecord, TaskId, TaskRecord};
use crate::state_machine::TaskState;

pub use errors::{StoreError, StoreResult};
pub use in_memory::InMemoryTaskStore;
pub use postgres::PgTaskStore;

/// Outcome of a compare-and-set status update
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    /// Update applied; carries the updated record
    Applied(TaskRecord),
    /// Record was not in the expected state; nothing changed
    Conflict { current: TaskState },
}

impl MarkOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Insert a pending record; rejects a second active record for one artifact
    async fn enqueue(&self, submission: NewTaskRecord) -> StoreResult<TaskId>;

    async fn find(&self, id: TaskId) -> StoreResult<Option<TaskRecord>>;

    /// Most recently created record for an artifact, active or not
    async fn find_latest_for_artifact(&self, artifact: ArtifactRef)
        -> StoreResult<Option<TaskRecord>>;

    /// Oldest pending record for a tenant (`created_at`, then insertion order)
    async fn next_pending_for_tenant(&self, tenant_id: &str) -> StoreResult<Option<TaskRecord>>;

    /// All pending records for a tenant, oldest first
    async fn pending_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<TaskRecord>>;

    /// Distinct tenants owning at least one record in `status`, sorted ascending
    async fn distinct_tenants_with_status(&self, status: TaskState) -> StoreResult<Vec<String>>;

    /// `PENDING -> DISPATCHING`, stamping `dispatched_at`
    async fn mark_dispatching(&self, id: TaskId, at: DateTime<Utc>) -> StoreResult<MarkOutcome>;

    /// `DISPATCHING -> COMPLETED`, stamping `completed_at` and storing the result
    async fn mark_completed(
        &self,
        id: TaskId,
        result: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome>;

    /// `DISPATCHING -> FAILED`, stamping `completed_at` and storing the error
    async fn mark_failed(&self, id: TaskId, error: &str, at: DateTime<Utc>)
        -> StoreResult<MarkOutcome>;

    /// Remove every record for an artifact (artifact deleted upstream)
    async fn delete_by_artifact(&self, artifact: ArtifactRef) -> StoreResult<u64>;

    /// Remove terminal records whose `completed_at` is before `cutoff`
    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Records still `DISPATCHING` whose `dispatched_at` is before `cutoff`
    async fn stale_dispatching(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<TaskRecord>>;

    async fn count_by_status(&self, status: TaskState) -> StoreResult<i64>;
}
