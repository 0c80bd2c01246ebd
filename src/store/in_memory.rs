//! # In-Memory Task Store
//!
//! Process-local [`TaskStore`] backed by a `parking_lot` mutex. Every operation
//! takes the lock once, which gives the same single-record atomicity the
//! PostgreSQL store gets from conditional `UPDATE`s.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use super::{MarkOutcome, StoreError, StoreResult, TaskStore};
use crate::models::{ArtifactRef, NewTaskRecord, TaskId, TaskRecord};
use crate::state_machine::TaskState;

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<TaskId, TaskRecord>,
    next_sequence: i64,
}

impl StoreState {
    fn pending_for(&self, tenant_id: &str) -> Vec<TaskRecord> {
        let mut pending: Vec<TaskRecord> = self
            .records
            .values()
            .filter(|r| r.status == TaskState::Pending && r.tenant_id == tenant_id)
            .cloned()
            .collect();
        pending.sort_by_key(|r| (r.created_at, r.sequence));
        pending
    }

    fn transition(
        &mut self,
        id: TaskId,
        expected: TaskState,
        apply: impl FnOnce(&mut TaskRecord),
    ) -> StoreResult<MarkOutcome> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or(StoreError::NotFound { id })?;

        if record.status != expected {
            return Ok(MarkOutcome::Conflict {
                current: record.status,
            });
        }

        apply(record);
        Ok(MarkOutcome::Applied(record.clone()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully-formed record, bypassing the submission path
    ///
    /// Used to seed records with historical timestamps.
    pub fn insert_record(&self, mut record: TaskRecord) -> TaskId {
        let mut state = self.state.lock();
        state.next_sequence += 1;
        record.sequence = state.next_sequence;
        let id = record.id;
        state.records.insert(id, record);
        id
    }

    /// Snapshot of every record, in insertion order
    pub fn all_records(&self) -> Vec<TaskRecord> {
        let state = self.state.lock();
        let mut records: Vec<TaskRecord> = state.records.values().cloned().collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn enqueue(&self, submission: NewTaskRecord) -> StoreResult<TaskId> {
        let mut state = self.state.lock();

        let artifact = submission.artifact;
        if state
            .records
            .values()
            .any(|r| r.artifact == artifact && r.status.is_active())
        {
            return Err(StoreError::DuplicateActiveTask { artifact });
        }

        state.next_sequence += 1;
        let sequence = state.next_sequence;
        let id = Uuid::new_v4();
        let record = TaskRecord::from_submission(id, sequence, submission, Utc::now());
        state.records.insert(id, record);
        Ok(id)
    }

    async fn find(&self, id: TaskId) -> StoreResult<Option<TaskRecord>> {
        Ok(self.state.lock().records.get(&id).cloned())
    }

    async fn find_latest_for_artifact(
        &self,
        artifact: ArtifactRef,
    ) -> StoreResult<Option<TaskRecord>> {
        let state = self.state.lock();
        Ok(state
            .records
            .values()
            .filter(|r| r.artifact == artifact)
            .max_by_key(|r| (r.created_at, r.sequence))
            .cloned())
    }

    async fn next_pending_for_tenant(&self, tenant_id: &str) -> StoreResult<Option<TaskRecord>> {
        Ok(self.state.lock().pending_for(tenant_id).into_iter().next())
    }

    async fn pending_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<TaskRecord>> {
        Ok(self.state.lock().pending_for(tenant_id))
    }

    async fn distinct_tenants_with_status(&self, status: TaskState) -> StoreResult<Vec<String>> {
        let state = self.state.lock();
        let tenants: BTreeSet<&str> = state
            .records
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.tenant_id.as_str())
            .collect();
        Ok(tenants.into_iter().map(str::to_string).collect())
    }

    async fn mark_dispatching(&self, id: TaskId, at: DateTime<Utc>) -> StoreResult<MarkOutcome> {
        self.state
            .lock()
            .transition(id, TaskState::Pending, |record| {
                record.status = TaskState::Dispatching;
                record.dispatched_at = Some(at);
            })
    }

    async fn mark_completed(
        &self,
        id: TaskId,
        result: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome> {
        self.state
            .lock()
            .transition(id, TaskState::Dispatching, |record| {
                record.status = TaskState::Completed;
                record.completed_at = Some(at);
                record.result = result;
            })
    }

    async fn mark_failed(
        &self,
        id: TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome> {
        self.state
            .lock()
            .transition(id, TaskState::Dispatching, |record| {
                record.status = TaskState::Failed;
                record.completed_at = Some(at);
                record.error_message = Some(error.to_string());
            })
    }

    async fn delete_by_artifact(&self, artifact: ArtifactRef) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.retain(|_, r| r.artifact != artifact);
        Ok((before - state.records.len()) as u64)
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let before = state.records.len();
        state.records.retain(|_, r| {
            !(r.status.is_terminal() && r.completed_at.is_some_and(|at| at < cutoff))
        });
        Ok((before - state.records.len()) as u64)
    }

    async fn stale_dispatching(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<TaskRecord>> {
        let state = self.state.lock();
        let mut stale: Vec<TaskRecord> = state
            .records
            .values()
            .filter(|r| {
                r.status == TaskState::Dispatching
                    && r.dispatched_at.is_some_and(|at| at < cutoff)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.sequence);
        Ok(stale)
    }

    async fn count_by_status(&self, status: TaskState) -> StoreResult<i64> {
        let state = self.state.lock();
        Ok(state.records.values().filter(|r| r.status == status).count() as i64)
    }
}
