//! # Task Enqueuer
//!
//! Entry point for upload services: stores a pending record for a freshly
//! uploaded artifact and moves the artifact to its queued status, or withdraws
//! the records of an artifact deleted before it was dispatched.

use std::sync::Arc;
use tracing::{info, warn};

use crate::domain::{ArtifactRepository, ArtifactUpdate};
use crate::error::Result;
use crate::logging::log_task_operation;
use crate::models::{ArtifactRef, NewTaskRecord, TaskId, TaskRecord};
use crate::state_machine::{TaskEvent, TaskStateMachine};
use crate::store::TaskStore;

pub struct TaskEnqueuer {
    store: Arc<dyn TaskStore>,
    artifacts: Arc<dyn ArtifactRepository>,
}

impl std::fmt::Debug for TaskEnqueuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskEnqueuer").finish_non_exhaustive()
    }
}

impl TaskEnqueuer {
    pub fn new(store: Arc<dyn TaskStore>, artifacts: Arc<dyn ArtifactRepository>) -> Self {
        Self { store, artifacts }
    }

    /// Queue an artifact for fair dispatch
    ///
    /// Fails with `DuplicateActiveTask` while the artifact still has a pending
    /// or dispatching record.
    pub async fn submit(&self, submission: NewTaskRecord) -> Result<TaskId> {
        let artifact = submission.artifact;
        let tenant_id = submission.tenant_id.clone();
        let task_id = self.store.enqueue(submission).await?;

        let status = TaskStateMachine::artifact_effect(artifact.kind, &TaskEvent::Submit);
        if let Err(e) = self
            .artifacts
            .update_status(artifact, ArtifactUpdate::status(status))
            .await
        {
            // The record is already durable; the scheduler reconciles on dispatch
            warn!(task_id = %task_id, artifact = %artifact, error = %e, "Failed to mark artifact queued");
        }

        log_task_operation(
            "submit",
            Some(&task_id.to_string()),
            Some(&tenant_id),
            Some(&artifact.to_string()),
            "pending",
            None,
        );

        Ok(task_id)
    }

    /// Drop every record for an artifact that was deleted upstream
    pub async fn withdraw(&self, artifact: ArtifactRef) -> Result<u64> {
        let removed = self.store.delete_by_artifact(artifact).await?;
        info!(artifact = %artifact, removed = removed, "Withdrew task records for deleted artifact");
        Ok(removed)
    }

    /// Pending records for one tenant, oldest first
    pub async fn pending_for_tenant(&self, tenant_id: &str) -> Result<Vec<TaskRecord>> {
        Ok(self.store.pending_for_tenant(tenant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::InMemoryArtifactRepository;
    use crate::error::FairqError;
    use crate::models::{ArtifactStatus, CaseFileStatus, QaStatus};
    use crate::store::{InMemoryTaskStore, StoreError};

    fn enqueuer() -> (Arc<InMemoryTaskStore>, Arc<InMemoryArtifactRepository>, TaskEnqueuer) {
        let store = Arc::new(InMemoryTaskStore::new());
        let artifacts = Arc::new(InMemoryArtifactRepository::new());
        let enqueuer = TaskEnqueuer::new(store.clone(), artifacts.clone());
        (store, artifacts, enqueuer)
    }

    #[tokio::test]
    async fn test_submit_marks_artifacts_queued() {
        let (_, artifacts, enqueuer) = enqueuer();
        let doc = artifacts.add_document("C-1", 1, "a.pdf");
        let answer = artifacts.add_answer("C-1", 2, "Q1");

        enqueuer
            .submit(NewTaskRecord::document("a@x", 1, "C-1", 1, "a.pdf", "s3://a"))
            .await
            .unwrap();
        enqueuer
            .submit(NewTaskRecord::audio("a@x", 4, "C-1", 2, "q1.webm", "s3://q1", "ru"))
            .await
            .unwrap();

        assert_eq!(
            artifacts.status_of(doc),
            Some(ArtifactStatus::File(CaseFileStatus::Queued))
        );
        assert_eq!(
            artifacts.status_of(answer),
            Some(ArtifactStatus::Qa(QaStatus::Pending))
        );
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let (_, artifacts, enqueuer) = enqueuer();
        artifacts.add_document("C-1", 1, "a.pdf");
        let submission = NewTaskRecord::document("a@x", 1, "C-1", 1, "a.pdf", "s3://a");

        enqueuer.submit(submission.clone()).await.unwrap();
        let err = enqueuer.submit(submission).await.unwrap_err();
        assert!(matches!(
            err,
            FairqError::Store(StoreError::DuplicateActiveTask { .. })
        ));
    }

    #[tokio::test]
    async fn test_withdraw_removes_pending_records() {
        let (store, artifacts, enqueuer) = enqueuer();
        let doc = artifacts.add_document("C-1", 1, "a.pdf");
        enqueuer
            .submit(NewTaskRecord::document("a@x", 1, "C-1", 1, "a.pdf", "s3://a"))
            .await
            .unwrap();

        assert_eq!(enqueuer.withdraw(doc).await.unwrap(), 1);
        assert!(store.is_empty());
        assert!(enqueuer.pending_for_tenant("a@x").await.unwrap().is_empty());
    }
}
