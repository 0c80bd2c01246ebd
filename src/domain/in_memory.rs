//! In-memory collaborators for tests and local runs.

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{
    AccessRegistry, ArtifactRepository, ArtifactSnapshot, ArtifactUpdate, DomainError,
    DomainResult, FileStatusInfo, Notification, NotificationSink,
};
use crate::models::{ArtifactKind, ArtifactRef, ArtifactStatus, CaseFileStatus, QaStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub snapshot: ArtifactSnapshot,
    pub answer_text: Option<String>,
    pub uploaded_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
    /// Every status the artifact has been given, oldest first
    pub history: Vec<ArtifactStatus>,
}

#[derive(Debug, Default)]
pub struct InMemoryArtifactRepository {
    artifacts: Mutex<BTreeMap<(u8, i64), StoredArtifact>>,
    titles: Mutex<HashMap<String, String>>,
    /// Status updates that fail with a repository error, and the error text
    failing_updates: Mutex<Option<(ArtifactStatus, String)>>,
}

fn key(artifact: ArtifactRef) -> (u8, i64) {
    let kind = match artifact.kind {
        ArtifactKind::Document => 0,
        ArtifactKind::Audio => 1,
    };
    (kind, artifact.id)
}

impl InMemoryArtifactRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_workspace(&self, workspace_id: impl Into<String>, title: impl Into<String>) {
        self.titles.lock().insert(workspace_id.into(), title.into());
    }

    /// Register an uploaded case file
    pub fn add_document(&self, workspace_id: &str, file_id: i64, name: &str) -> ArtifactRef {
        let artifact = ArtifactRef::document(file_id);
        self.insert(artifact, workspace_id, name, ArtifactStatus::File(CaseFileStatus::Uploaded));
        artifact
    }

    /// Register a question/answer pair awaiting its recording
    pub fn add_answer(&self, workspace_id: &str, qa_id: i64, name: &str) -> ArtifactRef {
        let artifact = ArtifactRef::audio(qa_id);
        self.insert(artifact, workspace_id, name, ArtifactStatus::Qa(QaStatus::Pending));
        artifact
    }

    fn insert(&self, artifact: ArtifactRef, workspace_id: &str, name: &str, status: ArtifactStatus) {
        self.artifacts.lock().insert(
            key(artifact),
            StoredArtifact {
                snapshot: ArtifactSnapshot {
                    artifact,
                    workspace_id: workspace_id.to_string(),
                    name: name.to_string(),
                    status,
                },
                answer_text: None,
                uploaded_at: Some(Utc::now().naive_utc()),
                completed_at: None,
                error_message: None,
                history: vec![status],
            },
        );
    }

    /// Simulate the artifact being deleted upstream
    pub fn remove(&self, artifact: ArtifactRef) -> bool {
        self.artifacts.lock().remove(&key(artifact)).is_some()
    }

    pub fn get(&self, artifact: ArtifactRef) -> Option<StoredArtifact> {
        self.artifacts.lock().get(&key(artifact)).cloned()
    }

    pub fn status_of(&self, artifact: ArtifactRef) -> Option<ArtifactStatus> {
        self.get(artifact).map(|stored| stored.snapshot.status)
    }

    /// Make every update to `status` fail until `restore_updates` is called
    pub fn fail_updates_to(&self, status: ArtifactStatus, reason: impl Into<String>) {
        *self.failing_updates.lock() = Some((status, reason.into()));
    }

    pub fn restore_updates(&self) {
        *self.failing_updates.lock() = None;
    }
}

#[async_trait]
impl ArtifactRepository for InMemoryArtifactRepository {
    async fn find_artifact(&self, artifact: ArtifactRef) -> DomainResult<Option<ArtifactSnapshot>> {
        Ok(self.get(artifact).map(|stored| stored.snapshot))
    }

    async fn update_status(&self, artifact: ArtifactRef, update: ArtifactUpdate) -> DomainResult<()> {
        if let Some((status, reason)) = self.failing_updates.lock().as_ref() {
            if *status == update.status {
                return Err(DomainError::repository("update_status", reason.clone()));
            }
        }

        let mut artifacts = self.artifacts.lock();
        let stored = artifacts
            .get_mut(&key(artifact))
            .ok_or_else(|| DomainError::not_found("Artifact", artifact))?;

        stored.snapshot.status = update.status;
        stored.history.push(update.status);
        if update.answer_text.is_some() {
            stored.answer_text = update.answer_text;
        }
        if update.completed_at.is_some() {
            stored.completed_at = update.completed_at;
        }
        if update.error_message.is_some() {
            stored.error_message = update.error_message;
        }
        Ok(())
    }

    async fn workspace_files(&self, workspace_id: &str) -> DomainResult<Vec<FileStatusInfo>> {
        let artifacts = self.artifacts.lock();
        Ok(artifacts
            .values()
            .filter(|stored| stored.snapshot.workspace_id == workspace_id)
            .filter_map(|stored| match stored.snapshot.status {
                ArtifactStatus::File(status) => Some(FileStatusInfo {
                    file_id: stored.snapshot.artifact.id,
                    file_name: stored.snapshot.name.clone(),
                    status,
                    uploaded_at: stored.uploaded_at,
                    completed_at: stored.completed_at,
                    error_message: stored.error_message.clone(),
                }),
                ArtifactStatus::Qa(_) => None,
            })
            .collect())
    }

    async fn workspace_title(&self, workspace_id: &str) -> DomainResult<Option<String>> {
        Ok(self.titles.lock().get(workspace_id).cloned())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAccessRegistry {
    members: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl InMemoryAccessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, workspace_id: impl Into<String>, tenant_id: impl Into<String>) {
        self.members
            .lock()
            .entry(workspace_id.into())
            .or_default()
            .insert(tenant_id.into());
    }
}

#[async_trait]
impl AccessRegistry for InMemoryAccessRegistry {
    async fn accessible_tenants(&self, workspace_id: &str) -> DomainResult<Vec<String>> {
        Ok(self
            .members
            .lock()
            .get(workspace_id)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }
}

/// A notification captured by [`RecordingNotificationSink`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNotification {
    pub tenant_id: String,
    pub destination: String,
    pub notification: Notification,
}

/// Sink that keeps every pushed notification; can be told to fail
#[derive(Debug, Default)]
pub struct RecordingNotificationSink {
    sent: Mutex<Vec<RecordedNotification>>,
    failure: Mutex<Option<String>>,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_with(&self, reason: impl Into<String>) {
        *self.failure.lock() = Some(reason.into());
    }

    pub fn sent(&self) -> Vec<RecordedNotification> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, destination: &str) -> Vec<RecordedNotification> {
        self.sent
            .lock()
            .iter()
            .filter(|n| n.destination == destination)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn push(
        &self,
        tenant_id: &str,
        destination: &str,
        notification: &Notification,
    ) -> DomainResult<()> {
        if let Some(reason) = self.failure.lock().clone() {
            return Err(DomainError::delivery(tenant_id, reason));
        }
        self.sent.lock().push(RecordedNotification {
            tenant_id: tenant_id.to_string(),
            destination: destination.to_string(),
            notification: notification.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_missing_artifact_is_not_found() {
        let repo = InMemoryArtifactRepository::new();
        let err = repo
            .update_status(
                ArtifactRef::document(1),
                ArtifactUpdate::status(ArtifactStatus::File(CaseFileStatus::Pending)),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_injected_update_failure_leaves_artifact_untouched() {
        let repo = InMemoryArtifactRepository::new();
        let doc = repo.add_document("CASE-1", 1, "a.pdf");
        let pending = ArtifactStatus::File(CaseFileStatus::Pending);
        repo.fail_updates_to(pending, "connection reset");

        let err = repo
            .update_status(doc, ArtifactUpdate::status(pending))
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        let snapshot = repo.find_artifact(doc).await.unwrap().unwrap();
        assert_eq!(snapshot.status, ArtifactStatus::File(CaseFileStatus::Uploaded));

        repo.restore_updates();
        repo.update_status(doc, ArtifactUpdate::status(pending))
            .await
            .unwrap();
        assert_eq!(repo.status_of(doc), Some(pending));
    }

    #[tokio::test]
    async fn test_workspace_files_only_lists_documents() {
        let repo = InMemoryArtifactRepository::new();
        repo.add_document("CASE-1", 1, "a.pdf");
        repo.add_document("CASE-2", 2, "b.pdf");
        repo.add_answer("CASE-1", 1, "q1");

        let files = repo.workspace_files("CASE-1").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_name, "a.pdf");
        assert_eq!(files[0].status, CaseFileStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_registry_lists_members_sorted() {
        let registry = InMemoryAccessRegistry::new();
        registry.grant("CASE-1", "zed@x");
        registry.grant("CASE-1", "amy@x");
        assert_eq!(
            registry.accessible_tenants("CASE-1").await.unwrap(),
            vec!["amy@x".to_string(), "zed@x".to_string()]
        );
        assert!(registry.accessible_tenants("CASE-9").await.unwrap().is_empty());
    }
}
