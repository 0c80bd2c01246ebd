//! # Domain Collaborators
//!
//! Interfaces to the systems around the scheduler: the repository that owns
//! case files and interrogation answers, the registry that knows who can see a
//! workspace, and the push channel to connected subscribers.
//!
//! Only the fields the scheduler needs are modelled here.

pub mod broadcast;
pub mod errors;
pub mod in_memory;
pub mod notification;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::models::{ArtifactRef, ArtifactStatus};

pub use broadcast::{BroadcastNotificationSink, PushedNotification};
pub use errors::{DomainError, DomainResult};
pub use in_memory::{
    InMemoryAccessRegistry, InMemoryArtifactRepository, RecordedNotification,
    RecordingNotificationSink, StoredArtifact,
};
pub use notification::{
    case_status_destination, interrogation_destination, CaseProcessingNotification,
    FileStatusInfo, InterrogationNotification, InterrogationNotificationStatus, Notification,
};
pub use postgres::{PgAccessRegistry, PgArtifactRepository};

/// Current view of an artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactSnapshot {
    pub artifact: ArtifactRef,
    pub workspace_id: String,
    pub name: String,
    pub status: ArtifactStatus,
}

/// Status change applied to an artifact alongside a task transition
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactUpdate {
    pub status: ArtifactStatus,
    /// Transcribed answer text (audio completion only)
    pub answer_text: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

impl ArtifactUpdate {
    pub fn status(status: ArtifactStatus) -> Self {
        Self {
            status,
            answer_text: None,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn with_answer(mut self, text: Option<String>) -> Self {
        self.answer_text = text;
        self
    }

    pub fn with_completed_at(mut self, at: NaiveDateTime) -> Self {
        self.completed_at = Some(at);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error_message = Some(error.into());
        self
    }
}

#[async_trait]
pub trait ArtifactRepository: Send + Sync + 'static {
    async fn find_artifact(&self, artifact: ArtifactRef) -> DomainResult<Option<ArtifactSnapshot>>;

    /// Apply a status change; `NotFound` if the artifact was deleted
    async fn update_status(&self, artifact: ArtifactRef, update: ArtifactUpdate) -> DomainResult<()>;

    /// Every case file in a workspace, for status snapshots
    async fn workspace_files(&self, workspace_id: &str) -> DomainResult<Vec<FileStatusInfo>>;

    async fn workspace_title(&self, workspace_id: &str) -> DomainResult<Option<String>>;
}

#[async_trait]
pub trait AccessRegistry: Send + Sync + 'static {
    /// Owner plus every member the workspace is shared with
    async fn accessible_tenants(&self, workspace_id: &str) -> DomainResult<Vec<String>>;
}

#[async_trait]
pub trait NotificationSink: Send + Sync + 'static {
    async fn push(
        &self,
        tenant_id: &str,
        destination: &str,
        notification: &Notification,
    ) -> DomainResult<()>;
}
