//! # Task Record
//!
//! Durable queue entry tracking one artifact's processing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::{ArtifactKind, ArtifactRef};
use crate::state_machine::TaskState;

pub type TaskId = Uuid;

/// Task queue row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    /// Store-assigned insertion order, tie-break for equal `created_at`
    pub sequence: i64,
    /// Submitting tenant (user email)
    pub tenant_id: String,
    /// Workspace the artifact belongs to (case number)
    pub workspace_id: String,
    /// Case id for documents, interrogation id for audio
    pub parent_id: i64,
    pub artifact: ArtifactRef,
    pub artifact_name: String,
    /// Opaque object-storage pointer handed to the worker
    pub artifact_location: String,
    pub locale: Option<String>,
    pub status: TaskState,
    /// Reserved; never read by dispatch
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub result: Option<String>,
}

impl TaskRecord {
    pub fn kind(&self) -> ArtifactKind {
        self.artifact.kind
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Build the pending row for a submission
    pub fn from_submission(
        id: TaskId,
        sequence: i64,
        submission: NewTaskRecord,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            sequence,
            tenant_id: submission.tenant_id,
            workspace_id: submission.workspace_id,
            parent_id: submission.parent_id,
            artifact: submission.artifact,
            artifact_name: submission.artifact_name,
            artifact_location: submission.artifact_location,
            locale: submission.locale,
            status: TaskState::Pending,
            priority: submission.priority,
            created_at,
            dispatched_at: None,
            completed_at: None,
            error_message: None,
            result: None,
        }
    }
}

/// Submission payload for [`crate::store::TaskStore::enqueue`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTaskRecord {
    pub tenant_id: String,
    pub workspace_id: String,
    pub parent_id: i64,
    pub artifact: ArtifactRef,
    pub artifact_name: String,
    pub artifact_location: String,
    pub locale: Option<String>,
    pub priority: i32,
}

impl NewTaskRecord {
    /// Submission for an uploaded case file
    pub fn document(
        tenant_id: impl Into<String>,
        case_id: i64,
        case_number: impl Into<String>,
        case_file_id: i64,
        file_name: impl Into<String>,
        file_url: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            workspace_id: case_number.into(),
            parent_id: case_id,
            artifact: ArtifactRef::document(case_file_id),
            artifact_name: file_name.into(),
            artifact_location: file_url.into(),
            locale: None,
            priority: 0,
        }
    }

    /// Submission for a recorded interrogation answer
    pub fn audio(
        tenant_id: impl Into<String>,
        interrogation_id: i64,
        case_number: impl Into<String>,
        qa_id: i64,
        file_name: impl Into<String>,
        audio_url: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            workspace_id: case_number.into(),
            parent_id: interrogation_id,
            artifact: ArtifactRef::audio(qa_id),
            artifact_name: file_name.into(),
            artifact_location: audio_url.into(),
            locale: Some(language.into()),
            priority: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_submission_starts_pending() {
        let submission = NewTaskRecord::document(
            "alice@example.com",
            10,
            "CASE-1",
            100,
            "report.pdf",
            "cases/CASE-1/report.pdf",
        );
        let record = TaskRecord::from_submission(Uuid::new_v4(), 1, submission, Utc::now());

        assert_eq!(record.status, TaskState::Pending);
        assert_eq!(record.kind(), ArtifactKind::Document);
        assert_eq!(record.priority, 0);
        assert!(record.dispatched_at.is_none());
        assert!(record.completed_at.is_none());
        assert!(!record.is_terminal());
    }

    #[test]
    fn test_audio_submission_carries_locale() {
        let submission = NewTaskRecord::audio(
            "bob@example.com",
            5,
            "CASE-2",
            77,
            "answer.ogg",
            "audio/CASE-2/answer.ogg",
            "ru",
        );
        assert_eq!(submission.artifact, ArtifactRef::audio(77));
        assert_eq!(submission.parent_id, 5);
        assert_eq!(submission.locale.as_deref(), Some("ru"));
    }
}
