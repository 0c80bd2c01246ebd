//! Subscriber-facing notification payloads, camelCase on the wire.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::models::CaseFileStatus;

/// One file row in a workspace status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStatusInfo {
    pub file_id: i64,
    pub file_name: String,
    pub status: CaseFileStatus,
    pub uploaded_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub error_message: Option<String>,
}

/// Workspace-wide processing snapshot sent after every document transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseProcessingNotification {
    pub case_number: String,
    pub case_title: String,
    pub total_files: usize,
    pub pending_files: usize,
    pub processing_files: usize,
    pub completed_files: usize,
    pub failed_files: usize,
    pub files: Vec<FileStatusInfo>,
    pub latest_activity: String,
    pub latest_file_id: Option<i64>,
    pub latest_file_name: Option<String>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterrogationNotificationStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Per-answer transcription update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterrogationNotification {
    pub case_number: String,
    pub interrogation_id: i64,
    pub qa_id: i64,
    pub status: InterrogationNotificationStatus,
    pub activity: String,
    /// Only set on completion
    pub transcribed_text: Option<String>,
    /// Only set on failure
    pub error_message: Option<String>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Notification {
    CaseProcessing(CaseProcessingNotification),
    Interrogation(InterrogationNotification),
}

impl Notification {
    pub fn case_number(&self) -> &str {
        match self {
            Self::CaseProcessing(n) => &n.case_number,
            Self::Interrogation(n) => &n.case_number,
        }
    }
}

/// Destination for workspace status snapshots
pub fn case_status_destination(workspace_id: &str) -> String {
    format!("/queue/case/{workspace_id}/status")
}

/// Destination for interrogation transcription updates
pub fn interrogation_destination(workspace_id: &str) -> String {
    format!("/queue/case/{workspace_id}/interrogation")
}
