//! # Broker Message Structures
//!
//! Work messages published to the external workers and the result messages
//! they publish back. Field names are camelCase on the wire to match the
//! worker contract.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::errors::MessagingError;
use super::topology::WorkTopic;
use crate::models::{ArtifactKind, TaskRecord};

/// Message serialization contract
///
/// Anything serde can round-trip goes over the broker as JSON.
pub trait QueueMessage: Send + Sync + Clone + 'static {
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError>;

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError>
    where
        Self: Sized;
}

impl<T> QueueMessage for T
where
    T: Serialize + serde::de::DeserializeOwned + Send + Sync + Clone + 'static,
{
    fn to_bytes(&self) -> Result<Vec<u8>, MessagingError> {
        serde_json::to_vec(self).map_err(|e| MessagingError::message_serialization(e.to_string()))
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, MessagingError> {
        serde_json::from_slice(bytes)
            .map_err(|e| MessagingError::message_deserialization(e.to_string()))
    }
}

/// Work message for document analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentProcessingMessage {
    pub case_id: i64,
    pub case_file_id: i64,
    pub file_url: String,
    pub original_file_name: String,
    pub user_email: String,
    pub case_number: String,
}

/// Work message for answer transcription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioProcessingMessage {
    pub interrogation_id: i64,
    pub qa_id: i64,
    pub case_number: String,
    pub audio_file_url: String,
    pub original_file_name: String,
    pub language: String,
    pub email: String,
}

/// Outbound work, one variant per topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkMessage {
    Document(DocumentProcessingMessage),
    Audio(AudioProcessingMessage),
}

impl WorkMessage {
    /// Build the work message for a task record about to be dispatched
    pub fn from_record(record: &TaskRecord) -> Self {
        match record.kind() {
            ArtifactKind::Document => Self::Document(DocumentProcessingMessage {
                case_id: record.parent_id,
                case_file_id: record.artifact.id,
                file_url: record.artifact_location.clone(),
                original_file_name: record.artifact_name.clone(),
                user_email: record.tenant_id.clone(),
                case_number: record.workspace_id.clone(),
            }),
            ArtifactKind::Audio => Self::Audio(AudioProcessingMessage {
                interrogation_id: record.parent_id,
                qa_id: record.artifact.id,
                case_number: record.workspace_id.clone(),
                audio_file_url: record.artifact_location.clone(),
                original_file_name: record.artifact_name.clone(),
                language: record.locale.clone().unwrap_or_default(),
                email: record.tenant_id.clone(),
            }),
        }
    }

    pub fn topic(&self) -> WorkTopic {
        match self {
            Self::Document(_) => WorkTopic::DocumentProcessing,
            Self::Audio(_) => WorkTopic::AudioProcessing,
        }
    }

    pub fn case_number(&self) -> &str {
        match self {
            Self::Document(m) => &m.case_number,
            Self::Audio(m) => &m.case_number,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentResultStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Document analysis result published by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResultMessage {
    pub case_file_id: i64,
    pub case_number: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub user_email: Option<String>,
    pub status: DocumentResultStatus,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub processing_duration_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscriptionStatus {
    Processing,
    Completed,
    Failed,
}

/// Transcription result published by the worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionResultMessage {
    pub interrogation_id: i64,
    #[serde(default)]
    pub qa_id: Option<i64>,
    pub case_number: String,
    pub status: TranscriptionStatus,
    #[serde(default)]
    pub transcribed_text: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
}

impl TranscriptionResultMessage {
    /// Answer text with the worker's `{"data": ...}` envelope removed
    ///
    /// Anything that is not an object carrying `data` is returned verbatim.
    pub fn extract_text(&self) -> Option<String> {
        self.transcribed_text.as_deref().map(extract_text)
    }
}

/// Unwrap a `{"data": ...}` envelope, falling back to the raw text
pub fn extract_text(raw: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => match map.get("data") {
            Some(serde_json::Value::String(text)) => text.clone(),
            Some(serde_json::Value::Null) => String::new(),
            Some(other) => other.to_string(),
            None => raw.to_string(),
        },
        Ok(_) => raw.to_string(),
        Err(e) => {
            warn!(error = %e, "Transcription text is not JSON, using raw text");
            raw.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewTaskRecord;
    use chrono::Utc;
    use uuid::Uuid;

    fn audio_record() -> TaskRecord {
        let submission = NewTaskRecord::audio(
            "bob@example.com",
            5,
            "CASE-2",
            77,
            "answer.ogg",
            "audio/CASE-2/answer.ogg",
            "kk",
        );
        TaskRecord::from_submission(Uuid::new_v4(), 1, submission, Utc::now())
    }

    #[test]
    fn test_work_message_from_audio_record() {
        let message = WorkMessage::from_record(&audio_record());
        assert_eq!(message.topic(), WorkTopic::AudioProcessing);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["interrogationId"], 5);
        assert_eq!(json["qaId"], 77);
        assert_eq!(json["audioFileUrl"], "audio/CASE-2/answer.ogg");
        assert_eq!(json["language"], "kk");
        assert_eq!(json["email"], "bob@example.com");
    }

    #[test]
    fn test_work_message_round_trip_keeps_variant() {
        let message = WorkMessage::Document(DocumentProcessingMessage {
            case_id: 10,
            case_file_id: 100,
            file_url: "cases/CASE-1/report.pdf".to_string(),
            original_file_name: "report.pdf".to_string(),
            user_email: "alice@example.com".to_string(),
            case_number: "CASE-1".to_string(),
        });

        let decoded = WorkMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, message);
        assert_eq!(decoded.topic(), WorkTopic::DocumentProcessing);
    }

    #[test]
    fn test_processing_result_parses_worker_payload() {
        let payload = br#"{
            "caseFileId": 100,
            "caseNumber": "CASE-1",
            "fileName": "report.pdf",
            "userEmail": "alice@example.com",
            "status": "COMPLETED",
            "result": "summary",
            "errorMessage": null,
            "timestamp": "2025-03-01T10:15:30.123",
            "processingDurationSeconds": 12
        }"#;

        let message = ProcessingResultMessage::from_bytes(payload).unwrap();
        assert_eq!(message.status, DocumentResultStatus::Completed);
        assert_eq!(message.result.as_deref(), Some("summary"));
        assert!(message.timestamp.is_some());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let payload = br#"{"caseFileId": 1, "caseNumber": "C", "status": "EXPLODED"}"#;
        assert!(ProcessingResultMessage::from_bytes(payload).is_err());
    }

    #[test]
    fn test_extract_text() {
        assert_eq!(extract_text(r#"{"data": "hello"}"#), "hello");
        assert_eq!(extract_text("plain answer"), "plain answer");
        assert_eq!(extract_text(r#"{"other": 1}"#), r#"{"other": 1}"#);
        assert_eq!(extract_text("[1, 2]"), "[1, 2]");
    }
}
