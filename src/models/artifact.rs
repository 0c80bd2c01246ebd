use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of artifact a task record points at
///
/// Artifact ids are only unique within a kind (case files and QA pairs live in
/// separate tables), so every lookup is keyed by [`ArtifactRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Uploaded case file sent for document analysis
    Document,
    /// Recorded interrogation answer sent for transcription
    Audio,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Document => write!(f, "document"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "document" => Ok(Self::Document),
            "audio" => Ok(Self::Audio),
            _ => Err(format!("Invalid artifact kind: {s}")),
        }
    }
}

/// Typed reference to a domain artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    pub id: i64,
}

impl ArtifactRef {
    pub fn document(id: i64) -> Self {
        Self {
            kind: ArtifactKind::Document,
            id,
        }
    }

    pub fn audio(id: i64) -> Self {
        Self {
            kind: ArtifactKind::Audio,
            id,
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Status of an uploaded case file
///
/// Variants are declared in lifecycle order; a file only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseFileStatus {
    /// Stored in object storage, not yet submitted
    Uploaded,
    /// Task record created, waiting for its round-robin turn
    Queued,
    /// Published to the broker, waiting for a worker to pick it up
    Pending,
    /// Worker acknowledged and is analysing the file
    Processing,
    Completed,
    Failed,
}

impl CaseFileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "UPLOADED",
            Self::Queued => "QUEUED",
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl std::str::FromStr for CaseFileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UPLOADED" => Ok(Self::Uploaded),
            "QUEUED" => Ok(Self::Queued),
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid case file status: {s}")),
        }
    }
}

/// Status of an interrogation question/answer pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QaStatus {
    /// Question added; no transcribed answer yet (also the rollback target)
    Pending,
    /// Audio handed to the transcription worker
    Transcribing,
    /// Answer text received
    Transcribed,
    /// Answer analysed downstream
    Analysed,
}

impl QaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Transcribing => "TRANSCRIBING",
            Self::Transcribed => "TRANSCRIBED",
            Self::Analysed => "ANALYSED",
        }
    }
}

impl std::str::FromStr for QaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "TRANSCRIBING" => Ok(Self::Transcribing),
            "TRANSCRIBED" => Ok(Self::Transcribed),
            "ANALYSED" => Ok(Self::Analysed),
            _ => Err(format!("Invalid QA status: {s}")),
        }
    }
}

/// Artifact status across both artifact kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    File(CaseFileStatus),
    Qa(QaStatus),
}

impl ArtifactStatus {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::File(_) => ArtifactKind::Document,
            Self::Qa(_) => ArtifactKind::Audio,
        }
    }
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(status) => write!(f, "{}", status.as_str()),
            Self::Qa(status) => write!(f, "{}", status.as_str()),
        }
    }
}
