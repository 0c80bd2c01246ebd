//! # Models
//!
//! Task queue rows and the artifact status enums the scheduler reads and writes.

pub mod artifact;
pub mod task_record;

pub use artifact::{ArtifactKind, ArtifactRef, ArtifactStatus, CaseFileStatus, QaStatus};
pub use task_record::{NewTaskRecord, TaskId, TaskRecord};
