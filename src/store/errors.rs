//! # Task Store Error Types

use thiserror::Error;

use crate::models::{ArtifactRef, TaskId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Task record not found: {id}")]
    NotFound { id: TaskId },

    #[error("Artifact {artifact} already has an active task record")]
    DuplicateActiveTask { artifact: ArtifactRef },

    #[error("Database query error: {operation}: {message}")]
    DatabaseQuery { operation: String, message: String },

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    #[error("Corrupt task record {column}: {message}")]
    CorruptRecord { column: String, message: String },
}

impl StoreError {
    pub fn database_query(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DatabaseQuery {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn corrupt_record(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptRecord {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Conversion from sqlx::Error to StoreError
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => StoreError::database_query("database", db_err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => StoreError::DatabaseConnection {
                message: err.to_string(),
            },
            sqlx::Error::ColumnDecode { index, source } => {
                StoreError::corrupt_record(index, source.to_string())
            }
            _ => StoreError::database_query("query", err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::DuplicateActiveTask {
            artifact: ArtifactRef::document(9),
        };
        assert_eq!(
            err.to_string(),
            "Artifact document:9 already has an active task record"
        );

        let err = StoreError::database_query("mark_completed", "connection reset");
        assert!(err.to_string().contains("mark_completed"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_sqlx_conversion() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::DatabaseConnection { .. }));
    }
}
