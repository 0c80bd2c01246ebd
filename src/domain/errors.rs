use thiserror::Error;

/// Errors raised by the external collaborators
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Repository error: {operation}: {message}")]
    Repository { operation: String, message: String },

    #[error("Notification delivery failed for {tenant}: {message}")]
    Delivery { tenant: String, message: String },
}

impl DomainError {
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn repository(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Repository {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn delivery(tenant: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Delivery {
            tenant: tenant.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::repository("query", err.to_string())
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
