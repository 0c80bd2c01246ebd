//! # Crate Error Type
//!
//! Per-layer errors roll up into [`FairqError`] so orchestration code can use `?`
//! across the store, broker, state machine and collaborators.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::domain::DomainError;
use crate::messaging::MessagingError;
use crate::state_machine::StateMachineError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum FairqError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("State machine error: {0}")]
    StateMachine(#[from] StateMachineError),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

impl FairqError {
    /// A record or artifact the operation refers to no longer exists
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Store(e) => e.is_not_found(),
            Self::Domain(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// The event does not apply to the record's current state
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            Self::StateMachine(StateMachineError::InvalidTransition { .. })
        )
    }
}

impl From<sqlx::Error> for FairqError {
    fn from(err: sqlx::Error) -> Self {
        Self::Store(StoreError::from(err))
    }
}

pub type Result<T> = std::result::Result<T, FairqError>;
