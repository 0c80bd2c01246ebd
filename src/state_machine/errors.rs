use thiserror::Error;

use super::states::TaskState;

/// Errors raised while deciding a task transition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid transition from {from:?} on event {event}")]
    InvalidTransition { from: Option<String>, event: String },

    #[error("Internal state machine error: {0}")]
    Internal(String),
}

impl StateMachineError {
    pub fn invalid_transition(from: Option<TaskState>, event: impl Into<String>) -> Self {
        Self::InvalidTransition {
            from: from.map(|s| s.to_string()),
            event: event.into(),
        }
    }
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
