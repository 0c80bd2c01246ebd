use serde::{Deserialize, Serialize};

/// Events that can trigger task record transitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Record is created for a freshly uploaded artifact
    Submit,
    /// Scheduler claims the record and publishes it
    Dispatch,
    /// Worker reported that processing started
    Acknowledge,
    /// Worker finished, with optional result text
    Complete(Option<String>),
    /// Worker, broker or reaper reported a failure
    Fail(String),
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::Dispatch => "dispatch",
            Self::Acknowledge => "acknowledge",
            Self::Complete(_) => "complete",
            Self::Fail(_) => "fail",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    /// Extract result text if this is a completion event
    pub fn result(&self) -> Option<&str> {
        match self {
            Self::Complete(result) => result.as_deref(),
            _ => None,
        }
    }

    /// Check if this event represents a terminal transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Fail(_))
    }

    /// Create a failure event with the given error message
    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let fail = TaskEvent::fail_with_error("worker crashed");
        assert_eq!(fail.event_type(), "fail");
        assert_eq!(fail.error_message(), Some("worker crashed"));
        assert!(fail.is_terminal());

        let complete = TaskEvent::Complete(Some("summary".to_string()));
        assert_eq!(complete.result(), Some("summary"));
        assert!(complete.error_message().is_none());

        assert!(!TaskEvent::Acknowledge.is_terminal());
    }
}
