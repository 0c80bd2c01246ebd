use serde::{Deserialize, Serialize};
use std::fmt;

/// Task record states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Stored, waiting for the scheduler to pick it
    Pending,
    /// Claimed by the scheduler and handed to the broker; awaiting a worker result
    #[serde(alias = "processing")]
    Dispatching,
    /// Worker reported success
    Completed,
    /// Worker reported failure, publish failed, or the dispatch went stale
    Failed,
}

impl TaskState {
    /// Check if this is a terminal state (absorbing, no further transitions)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Check if this state is still eligible for dispatch or awaiting a result
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatching => "dispatching",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "dispatching" | "processing" => Ok(Self::Dispatching),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}

/// Default state for new task records
impl Default for TaskState {
    fn default() -> Self {
        Self::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_terminal_check() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
        assert!(!TaskState::Dispatching.is_terminal());
    }

    #[test]
    fn test_state_string_conversion() {
        assert_eq!(TaskState::Dispatching.to_string(), "dispatching");
        assert_eq!(
            "completed".parse::<TaskState>().unwrap(),
            TaskState::Completed
        );
        assert_eq!(
            "processing".parse::<TaskState>().unwrap(),
            TaskState::Dispatching
        );
        assert!("running".parse::<TaskState>().is_err());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&TaskState::Dispatching).unwrap();
        assert_eq!(json, "\"dispatching\"");

        let parsed: TaskState = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(parsed, TaskState::Dispatching);
    }
}
