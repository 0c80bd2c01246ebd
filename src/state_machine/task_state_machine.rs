use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskState,
};
use crate::models::{ArtifactKind, ArtifactStatus, CaseFileStatus, QaStatus};

/// Result of deciding an event against the current record state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Persist `from -> to` and apply the artifact side effect
    Apply { from: Option<TaskState>, to: TaskState },
    /// Record is already terminal; the event is an idempotent no-op
    Absorbed(TaskState),
}

impl Decision {
    pub fn is_absorbed(&self) -> bool {
        matches!(self, Self::Absorbed(_))
    }
}

/// Pure transition logic shared by the scheduler and the result consumers
///
/// Holds no state; persistence is the caller's job (see
/// [`crate::orchestration::TaskLifecycle`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStateMachine;

impl TaskStateMachine {
    /// Determine the transition for `event` given the record's current state
    ///
    /// `current` is `None` only for a record that does not exist yet.
    pub fn decide(current: Option<TaskState>, event: &TaskEvent) -> StateMachineResult<Decision> {
        let decision = match (current, event) {
            (None, TaskEvent::Submit) => Decision::Apply {
                from: None,
                to: TaskState::Pending,
            },

            (Some(TaskState::Pending), TaskEvent::Dispatch) => Decision::Apply {
                from: current,
                to: TaskState::Dispatching,
            },

            // Informational; artifact status moves, record status does not
            (Some(TaskState::Dispatching), TaskEvent::Acknowledge) => Decision::Apply {
                from: current,
                to: TaskState::Dispatching,
            },

            (Some(TaskState::Dispatching), TaskEvent::Complete(_)) => Decision::Apply {
                from: current,
                to: TaskState::Completed,
            },

            (Some(TaskState::Dispatching), TaskEvent::Fail(_)) => Decision::Apply {
                from: current,
                to: TaskState::Failed,
            },

            // Terminal states absorb duplicate or late worker results
            (
                Some(state @ (TaskState::Completed | TaskState::Failed)),
                TaskEvent::Acknowledge | TaskEvent::Complete(_) | TaskEvent::Fail(_),
            ) => Decision::Absorbed(state),

            (from_state, _) => {
                return Err(StateMachineError::invalid_transition(
                    from_state,
                    event.event_type(),
                ))
            }
        };

        Ok(decision)
    }

    /// Artifact status that accompanies an applied transition
    ///
    /// Audio failure rolls the QA pair back to `PENDING` so the answer can be
    /// re-recorded, whereas a document failure is terminal.
    pub fn artifact_effect(kind: ArtifactKind, event: &TaskEvent) -> ArtifactStatus {
        match kind {
            ArtifactKind::Document => ArtifactStatus::File(match event {
                TaskEvent::Submit => CaseFileStatus::Queued,
                TaskEvent::Dispatch => CaseFileStatus::Pending,
                TaskEvent::Acknowledge => CaseFileStatus::Processing,
                TaskEvent::Complete(_) => CaseFileStatus::Completed,
                TaskEvent::Fail(_) => CaseFileStatus::Failed,
            }),
            ArtifactKind::Audio => ArtifactStatus::Qa(match event {
                TaskEvent::Submit => QaStatus::Pending,
                TaskEvent::Dispatch | TaskEvent::Acknowledge => QaStatus::Transcribing,
                TaskEvent::Complete(_) => QaStatus::Transcribed,
                TaskEvent::Fail(_) => QaStatus::Pending,
            }),
        }
    }
}
