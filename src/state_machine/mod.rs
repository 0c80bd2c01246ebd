// State machine module for task record lifecycle
//
// Pure transition logic: (current state, event) -> decision, plus the artifact
// status that accompanies each applied transition.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

// Re-export main types for convenient access
pub use errors::{StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use states::TaskState;
pub use task_state_machine::{Decision, TaskStateMachine};
