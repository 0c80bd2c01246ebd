//! # Orchestration
//!
//! Fair dispatch of artifact-processing work across tenants.
//!
//! ## Core Components
//!
//! - **TaskEnqueuer**: stores pending records for uploaded artifacts
//! - **RoundRobinScheduler**: rotates across tenants with pending work and
//!   publishes one record per rotation step
//! - **DocumentResultConsumer / TranscriptionResultConsumer**: apply worker
//!   results from the result queues
//! - **TaskLifecycle**: every record transition goes through here, paired with
//!   the artifact status change it implies
//! - **NotificationDispatcher**: pushes status updates to workspace members
//! - **Housekeeper**: retention purge and stale-dispatch reaper
//! - **ProcessingSystem**: builds and runs all of the above

pub mod bootstrap;
pub mod enqueuer;
pub mod housekeeping;
pub mod lifecycle;
pub mod notifications;
pub mod result_consumer;
pub mod scheduler;

pub use bootstrap::{ProcessingSystem, ProcessingSystemHandle, SystemStatus};
pub use enqueuer::TaskEnqueuer;
pub use housekeeping::{Housekeeper, ReapReport};
pub use lifecycle::{LifecycleOutcome, TaskLifecycle};
pub use notifications::{InterrogationActivity, NotificationDispatcher, WorkspaceActivity};
pub use result_consumer::{
    DocumentResultConsumer, ListenerReport, ResultHandler, ResultListener,
    TranscriptionResultConsumer,
};
pub use scheduler::{DispatchOutcome, RotationCursor, RoundRobinScheduler};
