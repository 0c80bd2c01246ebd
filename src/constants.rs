//! # System Constants
//!
//! Operational names and fallback values shared across the scheduler,
//! consumers and notification layer.

/// Component names used in structured error logs
pub mod components {
    pub const SCHEDULER: &str = "round_robin_scheduler";
    pub const DOCUMENT_CONSUMER: &str = "document_result_consumer";
    pub const TRANSCRIPTION_CONSUMER: &str = "transcription_result_consumer";
    pub const NOTIFICATIONS: &str = "notification_dispatcher";
    pub const HOUSEKEEPER: &str = "housekeeper";
}

/// Case title used when the workspace has none on record
pub const UNKNOWN_CASE_TITLE: &str = "Unknown Case";

/// Error recorded when a record's artifact was deleted before dispatch
pub const ARTIFACT_MISSING_ERROR: &str = "artifact no longer exists";

/// Error recorded by the stale-dispatch reaper
pub const STALE_DISPATCH_ERROR: &str = "no result received from worker before timeout";

/// Capacity of the broadcast channel behind `BroadcastNotificationSink`
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 1024;
