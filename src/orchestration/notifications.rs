//! # Notification Dispatcher
//!
//! Fans workspace and interrogation updates out to every tenant with access to
//! the workspace. Delivery is best-effort: every collaborator lookup and every
//! push is bounded by the configured timeout, and failures are logged and
//! swallowed so they can never roll back or stall a task transition.

use chrono::{Local, NaiveDateTime};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{components, UNKNOWN_CASE_TITLE};
use crate::domain::{
    case_status_destination, interrogation_destination, AccessRegistry, ArtifactRepository,
    CaseProcessingNotification, DomainResult, FileStatusInfo, InterrogationNotification,
    InterrogationNotificationStatus, Notification, NotificationSink,
};
use crate::logging::log_error;
use crate::models::CaseFileStatus;

/// What just happened to a file in the workspace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceActivity {
    pub message: String,
    pub file_id: Option<i64>,
    pub file_name: Option<String>,
}

impl WorkspaceActivity {
    fn for_file(message: String, file_id: i64, file_name: &str) -> Self {
        Self {
            message,
            file_id: Some(file_id),
            file_name: Some(file_name.to_string()),
        }
    }

    pub fn queued(file_id: i64, file_name: &str) -> Self {
        Self::for_file(format!("File queued for processing: {file_name}"), file_id, file_name)
    }

    pub fn queue_failed(file_id: i64, file_name: &str, error: &str) -> Self {
        Self::for_file(
            format!("Failed to queue file: {file_name} - {error}"),
            file_id,
            file_name,
        )
    }

    pub fn started(file_id: i64, file_name: &str) -> Self {
        Self::for_file(format!("Processing started: {file_name}"), file_id, file_name)
    }

    pub fn completed(file_id: i64, file_name: &str) -> Self {
        Self::for_file(format!("Processing completed: {file_name}"), file_id, file_name)
    }

    pub fn failed(file_id: i64, file_name: &str, error: &str) -> Self {
        Self::for_file(
            format!("Processing failed: {file_name} - {error}"),
            file_id,
            file_name,
        )
    }
}

/// Transcription progress for one answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterrogationActivity {
    pub interrogation_id: i64,
    pub qa_id: i64,
    pub status: InterrogationNotificationStatus,
    pub transcribed_text: Option<String>,
    pub error_message: Option<String>,
}

impl InterrogationActivity {
    pub fn new(interrogation_id: i64, qa_id: i64, status: InterrogationNotificationStatus) -> Self {
        Self {
            interrogation_id,
            qa_id,
            status,
            transcribed_text: None,
            error_message: None,
        }
    }

    pub fn with_text(mut self, text: Option<String>) -> Self {
        self.transcribed_text = text;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error_message = error;
        self
    }

    fn describe(&self) -> String {
        match self.status {
            InterrogationNotificationStatus::Queued => "Answer queued for transcription",
            InterrogationNotificationStatus::Processing => "Transcription started",
            InterrogationNotificationStatus::Completed => "Transcription completed",
            InterrogationNotificationStatus::Failed => "Transcription failed",
        }
        .to_string()
    }
}

pub struct NotificationDispatcher {
    artifacts: Arc<dyn ArtifactRepository>,
    access: Arc<dyn AccessRegistry>,
    sink: Arc<dyn NotificationSink>,
    delivery_timeout: Duration,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("delivery_timeout", &self.delivery_timeout)
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    pub fn new(
        artifacts: Arc<dyn ArtifactRepository>,
        access: Arc<dyn AccessRegistry>,
        sink: Arc<dyn NotificationSink>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            artifacts,
            access,
            sink,
            delivery_timeout,
        }
    }

    /// Push a fresh workspace snapshot to everyone with access
    pub async fn notify_workspace(&self, workspace_id: &str, activity: WorkspaceActivity) {
        let build = self.build_case_notification(workspace_id, activity);
        let Some(notification) = self
            .bounded(workspace_id, "build_case_notification", build)
            .await
        else {
            return;
        };

        let destination = case_status_destination(workspace_id);
        self.fan_out(workspace_id, &destination, Notification::CaseProcessing(notification))
            .await;
    }

    pub async fn notify_interrogation(&self, workspace_id: &str, activity: InterrogationActivity) {
        let notification = InterrogationNotification {
            case_number: workspace_id.to_string(),
            interrogation_id: activity.interrogation_id,
            qa_id: activity.qa_id,
            status: activity.status,
            activity: activity.describe(),
            transcribed_text: activity.transcribed_text,
            error_message: activity.error_message,
            timestamp: now(),
        };

        let destination = interrogation_destination(workspace_id);
        self.fan_out(workspace_id, &destination, Notification::Interrogation(notification))
            .await;
    }

    async fn build_case_notification(
        &self,
        workspace_id: &str,
        activity: WorkspaceActivity,
    ) -> DomainResult<CaseProcessingNotification> {
        let files = self.artifacts.workspace_files(workspace_id).await?;
        let title = self
            .artifacts
            .workspace_title(workspace_id)
            .await?
            .unwrap_or_else(|| UNKNOWN_CASE_TITLE.to_string());

        Ok(summarize(workspace_id, title, files, activity))
    }

    /// Deliver to every tenant, each push bounded by the delivery timeout
    async fn fan_out(&self, workspace_id: &str, destination: &str, notification: Notification) {
        let lookup = self.access.accessible_tenants(workspace_id);
        let Some(tenants) = self
            .bounded(workspace_id, "accessible_tenants", lookup)
            .await
        else {
            return;
        };

        if tenants.is_empty() {
            warn!(workspace_id = workspace_id, "No tenants have access to workspace");
            return;
        }

        let mut delivered = 0usize;
        for tenant in &tenants {
            let push = self.sink.push(tenant, destination, &notification);
            match tokio::time::timeout(self.delivery_timeout, push).await {
                Ok(Ok(())) => {
                    delivered += 1;
                    debug!(tenant_id = %tenant, destination = destination, "Notification delivered");
                }
                Ok(Err(e)) => {
                    warn!(tenant_id = %tenant, destination = destination, error = %e, "Notification delivery failed");
                }
                Err(_) => {
                    warn!(
                        tenant_id = %tenant,
                        destination = destination,
                        timeout_ms = self.delivery_timeout.as_millis() as u64,
                        "Notification delivery timed out"
                    );
                }
            }
        }

        info!(
            workspace_id = workspace_id,
            destination = destination,
            delivered = delivered,
            tenants = tenants.len(),
            "Notification fan-out finished"
        );
    }

    /// Await a collaborator lookup for at most the delivery timeout
    async fn bounded<T>(
        &self,
        workspace_id: &str,
        operation: &str,
        lookup: impl Future<Output = DomainResult<T>>,
    ) -> Option<T> {
        match tokio::time::timeout(self.delivery_timeout, lookup).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                log_error(
                    components::NOTIFICATIONS,
                    operation,
                    &e.to_string(),
                    Some(workspace_id),
                );
                None
            }
            Err(_) => {
                warn!(
                    workspace_id = workspace_id,
                    operation = operation,
                    timeout_ms = self.delivery_timeout.as_millis() as u64,
                    "Notification lookup timed out"
                );
                None
            }
        }
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Count files by status and attach the latest activity
fn summarize(
    workspace_id: &str,
    title: String,
    files: Vec<FileStatusInfo>,
    activity: WorkspaceActivity,
) -> CaseProcessingNotification {
    let count = |status: CaseFileStatus| files.iter().filter(|f| f.status == status).count();

    CaseProcessingNotification {
        case_number: workspace_id.to_string(),
        case_title: title,
        total_files: files.len(),
        pending_files: count(CaseFileStatus::Pending),
        processing_files: count(CaseFileStatus::Processing),
        completed_files: count(CaseFileStatus::Completed),
        failed_files: count(CaseFileStatus::Failed),
        latest_activity: activity.message,
        latest_file_id: activity.file_id,
        latest_file_name: activity.file_name,
        timestamp: now(),
        files,
    }
}
