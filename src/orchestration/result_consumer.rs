//! # Result Consumers
//!
//! Apply worker results to task records and artifacts, then notify
//! subscribers. One handler per result channel; [`ResultListener`] drives a
//! handler from a broker subscription with bounded concurrency.
//!
//! Settlement rules:
//!
//! - handler returned `Ok` -> ack
//! - payload could not be decoded -> reject (dead-lettered)
//! - handler returned `Err` -> reject (dead-lettered)
//!
//! Results for deleted artifacts, unknown records, or records in a state the
//! result does not apply to are logged as warnings and acked.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::lifecycle::{LifecycleOutcome, TaskLifecycle};
use super::notifications::{InterrogationActivity, NotificationDispatcher, WorkspaceActivity};
use crate::constants::components;
use crate::domain::InterrogationNotificationStatus;
use crate::error::Result;
use crate::logging::log_error;
use crate::messaging::{
    BrokerProvider, DocumentResultStatus, InboundDelivery, ProcessingResultMessage, QueueMessage,
    ResultChannel, TranscriptionResultMessage, TranscriptionStatus,
};
use crate::models::ArtifactRef;

/// Failure text used when a worker reports failure without a message
const UNSPECIFIED_WORKER_ERROR: &str = "worker reported failure without details";

#[async_trait]
pub trait ResultHandler: Send + Sync + 'static {
    type Message: QueueMessage;

    fn channel(&self) -> ResultChannel;

    fn component(&self) -> &'static str;

    async fn handle(&self, message: Self::Message) -> Result<()>;
}

/// Collapse outcomes that should not dead-letter the delivery
fn tolerate_stale(
    result: Result<LifecycleOutcome>,
    artifact: ArtifactRef,
) -> Result<Option<LifecycleOutcome>> {
    match result {
        Ok(outcome) => Ok(Some(outcome)),
        Err(e) if e.is_not_found() || e.is_invalid_transition() => {
            warn!(artifact = %artifact, error = %e, "Result does not apply to current record; skipping");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Handles `document-results`
#[derive(Debug)]
pub struct DocumentResultConsumer {
    lifecycle: Arc<TaskLifecycle>,
    notifications: Arc<NotificationDispatcher>,
}

impl DocumentResultConsumer {
    pub fn new(lifecycle: Arc<TaskLifecycle>, notifications: Arc<NotificationDispatcher>) -> Self {
        Self {
            lifecycle,
            notifications,
        }
    }
}

#[async_trait]
impl ResultHandler for DocumentResultConsumer {
    type Message = ProcessingResultMessage;

    fn channel(&self) -> ResultChannel {
        ResultChannel::DocumentResults
    }

    fn component(&self) -> &'static str {
        components::DOCUMENT_CONSUMER
    }

    async fn handle(&self, message: ProcessingResultMessage) -> Result<()> {
        let artifact = ArtifactRef::document(message.case_file_id);
        info!(
            artifact = %artifact,
            case_number = %message.case_number,
            status = ?message.status,
            duration_seconds = message.processing_duration_seconds,
            "Received document result"
        );

        let error_text = message
            .error_message
            .clone()
            .unwrap_or_else(|| UNSPECIFIED_WORKER_ERROR.to_string());

        let result = match message.status {
            DocumentResultStatus::Pending => {
                debug!(artifact = %artifact, "Ignoring PENDING document result");
                return Ok(());
            }
            DocumentResultStatus::Processing => self.lifecycle.acknowledge(artifact).await,
            DocumentResultStatus::Completed => {
                self.lifecycle
                    .complete(artifact, message.result.clone())
                    .await
            }
            DocumentResultStatus::Failed => self.lifecycle.fail(artifact, error_text.clone()).await,
        };

        let Some(outcome) = tolerate_stale(result, artifact)? else {
            return Ok(());
        };

        let record = match outcome {
            LifecycleOutcome::Applied { record, .. } => record,
            LifecycleOutcome::ArtifactMissing { record } => {
                warn!(
                    task_id = %record.id,
                    artifact = %artifact,
                    "Result for deleted case file consumed"
                );
                return Ok(());
            }
            other => {
                debug!(artifact = %artifact, outcome = ?other, "No notification for unapplied result");
                return Ok(());
            }
        };

        let file_id = record.artifact.id;
        let name = record.artifact_name.as_str();
        let activity = match message.status {
            DocumentResultStatus::Processing => WorkspaceActivity::started(file_id, name),
            DocumentResultStatus::Completed => WorkspaceActivity::completed(file_id, name),
            DocumentResultStatus::Failed => WorkspaceActivity::failed(file_id, name, &error_text),
            DocumentResultStatus::Pending => return Ok(()),
        };
        self.notifications
            .notify_workspace(&record.workspace_id, activity)
            .await;

        Ok(())
    }
}

/// Handles `audio-results`
#[derive(Debug)]
pub struct TranscriptionResultConsumer {
    lifecycle: Arc<TaskLifecycle>,
    notifications: Arc<NotificationDispatcher>,
}

impl TranscriptionResultConsumer {
    pub fn new(lifecycle: Arc<TaskLifecycle>, notifications: Arc<NotificationDispatcher>) -> Self {
        Self {
            lifecycle,
            notifications,
        }
    }
}

#[async_trait]
impl ResultHandler for TranscriptionResultConsumer {
    type Message = TranscriptionResultMessage;

    fn channel(&self) -> ResultChannel {
        ResultChannel::AudioResults
    }

    fn component(&self) -> &'static str {
        components::TRANSCRIPTION_CONSUMER
    }

    async fn handle(&self, message: TranscriptionResultMessage) -> Result<()> {
        info!(
            interrogation_id = message.interrogation_id,
            qa_id = message.qa_id,
            status = ?message.status,
            "Received transcription result"
        );

        let Some(qa_id) = message.qa_id else {
            warn!(
                interrogation_id = message.interrogation_id,
                "Transcription result without qaId; skipping"
            );
            return Ok(());
        };
        let artifact = ArtifactRef::audio(qa_id);

        let text = message.extract_text();
        let result = match message.status {
            TranscriptionStatus::Processing => self.lifecycle.acknowledge(artifact).await,
            TranscriptionStatus::Completed => self.lifecycle.complete(artifact, text.clone()).await,
            TranscriptionStatus::Failed => {
                let error = message
                    .error_message
                    .clone()
                    .unwrap_or_else(|| UNSPECIFIED_WORKER_ERROR.to_string());
                self.lifecycle.fail(artifact, error).await
            }
        };

        let Some(outcome) = tolerate_stale(result, artifact)? else {
            return Ok(());
        };

        let workspace_id = match outcome {
            LifecycleOutcome::Applied { record, .. } => record.workspace_id,
            LifecycleOutcome::ArtifactMissing { record } => {
                warn!(task_id = %record.id, artifact = %artifact, "Result for deleted answer consumed");
                return Ok(());
            }
            other => {
                debug!(artifact = %artifact, outcome = ?other, "No notification for unapplied result");
                return Ok(());
            }
        };

        let activity = match message.status {
            TranscriptionStatus::Processing => InterrogationActivity::new(
                message.interrogation_id,
                qa_id,
                InterrogationNotificationStatus::Processing,
            ),
            TranscriptionStatus::Completed => InterrogationActivity::new(
                message.interrogation_id,
                qa_id,
                InterrogationNotificationStatus::Completed,
            )
            .with_text(text),
            TranscriptionStatus::Failed => InterrogationActivity::new(
                message.interrogation_id,
                qa_id,
                InterrogationNotificationStatus::Failed,
            )
            .with_error(message.error_message),
        };
        self.notifications
            .notify_interrogation(&workspace_id, activity)
            .await;

        Ok(())
    }
}

/// Settlement counts for one listener run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerReport {
    pub acked: usize,
    pub rejected: usize,
}

#[derive(Debug, Default)]
struct ListenerCounters {
    acked: AtomicUsize,
    rejected: AtomicUsize,
}

/// Drives a [`ResultHandler`] from a broker subscription
pub struct ResultListener<H: ResultHandler> {
    handler: Arc<H>,
    broker: Arc<BrokerProvider>,
    concurrency: usize,
    counters: ListenerCounters,
}

impl<H: ResultHandler> std::fmt::Debug for ResultListener<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultListener")
            .field("channel", &self.handler.channel())
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl<H: ResultHandler> ResultListener<H> {
    pub fn new(handler: Arc<H>, broker: Arc<BrokerProvider>, concurrency: usize) -> Self {
        Self {
            handler,
            broker,
            concurrency: concurrency.max(1),
            counters: ListenerCounters::default(),
        }
    }

    /// Consume until the subscription ends or `shutdown` flips to `true`
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<ListenerReport> {
        let channel = self.handler.channel();
        let deliveries = self.broker.subscribe(channel).await?;

        info!(
            channel = %channel,
            concurrency = self.concurrency,
            provider = self.broker.provider_name(),
            "Result listener started"
        );

        deliveries
            .take_until(shutdown_signal(shutdown))
            .for_each_concurrent(self.concurrency, |delivery| async move {
                match delivery {
                    Ok(delivery) => self.process(delivery).await,
                    Err(e) => log_error(self.handler.component(), "receive", &e.to_string(), None),
                }
            })
            .await;

        let report = self.report();
        info!(
            channel = %channel,
            acked = report.acked,
            rejected = report.rejected,
            "Result listener stopped"
        );
        Ok(report)
    }

    pub fn component(&self) -> &'static str {
        self.handler.component()
    }

    pub fn report(&self) -> ListenerReport {
        ListenerReport {
            acked: self.counters.acked.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
        }
    }

    async fn process(&self, delivery: InboundDelivery) {
        let message = match delivery.decode::<H::Message>() {
            Ok(message) => message,
            Err(e) => {
                log_error(
                    self.handler.component(),
                    "decode",
                    &e.to_string(),
                    Some(&delivery.payload_text()),
                );
                self.reject(delivery).await;
                return;
            }
        };

        match self.handler.handle(message).await {
            Ok(()) => self.ack(delivery).await,
            Err(e) => {
                log_error(self.handler.component(), "handle", &e.to_string(), None);
                self.reject(delivery).await;
            }
        }
    }

    async fn ack(&self, delivery: InboundDelivery) {
        match delivery.ack().await {
            Ok(()) => {
                self.counters.acked.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log_error(self.handler.component(), "ack", &e.to_string(), None),
        }
    }

    async fn reject(&self, delivery: InboundDelivery) {
        match delivery.reject().await {
            Ok(()) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => log_error(self.handler.component(), "reject", &e.to_string(), None),
        }
    }
}

/// Resolves once shutdown is requested or the sender is gone
async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FairqError;

    #[tokio::test]
    async fn test_shutdown_signal_resolves_on_flag() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(shutdown_signal(rx));
        tx.send(true).unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_signal_resolves_when_sender_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        shutdown_signal(rx).await;
    }

    #[test]
    fn test_tolerate_stale_classification() {
        let artifact = ArtifactRef::document(1);
        let not_found: Result<LifecycleOutcome> = Err(FairqError::Domain(
            crate::domain::DomainError::not_found("Artifact", artifact),
        ));
        assert!(tolerate_stale(not_found, artifact).unwrap().is_none());

        let fatal: Result<LifecycleOutcome> = Err(FairqError::Orchestration("db down".to_string()));
        assert!(tolerate_stale(fatal, artifact).is_err());
    }
}
