#![allow(dead_code)]

pub mod strategies;

use std::sync::Arc;
use tokio::sync::watch;

use fairq_core::config::FairqConfig;
use fairq_core::domain::{
    InMemoryAccessRegistry, InMemoryArtifactRepository, RecordingNotificationSink,
};
use fairq_core::messaging::{
    BrokerProvider, InMemoryBroker, ProcessingResultMessage, ResultChannel,
    TranscriptionResultMessage,
};
use fairq_core::models::{ArtifactRef, NewTaskRecord, TaskId};
use fairq_core::orchestration::{DispatchOutcome, ListenerReport, ProcessingSystem};
use fairq_core::store::InMemoryTaskStore;

/// Full processing system over in-memory backends
pub struct Harness {
    pub store: Arc<InMemoryTaskStore>,
    pub artifacts: Arc<InMemoryArtifactRepository>,
    pub access: Arc<InMemoryAccessRegistry>,
    pub sink: Arc<RecordingNotificationSink>,
    pub broker: InMemoryBroker,
    pub system: ProcessingSystem,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(FairqConfig::default())
    }

    pub fn with_config(config: FairqConfig) -> Self {
        let store = Arc::new(InMemoryTaskStore::new());
        let artifacts = Arc::new(InMemoryArtifactRepository::new());
        let access = Arc::new(InMemoryAccessRegistry::new());
        let sink = Arc::new(RecordingNotificationSink::new());
        let broker = InMemoryBroker::new();

        let system = ProcessingSystem::assemble(
            config,
            store.clone(),
            artifacts.clone(),
            access.clone(),
            sink.clone(),
            Arc::new(BrokerProvider::InMemory(broker.clone())),
        );

        Self {
            store,
            artifacts,
            access,
            sink,
            broker,
            system,
        }
    }

    /// Register a case file and queue it for `tenant`
    pub async fn submit_document(&self, tenant: &str, case_number: &str, file_id: i64) -> TaskId {
        let name = format!("file-{file_id}.pdf");
        self.artifacts.add_document(case_number, file_id, &name);
        self.access.grant(case_number, tenant);
        self.system
            .enqueuer()
            .submit(NewTaskRecord::document(
                tenant,
                1,
                case_number,
                file_id,
                &name,
                format!("s3://bucket/{name}"),
            ))
            .await
            .expect("submit document")
    }

    /// Register an interrogation answer and queue it for `tenant`
    pub async fn submit_answer(&self, tenant: &str, case_number: &str, qa_id: i64) -> TaskId {
        let name = format!("answer-{qa_id}.webm");
        self.artifacts.add_answer(case_number, qa_id, &name);
        self.access.grant(case_number, tenant);
        self.system
            .enqueuer()
            .submit(NewTaskRecord::audio(
                tenant,
                7,
                case_number,
                qa_id,
                &name,
                format!("s3://bucket/{name}"),
                "ru",
            ))
            .await
            .expect("submit answer")
    }

    pub async fn tick(&self) -> Vec<DispatchOutcome> {
        self.system.scheduler().tick().await.expect("tick")
    }

    /// Tenant of every published work message, in publish order
    pub fn dispatch_order(&self) -> Vec<String> {
        self.broker
            .published_all()
            .into_iter()
            .map(|message| match message {
                fairq_core::messaging::WorkMessage::Document(m) => m.user_email,
                fairq_core::messaging::WorkMessage::Audio(m) => m.email,
            })
            .collect()
    }

    pub fn inject_document_result(&self, message: &ProcessingResultMessage) {
        self.broker
            .inject_result(ResultChannel::DocumentResults, message)
            .expect("inject document result");
    }

    pub fn inject_transcription_result(&self, message: &TranscriptionResultMessage) {
        self.broker
            .inject_result(ResultChannel::AudioResults, message)
            .expect("inject transcription result");
    }

    /// Close the result queues and consume everything injected so far
    pub async fn drain_results(&self) -> (ListenerReport, ListenerReport) {
        self.broker.close_results();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let documents = self
            .system
            .document_listener()
            .run(shutdown_rx.clone())
            .await
            .expect("document listener");
        let transcriptions = self
            .system
            .transcription_listener()
            .run(shutdown_rx)
            .await
            .expect("transcription listener");

        (documents, transcriptions)
    }

    pub fn record_for(&self, artifact: ArtifactRef) -> fairq_core::TaskRecord {
        self.store
            .all_records()
            .into_iter()
            .filter(|record| record.artifact == artifact)
            .max_by_key(|record| record.sequence)
            .expect("record for artifact")
    }
}

pub fn document_result(
    file_id: i64,
    case_number: &str,
    status: fairq_core::messaging::DocumentResultStatus,
) -> ProcessingResultMessage {
    ProcessingResultMessage {
        case_file_id: file_id,
        case_number: case_number.to_string(),
        file_name: Some(format!("file-{file_id}.pdf")),
        user_email: None,
        status,
        result: None,
        error_message: None,
        timestamp: None,
        processing_duration_seconds: Some(3),
    }
}

pub fn transcription_result(
    qa_id: i64,
    case_number: &str,
    status: fairq_core::messaging::TranscriptionStatus,
) -> TranscriptionResultMessage {
    TranscriptionResultMessage {
        interrogation_id: 7,
        qa_id: Some(qa_id),
        case_number: case_number.to_string(),
        status,
        transcribed_text: None,
        error_message: None,
        email: None,
        timestamp: None,
    }
}
