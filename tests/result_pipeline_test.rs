mod common;

use common::{document_result, transcription_result, Harness};
use fairq_core::domain::{InterrogationNotificationStatus, Notification};
use fairq_core::messaging::{DocumentResultStatus, ResultChannel, TranscriptionStatus};
use fairq_core::models::{ArtifactRef, ArtifactStatus, CaseFileStatus, QaStatus};
use fairq_core::orchestration::{DispatchOutcome, ListenerReport};
use fairq_core::{FairqConfig, TaskState};
use tokio_test::assert_ok;
use tracing_test::traced_test;

/// Results applied one at a time, in injection order
fn sequential() -> Harness {
    let mut config = FairqConfig::default();
    config.consumer.concurrency = 1;
    Harness::with_config(config)
}

async fn dispatch_all(h: &Harness) {
    while !matches!(h.tick().await.as_slice(), [DispatchOutcome::Idle]) {}
}

#[tokio::test]
async fn test_failure_diverges_by_artifact_kind() {
    let h = sequential();
    h.submit_document("a@example.com", "C-1", 1).await;
    h.submit_answer("a@example.com", "C-1", 2).await;
    dispatch_all(&h).await;

    assert_eq!(
        h.artifacts.status_of(ArtifactRef::audio(2)),
        Some(ArtifactStatus::Qa(QaStatus::Transcribing))
    );

    let mut failed_doc = document_result(1, "C-1", DocumentResultStatus::Failed);
    failed_doc.error_message = Some("unreadable pdf".to_string());
    h.inject_document_result(&failed_doc);

    let mut failed_audio = transcription_result(2, "C-1", TranscriptionStatus::Failed);
    failed_audio.error_message = Some("silence".to_string());
    h.inject_transcription_result(&failed_audio);

    let (documents, transcriptions) = h.drain_results().await;
    assert_eq!(documents, ListenerReport { acked: 1, rejected: 0 });
    assert_eq!(transcriptions, ListenerReport { acked: 1, rejected: 0 });

    // Document failure is terminal; audio failure rolls the answer back
    assert_eq!(
        h.artifacts.status_of(ArtifactRef::document(1)),
        Some(ArtifactStatus::File(CaseFileStatus::Failed))
    );
    assert_eq!(
        h.artifacts.status_of(ArtifactRef::audio(2)),
        Some(ArtifactStatus::Qa(QaStatus::Pending))
    );

    // Task records never return to PENDING, whatever the artifact does
    for artifact in [ArtifactRef::document(1), ArtifactRef::audio(2)] {
        let record = h.record_for(artifact);
        assert_eq!(record.status, TaskState::Failed);
        assert!(record.completed_at.is_some());
    }
    assert_eq!(
        h.record_for(ArtifactRef::document(1)).error_message.as_deref(),
        Some("unreadable pdf")
    );
    assert_eq!(h.tick().await, vec![DispatchOutcome::Idle]);
    assert_eq!(h.broker.published_all().len(), 2);
}

#[tokio::test]
async fn test_document_progress_and_completion() {
    let h = sequential();
    h.submit_document("a@example.com", "C-1", 1).await;
    h.access.grant("C-1", "b@example.com");
    dispatch_all(&h).await;
    h.sink.clear();

    h.inject_document_result(&document_result(1, "C-1", DocumentResultStatus::Pending));
    h.inject_document_result(&document_result(1, "C-1", DocumentResultStatus::Processing));
    let mut completed = document_result(1, "C-1", DocumentResultStatus::Completed);
    completed.result = Some("{\"summary\":\"ok\"}".to_string());
    h.inject_document_result(&completed);

    let (documents, _) = h.drain_results().await;
    assert_eq!(documents.acked, 3);

    let artifact = h.artifacts.get(ArtifactRef::document(1)).expect("artifact");
    assert_eq!(
        artifact.history,
        vec![
            ArtifactStatus::File(CaseFileStatus::Uploaded),
            ArtifactStatus::File(CaseFileStatus::Queued),
            ArtifactStatus::File(CaseFileStatus::Pending),
            ArtifactStatus::File(CaseFileStatus::Processing),
            ArtifactStatus::File(CaseFileStatus::Completed),
        ]
    );
    assert!(artifact.completed_at.is_some());

    let record = h.record_for(ArtifactRef::document(1));
    assert_eq!(record.status, TaskState::Completed);
    assert_eq!(record.result.as_deref(), Some("{\"summary\":\"ok\"}"));

    // Started and completed, each pushed to both workspace members
    let pushed = h.sink.sent_to("/queue/case/C-1/status");
    assert_eq!(pushed.len(), 4);
    let Notification::CaseProcessing(last) = &pushed[pushed.len() - 1].notification else {
        panic!("expected case processing notification");
    };
    assert_eq!(last.completed_files, 1);
    assert_eq!(last.latest_activity, "Processing completed: file-1.pdf");
}

#[tokio::test]
async fn test_transcription_completion_unwraps_envelope() {
    let h = sequential();
    h.submit_answer("a@example.com", "C-1", 2).await;
    dispatch_all(&h).await;
    h.sink.clear();

    let mut completed = transcription_result(2, "C-1", TranscriptionStatus::Completed);
    completed.transcribed_text = Some(r#"{"data":"I was at home"}"#.to_string());
    h.inject_transcription_result(&completed);

    let (_, transcriptions) = h.drain_results().await;
    assert_eq!(transcriptions.acked, 1);

    let answer = h.artifacts.get(ArtifactRef::audio(2)).expect("answer");
    assert_eq!(answer.snapshot.status, ArtifactStatus::Qa(QaStatus::Transcribed));
    assert_eq!(answer.answer_text.as_deref(), Some("I was at home"));

    let pushed = h.sink.sent_to("/queue/case/C-1/interrogation");
    assert_eq!(pushed.len(), 1);
    let Notification::Interrogation(update) = &pushed[0].notification else {
        panic!("expected interrogation notification");
    };
    assert_eq!(update.status, InterrogationNotificationStatus::Completed);
    assert_eq!(update.transcribed_text.as_deref(), Some("I was at home"));
}

#[tokio::test]
async fn test_completing_twice_keeps_first_result() {
    let h = sequential();
    h.submit_document("a@example.com", "C-1", 1).await;
    dispatch_all(&h).await;

    let mut first = document_result(1, "C-1", DocumentResultStatus::Completed);
    first.result = Some("first".to_string());
    h.inject_document_result(&first);
    let (documents, _) = h.drain_results().await;
    assert_eq!(documents.acked, 1);
    let after_first = h.record_for(ArtifactRef::document(1));

    let lifecycle = h.system.lifecycle();
    let outcome = assert_ok!(
        lifecycle
            .complete(ArtifactRef::document(1), Some("second".to_string()))
            .await
    );
    assert!(!outcome.is_applied());

    let after_second = h.record_for(ArtifactRef::document(1));
    assert_eq!(after_second.status, TaskState::Completed);
    assert_eq!(after_second.result.as_deref(), Some("first"));
    assert_eq!(after_second.completed_at, after_first.completed_at);
}

#[tokio::test]
async fn test_late_failure_after_completion_is_absorbed() {
    let h = sequential();
    h.submit_document("a@example.com", "C-1", 1).await;
    dispatch_all(&h).await;

    h.inject_document_result(&document_result(1, "C-1", DocumentResultStatus::Completed));
    h.inject_document_result(&document_result(1, "C-1", DocumentResultStatus::Failed));

    let (documents, _) = h.drain_results().await;
    assert_eq!(documents, ListenerReport { acked: 2, rejected: 0 });
    assert_eq!(
        h.record_for(ArtifactRef::document(1)).status,
        TaskState::Completed
    );
    assert_eq!(
        h.artifacts.status_of(ArtifactRef::document(1)),
        Some(ArtifactStatus::File(CaseFileStatus::Completed))
    );
}

#[tokio::test]
#[traced_test]
async fn test_result_for_deleted_artifact_is_acked() {
    let h = sequential();
    h.submit_document("a@example.com", "C-1", 1).await;
    dispatch_all(&h).await;
    assert!(h.artifacts.remove(ArtifactRef::document(1)));

    h.inject_document_result(&document_result(1, "C-1", DocumentResultStatus::Completed));

    let (documents, _) = h.drain_results().await;
    assert_eq!(documents, ListenerReport { acked: 1, rejected: 0 });
    assert!(h.broker.dead_lettered(ResultChannel::DocumentResults).is_empty());
    assert_eq!(
        h.record_for(ArtifactRef::document(1)).status,
        TaskState::Completed
    );
    assert!(logs_contain("WARN"));
    assert!(logs_contain("Artifact deleted upstream"));
    assert!(logs_contain("Result for deleted case file consumed"));
}

#[tokio::test]
async fn test_redelivered_completion_repairs_artifact() {
    let h = sequential();
    h.submit_document("a@example.com", "C-1", 1).await;
    dispatch_all(&h).await;
    h.sink.clear();
    let completed_status = ArtifactStatus::File(CaseFileStatus::Completed);
    h.artifacts.fail_updates_to(completed_status, "connection reset");

    let mut completed = document_result(1, "C-1", DocumentResultStatus::Completed);
    completed.result = Some("summary".to_string());
    h.inject_document_result(&completed);

    let (documents, _) = h.drain_results().await;
    assert_eq!(documents, ListenerReport { acked: 0, rejected: 1 });
    assert_eq!(h.broker.dead_lettered(ResultChannel::DocumentResults).len(), 1);
    assert_eq!(
        h.record_for(ArtifactRef::document(1)).status,
        TaskState::Completed
    );
    assert_eq!(
        h.artifacts.status_of(ArtifactRef::document(1)),
        Some(ArtifactStatus::File(CaseFileStatus::Pending))
    );

    // Replayed from the dead-letter queue once the repository recovers
    h.artifacts.restore_updates();
    let outcome = assert_ok!(
        h.system
            .lifecycle()
            .complete(ArtifactRef::document(1), Some("summary".to_string()))
            .await
    );
    assert!(outcome.is_applied());
    assert_eq!(
        h.artifacts.status_of(ArtifactRef::document(1)),
        Some(completed_status)
    );
    assert_eq!(
        h.record_for(ArtifactRef::document(1)).result.as_deref(),
        Some("summary")
    );
}

#[tokio::test]
async fn test_result_without_task_record_is_acked() {
    let h = sequential();
    h.inject_document_result(&document_result(999, "C-9", DocumentResultStatus::Completed));
    let mut orphan = transcription_result(0, "C-9", TranscriptionStatus::Completed);
    orphan.qa_id = None;
    h.inject_transcription_result(&orphan);

    let (documents, transcriptions) = h.drain_results().await;
    assert_eq!(documents.acked, 1);
    assert_eq!(transcriptions.acked, 1);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_malformed_payload_is_dead_lettered() {
    let h = sequential();
    h.broker
        .inject_raw(ResultChannel::DocumentResults, b"{not json".to_vec())
        .unwrap();
    h.broker
        .inject_raw(ResultChannel::AudioResults, br#"{"status":"DONE"}"#.to_vec())
        .unwrap();

    let (documents, transcriptions) = h.drain_results().await;
    assert_eq!(documents, ListenerReport { acked: 0, rejected: 1 });
    assert_eq!(transcriptions, ListenerReport { acked: 0, rejected: 1 });
    assert_eq!(
        h.broker.dead_lettered(ResultChannel::DocumentResults),
        vec![b"{not json".to_vec()]
    );
    assert_eq!(h.broker.settled_count(), 2);
}
