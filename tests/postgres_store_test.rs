//! PostgreSQL task store tests. Skipped unless `TEST_DATABASE_URL` is set.

use chrono::{Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use fairq_core::models::{ArtifactRef, NewTaskRecord};
use fairq_core::store::{MarkOutcome, PgTaskStore, StoreError, TaskStore};
use fairq_core::TaskState;

async fn store() -> Option<PgTaskStore> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    let store = PgTaskStore::new(pool);
    store.migrate().await.expect("migrate");
    Some(store)
}

/// Ids unique across runs so the active-artifact index never collides
fn unique_id() -> i64 {
    (Uuid::new_v4().as_u64_pair().0 & i64::MAX as u64) as i64
}

fn tenant() -> String {
    format!("{}@example.com", Uuid::new_v4())
}

#[tokio::test]
async fn test_pending_records_are_fifo_per_tenant() {
    let Some(store) = store().await else { return };
    let tenant = tenant();

    let first = store
        .enqueue(NewTaskRecord::document(&tenant, 1, "C-1", unique_id(), "a.pdf", "s3://a"))
        .await
        .unwrap();
    let second = store
        .enqueue(NewTaskRecord::document(&tenant, 1, "C-1", unique_id(), "b.pdf", "s3://b"))
        .await
        .unwrap();

    let pending = store.pending_for_tenant(&tenant).await.unwrap();
    let ids: Vec<_> = pending.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![first, second]);

    let next = store.next_pending_for_tenant(&tenant).await.unwrap().unwrap();
    assert_eq!(next.id, first);
    assert!(store
        .distinct_tenants_with_status(TaskState::Pending)
        .await
        .unwrap()
        .contains(&tenant));
}

#[tokio::test]
async fn test_compare_and_set_transitions() {
    let Some(store) = store().await else { return };
    let submission = NewTaskRecord::document(tenant(), 1, "C-1", unique_id(), "a.pdf", "s3://a");
    let artifact = submission.artifact;
    let id = store.enqueue(submission.clone()).await.unwrap();

    let duplicate = store.enqueue(submission).await.unwrap_err();
    assert!(matches!(duplicate, StoreError::DuplicateActiveTask { .. }));

    assert!(store.mark_dispatching(id, Utc::now()).await.unwrap().is_applied());
    assert_eq!(
        store.mark_dispatching(id, Utc::now()).await.unwrap(),
        MarkOutcome::Conflict {
            current: TaskState::Dispatching
        }
    );

    let MarkOutcome::Applied(done) = store
        .mark_completed(id, Some("ok".to_string()), Utc::now())
        .await
        .unwrap()
    else {
        panic!("expected completion to apply");
    };
    assert_eq!(done.result.as_deref(), Some("ok"));

    assert_eq!(
        store.mark_failed(id, "late", Utc::now()).await.unwrap(),
        MarkOutcome::Conflict {
            current: TaskState::Completed
        }
    );
    let latest = store.find_latest_for_artifact(artifact).await.unwrap().unwrap();
    assert_eq!(latest.status, TaskState::Completed);
    assert_eq!(latest.completed_at, done.completed_at);
}

#[tokio::test]
async fn test_stale_dispatch_and_purge() {
    let Some(store) = store().await else { return };
    let long_ago = Utc::now() - Duration::days(60);
    let id = store
        .enqueue(NewTaskRecord::audio(tenant(), 5, "C-1", unique_id(), "q.webm", "s3://q", "ru"))
        .await
        .unwrap();

    store.mark_dispatching(id, long_ago).await.unwrap();
    let stale = store
        .stale_dispatching(Utc::now() - Duration::minutes(30))
        .await
        .unwrap();
    assert!(stale.iter().any(|r| r.id == id));

    store.mark_failed(id, "timeout", long_ago).await.unwrap();
    assert!(store.purge_terminal_before(Utc::now() - Duration::days(30)).await.unwrap() >= 1);
    assert!(store.find(id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_by_artifact() {
    let Some(store) = store().await else { return };
    let artifact = ArtifactRef::document(unique_id());
    store
        .enqueue(NewTaskRecord::document(tenant(), 1, "C-1", artifact.id, "a.pdf", "s3://a"))
        .await
        .unwrap();

    assert_eq!(store.delete_by_artifact(artifact).await.unwrap(), 1);
    assert!(store.find_latest_for_artifact(artifact).await.unwrap().is_none());
}
