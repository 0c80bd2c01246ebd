//! # PostgreSQL Task Store
//!
//! [`TaskStore`] over the `task_queue` table. Status changes are conditional
//! `UPDATE ... WHERE id = $1 AND status = $2 RETURNING ...` statements; the
//! one-active-record-per-artifact rule is a partial unique index, so a racing
//! duplicate submission surfaces as a unique violation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use super::{MarkOutcome, StoreError, StoreResult, TaskStore};
use crate::models::{ArtifactRef, NewTaskRecord, TaskId, TaskRecord};
use crate::state_machine::TaskState;

const TASK_COLUMNS: &str = "id, seq, tenant_id, workspace_id, parent_id, artifact_kind, \
     artifact_id, artifact_name, artifact_location, locale, status, priority, created_at, \
     dispatched_at, completed_at, error_message, result";

/// Raw `task_queue` row
#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    seq: i64,
    tenant_id: String,
    workspace_id: String,
    parent_id: i64,
    artifact_kind: String,
    artifact_id: i64,
    artifact_name: String,
    artifact_location: String,
    locale: Option<String>,
    status: String,
    priority: i32,
    created_at: DateTime<Utc>,
    dispatched_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    result: Option<String>,
}

impl TryFrom<TaskRow> for TaskRecord {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let kind = row
            .artifact_kind
            .parse()
            .map_err(|e: String| StoreError::corrupt_record("artifact_kind", e))?;
        let status = row
            .status
            .parse()
            .map_err(|e: String| StoreError::corrupt_record("status", e))?;

        Ok(TaskRecord {
            id: row.id,
            sequence: row.seq,
            tenant_id: row.tenant_id,
            workspace_id: row.workspace_id,
            parent_id: row.parent_id,
            artifact: ArtifactRef {
                kind,
                id: row.artifact_id,
            },
            artifact_name: row.artifact_name,
            artifact_location: row.artifact_location,
            locale: row.locale,
            status,
            priority: row.priority,
            created_at: row.created_at,
            dispatched_at: row.dispatched_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            result: row.result,
        })
    }
}

fn query_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        error!(operation = operation, error = %e, "Task store query failed");
        match StoreError::from(e) {
            StoreError::DatabaseQuery { message, .. } => StoreError::database_query(operation, message),
            other => other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgTaskStore {
    pool: PgPool,
}

impl PgTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the embedded `migrations/` directory
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::database_query("migrate", e.to_string()))
    }

    async fn fetch_status(&self, id: TaskId) -> StoreResult<Option<TaskState>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT status FROM task_queue WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("fetch_status"))?;

        row.map(|(status,)| {
            status
                .parse()
                .map_err(|e: String| StoreError::corrupt_record("status", e))
        })
        .transpose()
    }

    /// Run a conditional update and classify a zero-row result
    async fn compare_and_set(
        &self,
        id: TaskId,
        query: sqlx::query::QueryAs<'_, sqlx::Postgres, TaskRow, sqlx::postgres::PgArguments>,
        operation: &'static str,
    ) -> StoreResult<MarkOutcome> {
        let updated = query
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error(operation))?;

        match updated {
            Some(row) => Ok(MarkOutcome::Applied(row.try_into()?)),
            None => match self.fetch_status(id).await? {
                Some(current) => {
                    debug!(task_id = %id, current = %current, operation, "Compare-and-set conflict");
                    Ok(MarkOutcome::Conflict { current })
                }
                None => Err(StoreError::NotFound { id }),
            },
        }
    }

    async fn fetch_records(
        &self,
        sql: &str,
        tenant_id: &str,
        operation: &'static str,
    ) -> StoreResult<Vec<TaskRecord>> {
        let rows = sqlx::query_as::<_, TaskRow>(sql)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error(operation))?;

        rows.into_iter().map(TaskRecord::try_from).collect()
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    #[instrument(skip(self, submission), fields(artifact = %submission.artifact))]
    async fn enqueue(&self, submission: NewTaskRecord) -> StoreResult<TaskId> {
        let id = Uuid::new_v4();
        let artifact = submission.artifact;

        let result = sqlx::query(
            r#"
            INSERT INTO task_queue (
                id, tenant_id, workspace_id, parent_id, artifact_kind, artifact_id,
                artifact_name, artifact_location, locale, status, priority, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending', $10, NOW())
            "#,
        )
        .bind(id)
        .bind(&submission.tenant_id)
        .bind(&submission.workspace_id)
        .bind(submission.parent_id)
        .bind(artifact.kind.to_string())
        .bind(artifact.id)
        .bind(&submission.artifact_name)
        .bind(&submission.artifact_location)
        .bind(&submission.locale)
        .bind(submission.priority)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(StoreError::DuplicateActiveTask { artifact })
            }
            Err(e) => Err(query_error("enqueue")(e)),
        }
    }

    async fn find(&self, id: TaskId) -> StoreResult<Option<TaskRecord>> {
        let sql = format!("SELECT {TASK_COLUMNS} FROM task_queue WHERE id = $1");
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("find"))?;

        row.map(TaskRecord::try_from).transpose()
    }

    async fn find_latest_for_artifact(
        &self,
        artifact: ArtifactRef,
    ) -> StoreResult<Option<TaskRecord>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task_queue \
             WHERE artifact_kind = $1 AND artifact_id = $2 \
             ORDER BY created_at DESC, seq DESC LIMIT 1"
        );
        let row = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(artifact.kind.to_string())
            .bind(artifact.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_error("find_latest_for_artifact"))?;

        row.map(TaskRecord::try_from).transpose()
    }

    async fn next_pending_for_tenant(&self, tenant_id: &str) -> StoreResult<Option<TaskRecord>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task_queue \
             WHERE tenant_id = $1 AND status = 'pending' \
             ORDER BY created_at ASC, seq ASC LIMIT 1"
        );
        let records = self
            .fetch_records(&sql, tenant_id, "next_pending_for_tenant")
            .await?;
        Ok(records.into_iter().next())
    }

    async fn pending_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task_queue \
             WHERE tenant_id = $1 AND status = 'pending' \
             ORDER BY created_at ASC, seq ASC"
        );
        self.fetch_records(&sql, tenant_id, "pending_for_tenant")
            .await
    }

    async fn distinct_tenants_with_status(&self, status: TaskState) -> StoreResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT tenant_id FROM task_queue WHERE status = $1 ORDER BY tenant_id",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(query_error("distinct_tenants_with_status"))?;

        Ok(rows.into_iter().map(|(tenant,)| tenant).collect())
    }

    #[instrument(skip(self))]
    async fn mark_dispatching(&self, id: TaskId, at: DateTime<Utc>) -> StoreResult<MarkOutcome> {
        let sql = format!(
            "UPDATE task_queue SET status = 'dispatching', dispatched_at = $2 \
             WHERE id = $1 AND status = 'pending' RETURNING {TASK_COLUMNS}"
        );
        let query = sqlx::query_as::<_, TaskRow>(&sql).bind(id).bind(at);
        self.compare_and_set(id, query, "mark_dispatching").await
    }

    #[instrument(skip(self, result))]
    async fn mark_completed(
        &self,
        id: TaskId,
        result: Option<String>,
        at: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome> {
        let sql = format!(
            "UPDATE task_queue SET status = 'completed', completed_at = $2, result = $3 \
             WHERE id = $1 AND status = 'dispatching' RETURNING {TASK_COLUMNS}"
        );
        let query = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .bind(at)
            .bind(result);
        self.compare_and_set(id, query, "mark_completed").await
    }

    #[instrument(skip(self))]
    async fn mark_failed(
        &self,
        id: TaskId,
        error: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<MarkOutcome> {
        let sql = format!(
            "UPDATE task_queue SET status = 'failed', completed_at = $2, error_message = $3 \
             WHERE id = $1 AND status = 'dispatching' RETURNING {TASK_COLUMNS}"
        );
        let query = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(id)
            .bind(at)
            .bind(error.to_string());
        self.compare_and_set(id, query, "mark_failed").await
    }

    async fn delete_by_artifact(&self, artifact: ArtifactRef) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM task_queue WHERE artifact_kind = $1 AND artifact_id = $2")
                .bind(artifact.kind.to_string())
                .bind(artifact.id)
                .execute(&self.pool)
                .await
                .map_err(query_error("delete_by_artifact"))?;

        Ok(result.rows_affected())
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            "DELETE FROM task_queue \
             WHERE status IN ('completed', 'failed') AND completed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(query_error("purge_terminal_before"))?;

        Ok(result.rows_affected())
    }

    async fn stale_dispatching(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<TaskRecord>> {
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM task_queue \
             WHERE status = 'dispatching' AND dispatched_at < $1 \
             ORDER BY dispatched_at ASC, seq ASC"
        );
        let rows = sqlx::query_as::<_, TaskRow>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error("stale_dispatching"))?;

        rows.into_iter().map(TaskRecord::try_from).collect()
    }

    async fn count_by_status(&self, status: TaskState) -> StoreResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM task_queue WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(query_error("count_by_status"))?;

        Ok(count)
    }
}
