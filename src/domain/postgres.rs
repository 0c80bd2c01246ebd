//! PostgreSQL-backed collaborators.
//!
//! Reads and updates only the columns the scheduler touches:
//!
//! - `cases (id, number, title, owner_id)`
//! - `case_users (case_id, user_id)` and `users (id, email)`
//! - `case_files (id, case_id, original_file_name, status, uploaded_at, completed_at, error_message)`
//! - `case_interrogations (id, case_id)`
//! - `case_interrogation_qa (id, interrogation_id, question, answer, status)`

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{FromRow, PgPool};

use super::{
    AccessRegistry, ArtifactRepository, ArtifactSnapshot, ArtifactUpdate, DomainError,
    DomainResult, FileStatusInfo,
};
use crate::models::{ArtifactKind, ArtifactRef, ArtifactStatus, CaseFileStatus, QaStatus};

#[derive(Debug, FromRow)]
struct ArtifactRow {
    id: i64,
    workspace_id: String,
    name: String,
    status: String,
}

#[derive(Debug, FromRow)]
struct CaseFileRow {
    id: i64,
    original_file_name: String,
    status: String,
    uploaded_at: Option<NaiveDateTime>,
    completed_at: Option<NaiveDateTime>,
    error_message: Option<String>,
}

fn parse_status(kind: ArtifactKind, raw: &str) -> DomainResult<ArtifactStatus> {
    let status = match kind {
        ArtifactKind::Document => raw.parse::<CaseFileStatus>().map(ArtifactStatus::File),
        ArtifactKind::Audio => raw.parse::<QaStatus>().map(ArtifactStatus::Qa),
    };
    status.map_err(|e| DomainError::repository("parse_status", e))
}

#[derive(Debug, Clone)]
pub struct PgArtifactRepository {
    pool: PgPool,
}

impl PgArtifactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArtifactRepository for PgArtifactRepository {
    async fn find_artifact(&self, artifact: ArtifactRef) -> DomainResult<Option<ArtifactSnapshot>> {
        let sql = match artifact.kind {
            ArtifactKind::Document => {
                "SELECT f.id, c.number AS workspace_id, f.original_file_name AS name, f.status \
                 FROM case_files f JOIN cases c ON c.id = f.case_id WHERE f.id = $1"
            }
            ArtifactKind::Audio => {
                "SELECT qa.id, c.number AS workspace_id, COALESCE(qa.question, '') AS name, qa.status \
                 FROM case_interrogation_qa qa \
                 JOIN case_interrogations i ON i.id = qa.interrogation_id \
                 JOIN cases c ON c.id = i.case_id WHERE qa.id = $1"
            }
        };

        let row = sqlx::query_as::<_, ArtifactRow>(sql)
            .bind(artifact.id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| {
            Ok(ArtifactSnapshot {
                artifact: ArtifactRef {
                    kind: artifact.kind,
                    id: row.id,
                },
                workspace_id: row.workspace_id,
                name: row.name,
                status: parse_status(artifact.kind, &row.status)?,
            })
        })
        .transpose()
    }

    async fn update_status(&self, artifact: ArtifactRef, update: ArtifactUpdate) -> DomainResult<()> {
        let result = match update.status {
            ArtifactStatus::File(status) => {
                sqlx::query(
                    "UPDATE case_files SET status = $2, \
                     completed_at = COALESCE($3, completed_at), \
                     error_message = COALESCE($4, error_message) \
                     WHERE id = $1",
                )
                .bind(artifact.id)
                .bind(status.as_str())
                .bind(update.completed_at)
                .bind(update.error_message)
                .execute(&self.pool)
                .await?
            }
            ArtifactStatus::Qa(status) => {
                sqlx::query(
                    "UPDATE case_interrogation_qa SET status = $2, \
                     answer = COALESCE($3, answer) WHERE id = $1",
                )
                .bind(artifact.id)
                .bind(status.as_str())
                .bind(update.answer_text)
                .execute(&self.pool)
                .await?
            }
        };

        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("Artifact", artifact));
        }
        Ok(())
    }

    async fn workspace_files(&self, workspace_id: &str) -> DomainResult<Vec<FileStatusInfo>> {
        let rows = sqlx::query_as::<_, CaseFileRow>(
            "SELECT f.id, f.original_file_name, f.status, f.uploaded_at, f.completed_at, \
             f.error_message \
             FROM case_files f JOIN cases c ON c.id = f.case_id \
             WHERE c.number = $1 ORDER BY f.id",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let status = row
                    .status
                    .parse::<CaseFileStatus>()
                    .map_err(|e| DomainError::repository("workspace_files", e))?;
                Ok(FileStatusInfo {
                    file_id: row.id,
                    file_name: row.original_file_name,
                    status,
                    uploaded_at: row.uploaded_at,
                    completed_at: row.completed_at,
                    error_message: row.error_message,
                })
            })
            .collect()
    }

    async fn workspace_title(&self, workspace_id: &str) -> DomainResult<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT title FROM cases WHERE number = $1")
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(title,)| title))
    }
}

#[derive(Debug, Clone)]
pub struct PgAccessRegistry {
    pool: PgPool,
}

impl PgAccessRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessRegistry for PgAccessRegistry {
    async fn accessible_tenants(&self, workspace_id: &str) -> DomainResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT u.email FROM cases c JOIN users u ON u.id = c.owner_id
            WHERE c.number = $1
            UNION
            SELECT u.email FROM cases c
            JOIN case_users cu ON cu.case_id = c.id
            JOIN users u ON u.id = cu.user_id
            WHERE c.number = $1
            ORDER BY 1
            "#,
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(email,)| email).collect())
    }
}
