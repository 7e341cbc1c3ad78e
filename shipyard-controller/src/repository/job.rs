//! Job Repository
//!
//! Postgres-backed job record store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shipyard_core::domain::job::{Job, JobKind, JobStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::{JobPatch, JobStore, Precondition, Result, StoreError, UpdateOutcome};

const JOB_COLUMNS: &str = "id, kind, subject_id, status, error, started_at, completed_at, \
     kubernetes_job_name, kubernetes_job_status, attempts, created_at, updated_at, version";

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, kind, subject_id, status, error, started_at, completed_at,
                              kubernetes_job_name, kubernetes_job_status, attempts,
                              created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(job.id)
        .bind(job.kind.as_str())
        .bind(job.subject_id)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.kubernetes_job_name)
        .bind(&job.kubernetes_job_status)
        .bind(job.attempts)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.version)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate(job.id),
            other => StoreError::Database(other),
        })?;

        Ok(())
    }

    async fn find_by_id(&self, kind: JobKind, id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND kind = $2"
        ))
        .bind(id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_by_status(&self, kind: JobKind, status: JobStatus) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE kind = $1 AND status = $2 \
             ORDER BY created_at ASC"
        ))
        .bind(kind.as_str())
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn find_by_subject(&self, kind: JobKind, subject_id: Uuid) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE kind = $1 AND subject_id = $2 \
             ORDER BY created_at DESC"
        ))
        .bind(kind.as_str())
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn update(
        &self,
        kind: JobKind,
        id: Uuid,
        patch: &JobPatch,
        precondition: &Precondition,
    ) -> Result<UpdateOutcome> {
        let allowed: Option<Vec<String>> = precondition
            .status_in
            .as_ref()
            .map(|statuses| statuses.iter().map(|s| s.as_str().to_string()).collect());

        // Precondition and write happen in one statement, so a concurrent
        // writer either sees the old row or the new one
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = COALESCE($1, status),
                started_at = COALESCE($2, started_at),
                completed_at = CASE WHEN $3 THEN $4 ELSE completed_at END,
                error = CASE WHEN $5 THEN $6 ELSE error END,
                kubernetes_job_name = COALESCE($7, kubernetes_job_name),
                kubernetes_job_status = COALESCE($8, kubernetes_job_status),
                attempts = attempts + $9,
                updated_at = $10,
                version = version + 1
            WHERE id = $11 AND kind = $12
              AND ($13::TEXT[] IS NULL OR status = ANY($13))
              AND (NOT $14 OR kubernetes_job_name IS NULL)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.started_at)
        .bind(patch.completed_at.is_some())
        .bind(patch.completed_at.flatten())
        .bind(patch.error.is_some())
        .bind(patch.error.clone().flatten())
        .bind(&patch.kubernetes_job_name)
        .bind(&patch.kubernetes_job_status)
        .bind(if patch.increment_attempts { 1i32 } else { 0i32 })
        .bind(patch.updated_at)
        .bind(id)
        .bind(kind.as_str())
        .bind(allowed)
        .bind(precondition.handle_unassigned)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(UpdateOutcome::Updated(row.try_into()?)),
            None => match self.find_by_id(kind, id).await? {
                Some(current) => Ok(UpdateOutcome::Rejected(current)),
                None => Ok(UpdateOutcome::NotFound),
            },
        }
    }

    async fn cancel_active(
        &self,
        kind: JobKind,
        subject_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = $1, completed_at = $2, error = NULL, updated_at = $2,
                version = version + 1
            WHERE kind = $3 AND subject_id = $4 AND status = ANY($5)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(JobStatus::Cancelled.as_str())
        .bind(at)
        .bind(kind.as_str())
        .bind(subject_id)
        .bind(
            JobStatus::ACTIVE
                .iter()
                .map(|s| s.as_str().to_string())
                .collect::<Vec<_>>(),
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    kind: String,
    subject_id: Uuid,
    status: String,
    error: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    kubernetes_job_name: Option<String>,
    kubernetes_job_status: Option<String>,
    attempts: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> std::result::Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = move |reason: String| StoreError::Corrupt { id, reason };

        let kind = row.kind.parse::<JobKind>().map_err(|e| corrupt(e.to_string()))?;
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(Job {
            id,
            kind,
            subject_id: row.subject_id,
            status,
            error: row.error,
            started_at: row.started_at,
            completed_at: row.completed_at,
            kubernetes_job_name: row.kubernetes_job_name,
            kubernetes_job_status: row.kubernetes_job_status,
            attempts: row.attempts,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}
