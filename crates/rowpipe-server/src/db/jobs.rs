//! `ingestion_jobs` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::ingest::store::{JobStore, StoreError, StoreResult};
use crate::ingest::types::{Job, JobPatch, JobStatus};

const JOB_COLUMNS: &str = "id, file_id, blob_ref, status, attempts, processed_count, \
                           failed_lines, error, created_at, started_at, finished_at";

#[derive(Debug, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    file_id: Uuid,
    blob_ref: String,
    status: String,
    attempts: i32,
    processed_count: i64,
    failed_lines: i64,
    error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Job {
            id: row.id,
            file_id: row.file_id,
            blob_ref: row.blob_ref,
            status,
            attempts: row.attempts,
            processed_count: row.processed_count,
            failed_lines: row.failed_lines,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
            error: row.error,
        })
    }
}

#[derive(Clone)]
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
    async fn create(&self, job: &Job) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ingestion_jobs
                (id, file_id, blob_ref, status, attempts, processed_count, failed_lines,
                 error, created_at, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id)
        .bind(job.file_id)
        .bind(&job.blob_ref)
        .bind(job.status.as_str())
        .bind(job.attempts)
        .bind(job.processed_count)
        .bind(job.failed_lines)
        .bind(&job.error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_by_status(
        &self,
        statuses: &[JobStatus],
        limit: Option<i64>,
    ) -> StoreResult<Vec<Job>> {
        let statuses: Vec<String> = statuses.iter().map(|s| s.as_str().to_string()).collect();

        // LIMIT NULL is no limit
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM ingestion_jobs WHERE status = ANY($1) \
             ORDER BY created_at ASC, id ASC LIMIT $2",
            JOB_COLUMNS
        ))
        .bind(statuses)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn update(&self, id: Uuid, patch: &JobPatch) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE ingestion_jobs SET
                status = COALESCE($2, status),
                started_at = COALESCE($3, started_at),
                finished_at = COALESCE($4, finished_at),
                error = COALESCE($5, error),
                attempts = attempts + $6,
                processed_count = processed_count + $7,
                failed_lines = failed_lines + $8,
                updated_at = NOW()
            WHERE id = $1 AND ($9::text IS NULL OR status = $9)
            RETURNING {}
            "#,
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(patch.status.map(|s| s.as_str()))
        .bind(patch.started_at)
        .bind(patch.finished_at)
        .bind(patch.error.as_deref())
        .bind(patch.attempts_delta)
        .bind(patch.processed_delta)
        .bind(patch.failed_delta)
        .bind(patch.expected_status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }
}
