use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use sqlx::{PgPool, Pool, Postgres};
use uuid::Uuid;

use opal_core::error::AppError;
use opal_core::job::{AnalysisJob, CreateJobRequest, JobStatus, JobType};
use opal_core::job_store::JobStore;
use opal_core::models::{FileRef, FileStatus, NewAnalysisResult};

/// PostgreSQL-backed job store using `SELECT FOR UPDATE SKIP LOCKED`.
///
/// Finalize operations run in a transaction and are guarded by
/// `status = 'running'`, so a duplicate finalize for the same attempt is a
/// no-op: no second result row, no double attempt increment.
#[derive(Clone)]
pub struct PgJobStore {
    pool: Pool<Postgres>,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row types for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct AnalysisJobRow {
    id: Uuid,
    file_id: Uuid,
    job_type: String,
    status: String,
    attempt_count: i32,
    max_attempts: i32,
    provider_preference: Option<String>,
    locked_by: Option<String>,
    locked_at: Option<DateTime<Utc>>,
    not_before: Option<DateTime<Utc>>,
    last_error: Option<String>,
    result_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<AnalysisJobRow> for AnalysisJob {
    fn from(row: AnalysisJobRow) -> Self {
        AnalysisJob {
            id: row.id,
            file_id: row.file_id,
            job_type: row.job_type.parse().unwrap_or(JobType::DocumentAnalysis),
            status: row.status.parse().unwrap_or(JobStatus::Queued),
            attempt_count: row.attempt_count as u32,
            max_attempts: row.max_attempts as u32,
            provider_preference: row.provider_preference,
            locked_by: row.locked_by,
            locked_at: row.locked_at,
            not_before: row.not_before,
            last_error: row.last_error,
            result_id: row.result_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FileRow {
    id: Uuid,
    storage_key: String,
    checksum: String,
    mime_type: String,
    status: String,
}

impl From<FileRow> for FileRef {
    fn from(row: FileRow) -> Self {
        FileRef {
            id: row.id,
            storage_key: row.storage_key,
            checksum: row.checksum,
            mime_type: row.mime_type,
            status: row.status.parse().unwrap_or(FileStatus::Pending),
        }
    }
}

impl JobStore for PgJobStore {
    async fn create_job(&self, request: CreateJobRequest) -> Result<AnalysisJob, AppError> {
        let row = sqlx::query_as::<_, AnalysisJobRow>(
            r#"
            INSERT INTO analysis_jobs (file_id, job_type, max_attempts, provider_preference)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(request.file_id)
        .bind(request.job_type.as_str())
        .bind(request.max_attempts.unwrap_or(3) as i32)
        .bind(&request.provider_preference)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.into())
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        eligible_types: &[JobType],
        stale_after: Duration,
    ) -> Result<Option<AnalysisJob>, AppError> {
        let types: Vec<String> = eligible_types.iter().map(|t| t.as_str().to_string()).collect();
        // An unrepresentable threshold disables reclamation for this call.
        let stale_cutoff =
            Utc::now() - TimeDelta::from_std(stale_after).unwrap_or(TimeDelta::days(3650));

        // Queued rows whose backoff has passed, plus running rows whose
        // lock predates the stale cutoff (abandoned by a dead worker).
        let row = sqlx::query_as::<_, AnalysisJobRow>(
            r#"
            UPDATE analysis_jobs
            SET status = 'running', locked_by = $1, locked_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM analysis_jobs
                WHERE job_type = ANY($2)
                  AND (
                    (status = 'queued' AND (not_before IS NULL OR not_before <= NOW()))
                    OR (status = 'running' AND locked_at < $3)
                  )
                ORDER BY created_at ASC, id ASC
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING *
            "#,
        )
        .bind(worker_id)
        .bind(&types)
        .bind(stale_cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn complete_job(
        &self,
        job_id: Uuid,
        result: &NewAnalysisResult,
    ) -> Result<Uuid, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        // Unique job_id makes the insert idempotent; a replayed finalize
        // lands on the conflict arm and reuses the existing row.
        let inserted: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO analysis_results (
                job_id, file_id, provider_used, model, analysis_type, summary,
                extracted_entities, confidence_score, raw_text, tokens_used,
                processing_time_ms
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (job_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(result.job_id)
        .bind(result.file_id)
        .bind(&result.provider_used)
        .bind(&result.model)
        .bind(result.analysis_type.as_str())
        .bind(&result.summary)
        .bind(&result.extracted_entities)
        .bind(result.confidence_score)
        .bind(&result.raw_text)
        .bind(result.tokens_used)
        .bind(result.processing_time_ms)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let result_id = match inserted {
            Some((id,)) => id,
            None => {
                let (id,): (Uuid,) =
                    sqlx::query_as(r#"SELECT id FROM analysis_results WHERE job_id = $1"#)
                        .bind(job_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(|e| AppError::DatabaseError(e.to_string()))?;
                id
            }
        };

        sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'completed', result_id = $2, completed_at = NOW(),
                updated_at = NOW(), locked_by = NULL, locked_at = NULL,
                last_error = NULL
            WHERE id = $1 AND status = 'running'
            "#,
        )
        .bind(job_id)
        .bind(result_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE files
            SET status = 'completed', updated_at = NOW()
            WHERE id = $1 AND status <> 'archived'
            "#,
        )
        .bind(result.file_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result_id)
    }

    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        // Requeue with backoff when next_attempt_at is set, otherwise
        // terminally fail. The running guard keeps a duplicate finalize
        // from double-incrementing the attempt budget.
        let updated: Option<(Uuid,)> = sqlx::query_as(
            r#"
            UPDATE analysis_jobs
            SET
                status = CASE WHEN $3::timestamptz IS NOT NULL THEN 'queued' ELSE 'failed' END,
                attempt_count = attempt_count + 1,
                not_before = $3,
                last_error = $2,
                locked_by = NULL,
                locked_at = NULL,
                completed_at = CASE WHEN $3::timestamptz IS NULL THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = 'running'
            RETURNING file_id
            "#,
        )
        .bind(job_id)
        .bind(error)
        .bind(next_attempt_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        if let Some((file_id,)) = updated
            && next_attempt_at.is_none()
        {
            sqlx::query(
                r#"
                UPDATE files
                SET status = 'failed', updated_at = NOW()
                WHERE id = $1 AND status <> 'archived'
                "#,
            )
            .bind(file_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn cancel_job(&self, job_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'cancelled', locked_by = NULL, locked_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn is_cancelled(&self, job_id: Uuid) -> Result<bool, AppError> {
        let row: Option<(bool,)> =
            sqlx::query_as(r#"SELECT status = 'cancelled' FROM analysis_jobs WHERE id = $1"#)
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.is_some_and(|(cancelled,)| cancelled))
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<AnalysisJob>, AppError> {
        let row =
            sqlx::query_as::<_, AnalysisJobRow>(r#"SELECT * FROM analysis_jobs WHERE id = $1"#)
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn get_file(&self, file_id: Uuid) -> Result<Option<FileRef>, AppError> {
        let row = sqlx::query_as::<_, FileRow>(
            r#"SELECT id, storage_key, checksum, mime_type, status FROM files WHERE id = $1"#,
        )
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<AnalysisJob>, AppError> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, AnalysisJobRow>(
                r#"
                SELECT * FROM analysis_jobs
                WHERE status = $1
                ORDER BY created_at DESC
                LIMIT $2
                "#,
            )
            .bind(status.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, AnalysisJobRow>(
                r#"
                SELECT * FROM analysis_jobs
                ORDER BY created_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
        }
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn release_worker_jobs(&self, worker_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE analysis_jobs
            SET status = 'queued', locked_by = NULL, locked_at = NULL, updated_at = NOW()
            WHERE locked_by = $1 AND status = 'running'
            "#,
        )
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(result.rows_affected())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64, AppError> {
        let (count,): (i64,) =
            sqlx::query_as(r#"SELECT COUNT(*) FROM analysis_jobs WHERE status = $1"#)
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(count)
    }
}
