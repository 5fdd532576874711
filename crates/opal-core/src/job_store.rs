use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppError;
use crate::job::{AnalysisJob, CreateJobRequest, JobStatus, JobType};
use crate::models::{FileRef, NewAnalysisResult};

/// Durable job store shared by all worker instances.
///
/// Implementations must support atomic claiming via `SELECT FOR UPDATE SKIP
/// LOCKED` or an equivalent conditional update, so that concurrent claims
/// against the same queued row yield it to exactly one caller. Losing the
/// race is not an error; the loser simply gets a different row or `None`.
pub trait JobStore: Send + Sync + Clone {
    fn create_job(
        &self,
        request: CreateJobRequest,
    ) -> impl Future<Output = Result<AnalysisJob, AppError>> + Send;

    /// Atomically claim the next eligible queued job for processing.
    ///
    /// Eligible rows are queued rows whose `not_before` has passed, oldest
    /// created first (ties broken by id), plus running rows whose lock is
    /// older than `stale_after` (abandoned by a dead worker). Returns
    /// `None` when nothing is claimable.
    fn claim_next(
        &self,
        worker_id: &str,
        eligible_types: &[JobType],
        stale_after: Duration,
    ) -> impl Future<Output = Result<Option<AnalysisJob>, AppError>> + Send;

    /// Finalize a successful job: persist the analysis result, mark the job
    /// completed, and mark the file completed, atomically. Returns the
    /// result id. Calling this twice for the same job must not create a
    /// second result row.
    fn complete_job(
        &self,
        job_id: Uuid,
        result: &NewAnalysisResult,
    ) -> impl Future<Output = Result<Uuid, AppError>> + Send;

    /// Finalize a failed attempt: record the error and increment
    /// attempt_count. If `next_attempt_at` is provided the job is requeued
    /// with that backoff; otherwise it is terminally failed and the file is
    /// marked failed. Calling this twice for the same attempt must not
    /// double-increment the budget.
    fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn cancel_job(&self, job_id: Uuid) -> impl Future<Output = Result<(), AppError>> + Send;

    /// Cheap cancellation probe, checked by the handler before each
    /// expensive step.
    fn is_cancelled(&self, job_id: Uuid) -> impl Future<Output = Result<bool, AppError>> + Send;

    fn get_job(
        &self,
        job_id: Uuid,
    ) -> impl Future<Output = Result<Option<AnalysisJob>, AppError>> + Send;

    /// Look up the file reference a job targets (storage key, checksum,
    /// mime type).
    fn get_file(
        &self,
        file_id: Uuid,
    ) -> impl Future<Output = Result<Option<FileRef>, AppError>> + Send;

    fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<AnalysisJob>, AppError>> + Send;

    /// Release all jobs held by a specific worker (for graceful shutdown).
    fn release_worker_jobs(
        &self,
        worker_id: &str,
    ) -> impl Future<Output = Result<u64, AppError>> + Send;

    fn count_by_status(
        &self,
        status: JobStatus,
    ) -> impl Future<Output = Result<i64, AppError>> + Send;
}
