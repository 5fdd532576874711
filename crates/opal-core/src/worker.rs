//! Worker poll loop: claim, process, finalize.
//!
//! Each worker instance polls the shared job store, claims one job at a
//! time, and processes claimed jobs on background tasks bounded by a
//! semaphore. Every claimed job reaches exactly one finalize call; no
//! error escapes the job handler as a crash.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analyze::AnalysisService;
use crate::error::AppError;
use crate::job::{AnalysisJob, JobType, WorkerConfig};
use crate::job_store::JobStore;
use crate::provider::Provider;
use crate::stage::ObjectStore;

/// Lifecycle events emitted by the worker loop.
///
/// Decouples the loop from its observability sink; production wires up
/// [`TracingWorkerReporter`], tests record events with a mock.
#[derive(Debug)]
pub enum WorkerEvent<'a> {
    Started { worker_id: &'a str },
    Polling,
    JobClaimed { job: &'a AnalysisJob },
    JobStarted { job_id: Uuid, job_type: JobType },
    JobCompleted {
        job_id: Uuid,
        result_id: Uuid,
        provider: &'a str,
    },
    JobFailed {
        job_id: Uuid,
        error: &'a str,
        will_retry: bool,
    },
    JobCancelled { job_id: Uuid },
    ShuttingDown {
        worker_id: &'a str,
        jobs_released: u64,
    },
    Stopped { worker_id: &'a str },
}

pub trait WorkerReporter: Send + Sync {
    fn report(&self, event: WorkerEvent<'_>);
}

/// Reporter that forwards worker events to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct TracingWorkerReporter;

impl WorkerReporter for TracingWorkerReporter {
    fn report(&self, event: WorkerEvent<'_>) {
        match event {
            WorkerEvent::Started { worker_id } => {
                tracing::info!(worker_id, "Worker started");
            }
            WorkerEvent::Polling => {
                tracing::trace!("Polling for work");
            }
            WorkerEvent::JobClaimed { job } => {
                tracing::info!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    attempt = job.attempt_count + 1,
                    max_attempts = job.max_attempts,
                    "Claimed job"
                );
            }
            WorkerEvent::JobStarted { job_id, job_type } => {
                tracing::debug!(%job_id, %job_type, "Processing job");
            }
            WorkerEvent::JobCompleted {
                job_id,
                result_id,
                provider,
            } => {
                tracing::info!(%job_id, %result_id, provider, "Job completed");
            }
            WorkerEvent::JobFailed {
                job_id,
                error,
                will_retry,
            } => {
                tracing::warn!(%job_id, error, will_retry, "Job attempt failed");
            }
            WorkerEvent::JobCancelled { job_id } => {
                tracing::info!(%job_id, "Job cancelled, abandoning work");
            }
            WorkerEvent::ShuttingDown {
                worker_id,
                jobs_released,
            } => {
                tracing::info!(worker_id, jobs_released, "Worker shutting down");
            }
            WorkerEvent::Stopped { worker_id } => {
                tracing::info!(worker_id, "Worker stopped");
            }
        }
    }
}

/// The worker service: owns the poll loop and the per-job pipeline.
pub struct WorkerService<J, S, P, R>
where
    J: JobStore,
    S: ObjectStore,
    P: Provider,
    R: WorkerReporter,
{
    store: J,
    service: AnalysisService<S, P>,
    config: WorkerConfig,
    reporter: Arc<R>,
}

impl<J, S, P, R> Clone for WorkerService<J, S, P, R>
where
    J: JobStore,
    S: ObjectStore,
    P: Provider,
    R: WorkerReporter,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            service: self.service.clone(),
            config: self.config.clone(),
            reporter: Arc::clone(&self.reporter),
        }
    }
}

impl<J, S, P, R> WorkerService<J, S, P, R>
where
    J: JobStore + 'static,
    S: ObjectStore + 'static,
    P: Provider + 'static,
    R: WorkerReporter + 'static,
{
    pub fn new(
        store: J,
        service: AnalysisService<S, P>,
        config: WorkerConfig,
        reporter: Arc<R>,
    ) -> Self {
        Self {
            store,
            service,
            config,
            reporter,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the poll loop until the token is cancelled, then drain in-flight
    /// jobs and release any remaining claims held by this worker.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), AppError> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_jobs));
        self.reporter.report(WorkerEvent::Started {
            worker_id: &self.config.worker_id,
        });

        loop {
            // Claim only when a processing slot is free, so a full worker
            // never locks rows it cannot start.
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            self.reporter.report(WorkerEvent::Polling);
            match self
                .store
                .claim_next(
                    &self.config.worker_id,
                    &self.config.eligible_types,
                    self.config.stale_lock_after,
                )
                .await
            {
                Ok(Some(job)) => {
                    self.reporter.report(WorkerEvent::JobClaimed { job: &job });
                    let worker = self.clone();
                    tokio::spawn(async move {
                        worker.process_job(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    tracing::error!(error = %e, "Failed to claim next job, backing off");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.config.poll_interval * 2) => {}
                    }
                }
            }
        }

        // Wait for in-flight jobs to finish before releasing claims, so a
        // job this worker is still finalizing is not handed to another one.
        let _ = semaphore
            .acquire_many(self.config.max_concurrent_jobs as u32)
            .await;

        let jobs_released = match self.store.release_worker_jobs(&self.config.worker_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "Failed to release claimed jobs on shutdown");
                0
            }
        };
        self.reporter.report(WorkerEvent::ShuttingDown {
            worker_id: &self.config.worker_id,
            jobs_released,
        });
        self.reporter.report(WorkerEvent::Stopped {
            worker_id: &self.config.worker_id,
        });
        Ok(())
    }

    /// Process one claimed job end to end. Infallible by contract: every
    /// outcome is resolved into a finalize call or an abandoned cancelled
    /// job, never a propagated error.
    async fn process_job(&self, job: AnalysisJob) {
        self.reporter.report(WorkerEvent::JobStarted {
            job_id: job.id,
            job_type: job.job_type,
        });

        // Checkpoint before the download.
        if self.bail_if_cancelled(&job).await {
            return;
        }

        let file_ref = match self.store.get_file(job.file_id).await {
            Ok(Some(f)) => f,
            Ok(None) => {
                // A dangling file reference will not appear on retry.
                self.finalize_failure(
                    &job,
                    AppError::ConfigError(format!("file reference {} not found", job.file_id)),
                )
                .await;
                return;
            }
            Err(e) => {
                self.finalize_failure(&job, e).await;
                return;
            }
        };

        let staged = match self.service.stage(&file_ref).await {
            Ok(s) => s,
            Err(e) => {
                self.finalize_failure(&job, e).await;
                return;
            }
        };

        // Checkpoint before the provider call; dropping out here also
        // drops the scratch copy.
        if self.bail_if_cancelled(&job).await {
            return;
        }

        let result = match self.service.analyze(&job, &file_ref, &staged).await {
            Ok(r) => r,
            Err(e) => {
                self.finalize_failure(&job, e).await;
                return;
            }
        };

        // Checkpoint before persisting the result.
        if self.bail_if_cancelled(&job).await {
            return;
        }

        match self.store.complete_job(job.id, &result).await {
            Ok(result_id) => {
                self.reporter.report(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    result_id,
                    provider: &result.provider_used,
                });
            }
            Err(e) => {
                // The result writer is idempotent, so requeueing and
                // redoing the attempt is safe.
                self.finalize_failure(&job, e).await;
            }
        }
    }

    /// Record a failed attempt, requeueing with backoff when the error is
    /// transient and the attempt budget allows another try.
    async fn finalize_failure(&self, job: &AnalysisJob, error: AppError) {
        let will_retry = error.is_retryable() && job.can_retry();
        let next_attempt_at = will_retry.then(|| job.next_eligible_at(&self.config.retry_config));
        let message = error.to_string();

        self.reporter.report(WorkerEvent::JobFailed {
            job_id: job.id,
            error: &message,
            will_retry,
        });
        if let Err(e) = self.store.fail_job(job.id, &message, next_attempt_at).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
        }
    }

    /// Cancellation probe. A failed probe is logged and treated as not
    /// cancelled; the job still has its attempt budget as a backstop.
    async fn bail_if_cancelled(&self, job: &AnalysisJob) -> bool {
        match self.store.is_cancelled(job.id).await {
            Ok(true) => {
                self.reporter.report(WorkerEvent::JobCancelled { job_id: job.id });
                true
            }
            Ok(false) => false,
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Cancellation probe failed");
                false
            }
        }
    }
}
