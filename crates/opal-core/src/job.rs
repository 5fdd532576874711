use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of analysis requested for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DocumentAnalysis,
    Valuation,
    Ocr,
    Summarization,
    Custom,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::DocumentAnalysis => "document_analysis",
            JobType::Valuation => "valuation",
            JobType::Ocr => "ocr",
            JobType::Summarization => "summarization",
            JobType::Custom => "custom",
        }
    }

    pub const ALL: [JobType; 5] = [
        JobType::DocumentAnalysis,
        JobType::Valuation,
        JobType::Ocr,
        JobType::Summarization,
        JobType::Custom,
    ];
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "document_analysis" => Ok(JobType::DocumentAnalysis),
            "valuation" => Ok(JobType::Valuation),
            "ocr" => Ok(JobType::Ocr),
            "summarization" => Ok(JobType::Summarization),
            "custom" => Ok(JobType::Custom),
            _ => Err(format!("Unknown job type: {}", s)),
        }
    }
}

/// Status of an analysis job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Retry configuration with exponential backoff.
///
/// Delay doubles per attempt starting from `base_delay`, capped at
/// `max_delay`: 30s, 1min, 2min, 4min, ...
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub base_delay: TimeDelta,
    pub max_delay: TimeDelta,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: TimeDelta::seconds(30),
            max_delay: TimeDelta::minutes(60),
        }
    }
}

impl RetryConfig {
    /// Calculate the backoff delay for a given attempt number (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> TimeDelta {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay * 2i32.pow(exponent);
        std::cmp::min(delay, self.max_delay)
    }
}

/// An analysis job in the queue.
///
/// One job ties a single uploaded file reference to one requested analysis.
/// Jobs are never deleted; every job ends in exactly one terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub file_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    /// Preferred provider name, tried first when set.
    pub provider_preference: Option<String>,
    /// Identity of the worker holding the claim, if any.
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    /// Earliest time the job is eligible to be claimed again after a retry.
    pub not_before: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub result_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    /// True if another transient failure would leave at least one attempt.
    pub fn can_retry(&self) -> bool {
        self.attempt_count + 1 < self.max_attempts
    }

    pub fn next_eligible_at(&self, config: &RetryConfig) -> DateTime<Utc> {
        let delay = config.delay_for_attempt(self.attempt_count + 1);
        Utc::now() + delay
    }
}

/// Request to enqueue a new analysis job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub file_id: Uuid,
    pub job_type: JobType,
    pub max_attempts: Option<u32>,
    pub provider_preference: Option<String>,
}

impl CreateJobRequest {
    pub fn new(file_id: Uuid, job_type: JobType) -> Self {
        Self {
            file_id,
            job_type,
            max_attempts: None,
            provider_preference: None,
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = Some(max);
        self
    }

    pub fn with_provider_preference(mut self, provider: impl Into<String>) -> Self {
        self.provider_preference = Some(provider.into());
        self
    }
}

/// Configuration for a worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    pub poll_interval: Duration,
    /// Upper bound on jobs processed concurrently by this instance.
    pub max_concurrent_jobs: usize,
    /// Job types this instance is willing to claim.
    pub eligible_types: Vec<JobType>,
    /// A running job locked longer than this is treated as abandoned
    /// and becomes reclaimable by any worker.
    pub stale_lock_after: Duration,
    pub retry_config: RetryConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let poll_interval = Duration::from_secs(10);
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            poll_interval,
            max_concurrent_jobs: 3,
            eligible_types: JobType::ALL.to_vec(),
            stale_lock_after: poll_interval * 10,
            retry_config: RetryConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self.stale_lock_after = interval * 10;
        self
    }

    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_eligible_types(mut self, types: Vec<JobType>) -> Self {
        self.eligible_types = types;
        self
    }

    pub fn with_stale_lock_after(mut self, after: Duration) -> Self {
        self.stale_lock_after = after;
        self
    }
}
