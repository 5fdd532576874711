pub mod analyze;
pub mod circuit_breaker;
pub mod error;
pub mod job;
pub mod job_store;
pub mod models;
pub mod provider;
pub mod router;
pub mod stage;
pub mod worker;


pub use analyze::AnalysisService;
pub use error::AppError;
pub use job::{AnalysisJob, CreateJobRequest, JobStatus, JobType, RetryConfig, WorkerConfig};
pub use job_store::JobStore;
pub use models::{
    AnalysisResult, FileRef, FileStatus, NewAnalysisResult, NewFileRef, compute_checksum,
};
pub use provider::{
    AnalysisOutcome, Capability, Document, Provider, ProviderDescriptor, ProviderOutput,
};
pub use router::ProviderRouter;
pub use stage::{ObjectMeta, ObjectStore, StagedDocument, Stager};
pub use worker::{TracingWorkerReporter, WorkerEvent, WorkerReporter, WorkerService};
