use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use opal_core::analyze::AnalysisService;
use opal_core::job::{JobType, WorkerConfig};
use opal_core::router::ProviderRouter;
use opal_core::stage::Stager;
use opal_core::worker::{TracingWorkerReporter, WorkerService};
use opal_db::{Database, DatabaseConfig};
use opal_providers::{HttpObjectStore, ProviderConfig, build_chain};

#[derive(Parser)]
#[command(name = "opal-worker", version, about = "Document analysis worker")]
struct Args {
    /// Stable worker identity; auto-generated when omitted
    #[arg(long, env = "OPAL_WORKER_ID")]
    worker_id: Option<String>,

    /// Seconds to sleep between polls when the queue is empty
    #[arg(long, env = "OPAL_POLL_INTERVAL_SECS", default_value_t = 10)]
    poll_interval_secs: u64,

    /// Upper bound on jobs processed concurrently by this instance
    #[arg(long, env = "OPAL_MAX_CONCURRENT_JOBS", default_value_t = 3)]
    max_concurrent_jobs: usize,

    /// Comma-separated job types to claim (defaults to all)
    #[arg(long, env = "OPAL_JOB_TYPES")]
    job_types: Option<String>,

    /// Seconds after which another worker's lock is treated as abandoned
    /// (defaults to 10x the poll interval)
    #[arg(long, env = "OPAL_STALE_LOCK_SECS")]
    stale_lock_secs: Option<u64>,

    /// Object storage endpoint (MinIO or compatible)
    #[arg(
        long,
        env = "STORAGE_ENDPOINT",
        default_value = "http://localhost:9000"
    )]
    storage_endpoint: String,

    /// Bucket holding uploaded files
    #[arg(long, env = "STORAGE_BUCKET", default_value = "investments")]
    storage_bucket: String,

    /// Bearer token for object storage, when required
    #[arg(long, env = "STORAGE_ACCESS_TOKEN")]
    storage_access_token: Option<String>,

    /// Scratch directory for staged file copies
    #[arg(long, env = "OPAL_SCRATCH_DIR", default_value = "/tmp/opal")]
    scratch_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("opal=info".parse()?))
        .with_target(false)
        .init();

    let args = Args::parse();

    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let providers = build_chain(&ProviderConfig::from_env())?;
    tracing::info!(chain_len = providers.len(), "Provider chain configured");
    let router = ProviderRouter::new(providers);

    let mut store = HttpObjectStore::new(&args.storage_endpoint, &args.storage_bucket)?;
    if let Some(token) = &args.storage_access_token {
        store = store.with_access_token(token);
    }
    let stager = Stager::new(store, &args.scratch_dir);

    let mut config = WorkerConfig::default()
        .with_poll_interval(Duration::from_secs(args.poll_interval_secs))
        .with_max_concurrent_jobs(args.max_concurrent_jobs);
    if let Some(id) = args.worker_id {
        config = config.with_worker_id(id);
    }
    if let Some(secs) = args.stale_lock_secs {
        config = config.with_stale_lock_after(Duration::from_secs(secs));
    }
    if let Some(raw) = &args.job_types {
        config = config.with_eligible_types(parse_job_types(raw)?);
    }

    tracing::info!(
        worker_id = %config.worker_id,
        poll_interval_secs = args.poll_interval_secs,
        max_concurrent_jobs = config.max_concurrent_jobs,
        "Starting worker"
    );

    let worker = WorkerService::new(
        db.job_store(),
        AnalysisService::new(stager, router),
        config,
        Arc::new(TracingWorkerReporter),
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                cancel.cancel();
            }
        }
    });

    worker.run(cancel).await?;

    Ok(())
}

/// Parse a comma-separated list like "document_analysis,ocr".
fn parse_job_types(raw: &str) -> Result<Vec<JobType>> {
    let types = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<JobType>().map_err(|e| anyhow::anyhow!(e)))
        .collect::<Result<Vec<_>>>()
        .context("Invalid OPAL_JOB_TYPES")?;

    if types.is_empty() {
        anyhow::bail!("OPAL_JOB_TYPES must name at least one job type");
    }
    Ok(types)
}
