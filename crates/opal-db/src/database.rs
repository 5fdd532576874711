use opal_core::AppError;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::DatabaseConfig;
use crate::file_repository::FileRepository;
use crate::job_repository::PgJobStore;
use crate::result_repository::AnalysisResultRepository;

/// Owns the Postgres pool a worker shares across its repositories.
///
/// One pool per process; the job store and the read repositories are cheap
/// clones over it, so claim, finalize, and status reads all draw from the
/// same bounded connection budget.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = config.max_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            "Database pool established"
        );
        Ok(Self { pool })
    }

    /// Wrap an existing pool; integration tests hand in a container-backed one.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply any pending migrations from `migrations/`. Workers run this on
    /// startup; reapplying is a no-op.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        tracing::info!("Database schema up to date");
        Ok(())
    }

    pub fn job_store(&self) -> PgJobStore {
        PgJobStore::new(self.pool.clone())
    }

    pub fn result_repo(&self) -> AnalysisResultRepository {
        AnalysisResultRepository::new(self.pool.clone())
    }

    pub fn file_repo(&self) -> FileRepository {
        FileRepository::new(self.pool.clone())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
