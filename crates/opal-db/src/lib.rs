pub mod config;
pub mod database;
pub mod file_repository;
pub mod job_repository;
pub mod result_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use file_repository::FileRepository;
pub use job_repository::PgJobStore;
pub use result_repository::AnalysisResultRepository;
