use std::time::Duration;

use opal_core::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u32 = 30;

/// Connection pool settings for one worker instance.
///
/// Pool capacity bounds how many claim/finalize round trips a worker can
/// have in flight at once; the acquire timeout keeps a saturated pool from
/// stalling the poll loop indefinitely.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Read pool settings from the environment.
    ///
    /// - `DATABASE_URL` (required)
    /// - `DATABASE_MAX_CONNECTIONS` (default 5)
    /// - `DATABASE_ACQUIRE_TIMEOUT_SECS` (default 30)
    pub fn from_env() -> Result<Self, AppError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| AppError::ConfigError("DATABASE_URL is not set".into()))?;

        let max_connections = match std::env::var("DATABASE_MAX_CONNECTIONS") {
            Err(_) => DEFAULT_MAX_CONNECTIONS,
            Ok(raw) => parse_positive("DATABASE_MAX_CONNECTIONS", &raw)?,
        };
        let acquire_timeout_secs = match std::env::var("DATABASE_ACQUIRE_TIMEOUT_SECS") {
            Err(_) => DEFAULT_ACQUIRE_TIMEOUT_SECS,
            Ok(raw) => parse_positive("DATABASE_ACQUIRE_TIMEOUT_SECS", &raw)?,
        };

        Ok(Self {
            url,
            max_connections,
            acquire_timeout: Duration::from_secs(acquire_timeout_secs as u64),
        })
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<u32, AppError> {
    match raw.parse::<u32>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(AppError::ConfigError(format!(
            "{name} must be a positive integer, got '{raw}'"
        ))),
    }
}
