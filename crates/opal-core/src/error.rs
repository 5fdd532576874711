use thiserror::Error;

/// Application-wide error types for Opal.
#[derive(Error, Debug)]
pub enum AppError {
    /// Object storage read failed (download or stat).
    #[error("Storage error: {0}")]
    StorageError(String),

    /// AI provider call failed.
    #[error("Provider error (HTTP {status_code}): {message}")]
    ProviderError {
        message: String,
        status_code: u16,
        retryable: bool,
    },

    /// Provider explicitly refused the document (unsupported input,
    /// content policy, invalid request). Will recur on resubmission.
    #[error("Provider rejected document: {0}")]
    ProviderRejected(String),

    /// Downloaded bytes do not match the registered checksum.
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    /// File content type the pipeline cannot analyze.
    #[error("Unsupported content type: {0}")]
    UnsupportedContent(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// Network/connection error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Scratch file I/O failed during staging.
    #[error("Staging error: {0}")]
    StagingError(String),

    /// Generic error. Treated as transient but bounded by max_attempts.
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    ///
    /// Unclassified errors default to retryable; the attempt budget still
    /// bounds them, so a persistently bad input cannot loop forever.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::IntegrityMismatch { .. }
            | AppError::UnsupportedContent(_)
            | AppError::ProviderRejected(_)
            | AppError::SerializationError(_)
            | AppError::ConfigError(_) => false,
            AppError::ProviderError { retryable, .. } => *retryable,
            _ => true,
        }
    }

    /// Returns true if retrying can never succeed (the failure will recur
    /// on any resubmission of the same input).
    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Returns true if this error should trip a provider circuit breaker.
    pub fn should_trip_circuit(&self) -> bool {
        match self {
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimitExceeded => true,
            AppError::ProviderError {
                status_code,
                retryable,
                ..
            } => *status_code == 429 || *status_code >= 500 || *retryable,
            _ => false,
        }
    }
}
