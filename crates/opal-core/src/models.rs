use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::job::JobType;

/// Processing state of an uploaded file. Owned by the coordination layer;
/// the worker only moves it along the processing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Archived,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Pending => "pending",
            FileStatus::Processing => "processing",
            FileStatus::Completed => "completed",
            FileStatus::Failed => "failed",
            FileStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(FileStatus::Pending),
            "processing" => Ok(FileStatus::Processing),
            "completed" => Ok(FileStatus::Completed),
            "failed" => Ok(FileStatus::Failed),
            "archived" => Ok(FileStatus::Archived),
            _ => Err(format!("Unknown file status: {}", s)),
        }
    }
}

/// Reference to an uploaded object in storage.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FileRef {
    pub id: Uuid,
    pub storage_key: String,
    /// SHA-256 of the uploaded content, registered at upload confirmation.
    pub checksum: String,
    pub mime_type: String,
    pub status: FileStatus,
}

/// DTO for registering an uploaded object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NewFileRef {
    pub storage_key: String,
    pub checksum: String,
    pub mime_type: String,
}

/// A persisted analysis result. Exactly one per completed job.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub job_id: Uuid,
    pub file_id: Uuid,
    pub provider_used: String,
    pub model: String,
    pub analysis_type: JobType,
    pub summary: Option<String>,
    /// Normalized key/value extraction from the provider's raw output.
    pub extracted_entities: serde_json::Value,
    pub confidence_score: f32,
    pub raw_text: String,
    pub tokens_used: Option<i64>,
    pub processing_time_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// DTO for inserting a new analysis result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct NewAnalysisResult {
    pub job_id: Uuid,
    pub file_id: Uuid,
    pub provider_used: String,
    pub model: String,
    pub analysis_type: JobType,
    pub summary: Option<String>,
    pub extracted_entities: serde_json::Value,
    pub confidence_score: f32,
    pub raw_text: String,
    pub tokens_used: Option<i64>,
    pub processing_time_ms: Option<i64>,
}

/// Compute a SHA-256 hash of a byte slice, returned as 64-char hex.
pub fn compute_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
