use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::job::JobType;

/// Confidence assigned when a provider does not natively report one.
/// Deliberately conservative; normalization may lower a reported value
/// (clamping) but never raise one.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// A capability an AI backend may advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Vision,
    LongContext,
    Ocr,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Vision => write!(f, "vision"),
            Capability::LongContext => write!(f, "long_context"),
            Capability::Ocr => write!(f, "ocr"),
        }
    }
}

/// Static description of a provider: identity, what it can do, and its
/// rank in the configured fallback order (lower is tried first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub priority: u8,
}

impl ProviderDescriptor {
    pub fn new(name: impl Into<String>, capabilities: Vec<Capability>, priority: u8) -> Self {
        Self {
            name: name.into(),
            capabilities,
            priority,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn supports_all(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.supports(*c))
    }
}

/// Capabilities a job needs from a backend, derived from the task and the
/// staged content type.
pub fn required_capabilities(job_type: JobType, mime_type: &str) -> Vec<Capability> {
    let mut required = Vec::new();
    if job_type == JobType::Ocr {
        required.push(Capability::Ocr);
    }
    if mime_type.starts_with("image/") && !required.contains(&Capability::Vision) {
        required.push(Capability::Vision);
    }
    required
}

/// Staged document content handed to a provider adapter.
#[derive(Debug, Clone)]
pub struct Document {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub file_name: String,
}

/// Raw output of a single provider call, before normalization.
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    pub raw_text: String,
    pub summary: Option<String>,
    pub entities: serde_json::Value,
    /// Native confidence, if the backend reports one.
    pub confidence: Option<f32>,
    pub model: String,
    pub tokens_used: Option<i64>,
}

/// Normalized analysis outcome. Always comes from exactly one provider;
/// outputs from different providers are never merged.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub provider_used: String,
    pub model: String,
    pub summary: Option<String>,
    pub extracted_entities: serde_json::Value,
    pub confidence_score: f32,
    pub raw_text: String,
    pub tokens_used: Option<i64>,
}

impl AnalysisOutcome {
    /// Normalize one provider's output into the common schema.
    pub fn from_output(provider: &str, output: ProviderOutput) -> Self {
        let confidence_score = output
            .confidence
            .unwrap_or(DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);

        Self {
            provider_used: provider.to_string(),
            model: output.model,
            summary: output.summary,
            extracted_entities: output.entities,
            confidence_score,
            raw_text: output.raw_text,
            tokens_used: output.tokens_used,
        }
    }
}

/// One AI backend behind the common analysis contract.
///
/// Adapters own their request/response schema translation; the rest of the
/// pipeline only sees `Document` in and `ProviderOutput` out.
pub trait Provider: Send + Sync + Clone {
    fn descriptor(&self) -> &ProviderDescriptor;

    fn analyze(
        &self,
        document: &Document,
        job_type: JobType,
    ) -> impl Future<Output = Result<ProviderOutput, AppError>> + Send;
}
