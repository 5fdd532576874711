use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use opal_core::error::AppError;
use opal_core::job::JobType;
use opal_core::provider::{Capability, Document, Provider, ProviderDescriptor, ProviderOutput};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::normalize;
use crate::prompts;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4096;

/// Adapter for the Anthropic Messages API.
///
/// Images and PDFs are both sent inline as base64 source blocks; the
/// Messages API accepts PDF documents natively, so this adapter is the
/// chain's document workhorse.
#[derive(Clone, Debug)]
pub struct AnthropicProvider {
    client: Client,
    descriptor: ProviderDescriptor,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl AnthropicProvider {
    pub fn new(api_key: &str, model: &str, priority: u8) -> Result<Self, AppError> {
        Self::build(api_key, model, DEFAULT_BASE_URL, priority, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(self, base_url: &str) -> Result<Self, AppError> {
        Self::build(
            &self.api_key,
            &self.model,
            base_url,
            self.descriptor.priority,
            Duration::from_secs(self.timeout_secs),
        )
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(
            &self.api_key,
            &self.model,
            &self.base_url,
            self.descriptor.priority,
            timeout,
        )
    }

    fn build(
        api_key: &str,
        model: &str,
        base_url: &str,
        priority: u8,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::NetworkError(e.to_string()))?;

        Ok(Self {
            client,
            descriptor: ProviderDescriptor::new(
                "anthropic",
                vec![Capability::Vision, Capability::LongContext, Capability::Ocr],
                priority,
            ),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn build_content(document: &Document, prompt: &str) -> Vec<ContentBlock> {
        if document.mime_type.starts_with("image/") {
            return vec![
                ContentBlock::Image {
                    source: Source::base64(&document.mime_type, &document.bytes),
                },
                ContentBlock::Text {
                    text: prompt.to_string(),
                },
            ];
        }

        if document.mime_type == "application/pdf" {
            return vec![
                ContentBlock::Document {
                    source: Source::base64("application/pdf", &document.bytes),
                },
                ContentBlock::Text {
                    text: prompt.to_string(),
                },
            ];
        }

        let text = String::from_utf8_lossy(&document.bytes);
        vec![ContentBlock::Text {
            text: format!("{prompt}\n\nDocument content:\n{text}"),
        }]
    }
}

// ---- Messages API types ----

#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ContentBlock {
    Text { text: String },
    Image { source: Source },
    Document { source: Source },
}

#[derive(Serialize)]
struct Source {
    #[serde(rename = "type")]
    source_type: String,
    media_type: String,
    data: String,
}

impl Source {
    fn base64(media_type: &str, bytes: &[u8]) -> Self {
        Self {
            source_type: "base64".to_string(),
            media_type: media_type.to_string(),
            data: BASE64.encode(bytes),
        }
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    usage: Option<ResponseUsage>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ResponseUsage {
    input_tokens: i64,
    output_tokens: i64,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl Provider for AnthropicProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn analyze(
        &self,
        document: &Document,
        job_type: JobType,
    ) -> Result<ProviderOutput, AppError> {
        let url = format!("{}/v1/messages", self.base_url);
        let prompt = prompts::analysis_prompt(job_type);
        tracing::debug!(
            provider = %self.descriptor.name,
            model = %self.model,
            %job_type,
            mime_type = %document.mime_type,
            bytes = document.bytes.len(),
            "Requesting analysis"
        );

        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            system: prompts::SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: Self::build_content(document, prompt),
            }],
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout_secs)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::NetworkError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let status_code = status.as_u16();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status_code}: {body}"));
            tracing::warn!(
                provider = %self.descriptor.name,
                status_code,
                "Provider returned error status"
            );

            return Err(match status_code {
                429 => AppError::RateLimitExceeded,
                400 | 413 | 415 | 422 => AppError::ProviderRejected(message),
                _ => AppError::ProviderError {
                    message,
                    status_code,
                    retryable: status_code >= 500,
                },
            });
        }

        let messages_response: MessagesResponse = response.json().await.map_err(|e| {
            AppError::NetworkError(format!("Failed to parse provider response: {e}"))
        })?;

        let raw_text = messages_response
            .content
            .iter()
            .filter_map(|b| b.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        if raw_text.is_empty() {
            return Err(AppError::ProviderError {
                message: "Empty response from model".into(),
                status_code: 200,
                retryable: false,
            });
        }

        let entities = normalize::parse_structured_response(&raw_text);
        let summary = match job_type {
            JobType::Summarization => Some(raw_text.trim().to_string()),
            _ => normalize::summary_from(&entities),
        };
        let confidence = normalize::confidence_from(&entities);

        Ok(ProviderOutput {
            raw_text,
            summary,
            entities,
            confidence,
            model: self.model.clone(),
            tokens_used: messages_response
                .usage
                .map(|u| u.input_tokens + u.output_tokens),
        })
    }
}
