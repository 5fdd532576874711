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

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_TOKENS: u32 = 4096;

/// Adapter for OpenAI-compatible chat-completions APIs.
///
/// Works with any OpenAI-compatible backend, including:
/// - OpenAI directly (`https://api.openai.com/v1`)
/// - Gemini via compatibility layer (`https://generativelanguage.googleapis.com/v1beta/openai`)
/// - Moonshot, Ollama, vLLM, and similar
///
/// Images are sent inline as base64 data URLs; text-like content is sent
/// inline with the prompt. PDFs are refused, since the chat-completions
/// schema has no native document input; a chain member that supports
/// documents picks those up instead.
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    client: Client,
    descriptor: ProviderDescriptor,
    base_url: String,
    api_key: String,
    model: String,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, model: &str, priority: u8) -> Result<Self, AppError> {
        Self::named("openai", api_key, model, DEFAULT_BASE_URL, priority)
    }

    /// Build an adapter under a custom chain name, for compatible backends
    /// served from a different base URL.
    pub fn named(
        name: &str,
        api_key: &str,
        model: &str,
        base_url: &str,
        priority: u8,
    ) -> Result<Self, AppError> {
        Self::build(name, api_key, model, base_url, priority, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, AppError> {
        Self::build(
            &self.descriptor.name,
            &self.api_key,
            &self.model,
            &self.base_url,
            self.descriptor.priority,
            timeout,
        )
    }

    fn build(
        name: &str,
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
                name,
                vec![Capability::Vision, Capability::LongContext, Capability::Ocr],
                priority,
            ),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn build_content(&self, document: &Document, prompt: &str) -> Result<Vec<ContentPart>, AppError> {
        if document.mime_type.starts_with("image/") {
            let encoded = BASE64.encode(&document.bytes);
            return Ok(vec![
                ContentPart::Text {
                    text: prompt.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:{};base64,{}", document.mime_type, encoded),
                    },
                },
            ]);
        }

        if document.mime_type == "application/pdf" {
            return Err(AppError::UnsupportedContent(format!(
                "{} cannot accept application/pdf input",
                self.descriptor.name
            )));
        }

        let text = String::from_utf8_lossy(&document.bytes);
        Ok(vec![ContentPart::Text {
            text: format!("{prompt}\n\nDocument content:\n{text}"),
        }])
    }
}

// ---- Chat-completions API types ----

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    total_tokens: i64,
}

#[derive(Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl Provider for OpenAiProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn analyze(
        &self,
        document: &Document,
        job_type: JobType,
    ) -> Result<ProviderOutput, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let prompt = prompts::analysis_prompt(job_type);
        tracing::debug!(
            provider = %self.descriptor.name,
            model = %self.model,
            %job_type,
            mime_type = %document.mime_type,
            bytes = document.bytes.len(),
            "Requesting analysis"
        );

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: MessageContent::Text(prompts::SYSTEM_PROMPT.to_string()),
                },
                Message {
                    role: "user".to_string(),
                    content: MessageContent::Parts(self.build_content(document, prompt)?),
                },
            ],
            temperature: 0.1,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            AppError::NetworkError(format!("Failed to parse provider response: {e}"))
        })?;

        let raw_text = chat_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| AppError::ProviderError {
                message: "Empty response from model".into(),
                status_code: 200,
                retryable: false,
            })?;

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
            tokens_used: chat_response.usage.map(|u| u.total_tokens),
        })
    }
}
