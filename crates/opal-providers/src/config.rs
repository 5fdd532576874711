use std::env;
use std::time::Duration;

/// Gemini's OpenAI-compatibility endpoint, used to drive Gemini through
/// the chat-completions adapter.
pub const GEMINI_COMPAT_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_GOOGLE_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Provider credentials and models, read from the environment.
///
/// A provider with no API key configured is simply left out of the chain;
/// it is an error only if that leaves the chain empty.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider tried first in the chain (`AI_PROVIDER`), when set.
    pub preferred: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub google_api_key: Option<String>,
    pub google_model: String,
    pub timeout: Duration,
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| env::var(name).ok())
        .find(|v| !v.is_empty())
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        Self {
            preferred: first_env(&["AI_PROVIDER"]).map(|p| p.to_lowercase()),
            openai_api_key: first_env(&["OPENAI_API_KEY", "AI_API_KEY"]),
            openai_base_url: first_env(&["OPENAI_API_URL", "AI_API_URL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            openai_model: first_env(&["OPENAI_MODEL", "AI_MODEL"])
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            anthropic_api_key: first_env(&["ANTHROPIC_API_KEY"]),
            anthropic_model: first_env(&["ANTHROPIC_MODEL", "AI_MODEL"])
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            google_api_key: first_env(&["GOOGLE_API_KEY", "GEMINI_API_KEY"]),
            google_model: first_env(&["GOOGLE_MODEL", "GEMINI_MODEL"])
                .unwrap_or_else(|| DEFAULT_GOOGLE_MODEL.to_string()),
            timeout: Duration::from_secs(
                first_env(&["AI_TIMEOUT_SECS"])
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
        }
    }
}
