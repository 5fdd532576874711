//! Provider registry: concrete adapters behind one dispatchable type.

use opal_core::error::AppError;
use opal_core::job::JobType;
use opal_core::provider::{Document, Provider, ProviderDescriptor, ProviderOutput};

use crate::anthropic::AnthropicProvider;
use crate::config::{GEMINI_COMPAT_URL, ProviderConfig};
use crate::openai::OpenAiProvider;

/// Tagged union over the concrete provider adapters.
///
/// The router is generic over one provider type; this enum is that type
/// when mixing backends in a single chain.
#[derive(Clone, Debug)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
}

impl Provider for AnyProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        match self {
            AnyProvider::OpenAi(p) => p.descriptor(),
            AnyProvider::Anthropic(p) => p.descriptor(),
        }
    }

    async fn analyze(
        &self,
        document: &Document,
        job_type: JobType,
    ) -> Result<ProviderOutput, AppError> {
        match self {
            AnyProvider::OpenAi(p) => p.analyze(document, job_type).await,
            AnyProvider::Anthropic(p) => p.analyze(document, job_type).await,
        }
    }
}

/// Build the fallback chain from configuration.
///
/// Chain order is openai, anthropic, google, with `preferred` moved to the
/// front when set. Providers without an API key are skipped; an empty
/// chain is a configuration error.
pub fn build_chain(config: &ProviderConfig) -> Result<Vec<AnyProvider>, AppError> {
    let mut names = vec!["openai", "anthropic", "google"];
    if let Some(preferred) = config.preferred.as_deref()
        && let Some(pos) = names.iter().position(|n| *n == preferred)
    {
        let head = names.remove(pos);
        names.insert(0, head);
    }

    let mut chain = Vec::new();
    for name in names {
        let priority = chain.len() as u8;
        let provider = match name {
            "openai" => config.openai_api_key.as_deref().map(|key| {
                OpenAiProvider::named(
                    "openai",
                    key,
                    &config.openai_model,
                    &config.openai_base_url,
                    priority,
                )
                .and_then(|p| p.with_timeout(config.timeout))
                .map(AnyProvider::OpenAi)
            }),
            "anthropic" => config.anthropic_api_key.as_deref().map(|key| {
                AnthropicProvider::new(key, &config.anthropic_model, priority)
                    .and_then(|p| p.with_timeout(config.timeout))
                    .map(AnyProvider::Anthropic)
            }),
            "google" => config.google_api_key.as_deref().map(|key| {
                OpenAiProvider::named(
                    "google",
                    key,
                    &config.google_model,
                    GEMINI_COMPAT_URL,
                    priority,
                )
                .and_then(|p| p.with_timeout(config.timeout))
                .map(AnyProvider::OpenAi)
            }),
            _ => unreachable!(),
        };
        if let Some(provider) = provider {
            chain.push(provider?);
        }
    }

    if chain.is_empty() {
        return Err(AppError::ConfigError(
            "no provider API keys configured; set OPENAI_API_KEY, ANTHROPIC_API_KEY, \
             or GOOGLE_API_KEY"
                .into(),
        ));
    }
    Ok(chain)
}
