use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::error::AppError;
use crate::job::JobType;
use crate::provider::{AnalysisOutcome, Document, Provider, required_capabilities};

/// Ordered fallback chain over a set of provider adapters.
///
/// Selection order for each call: the job's explicit provider preference
/// first, then providers whose capabilities match the task, by priority,
/// then everything else by priority when no provider matches. On a
/// provider-level failure (timeout, rate limit, 5xx, malformed or rejected
/// response) the next eligible provider is tried before the failure
/// surfaces; a single degraded backend never stalls the pipeline.
///
/// Each chain member carries its own circuit breaker; members with an open
/// circuit are skipped without being called.
#[derive(Clone)]
pub struct ProviderRouter<P: Provider> {
    members: Vec<ChainMember<P>>,
}

#[derive(Clone)]
struct ChainMember<P> {
    provider: P,
    breaker: CircuitBreaker,
}

impl<P: Provider> ProviderRouter<P> {
    pub fn new(providers: Vec<P>) -> Self {
        Self::with_breaker_config(providers, CircuitBreakerConfig::default())
    }

    pub fn with_breaker_config(providers: Vec<P>, config: CircuitBreakerConfig) -> Self {
        let members = providers
            .into_iter()
            .map(|provider| {
                let breaker = CircuitBreaker::new(
                    provider.descriptor().name.clone(),
                    config.clone(),
                );
                ChainMember { provider, breaker }
            })
            .collect();
        Self { members }
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Run the document through the chain, returning the first successful
    /// provider's normalized outcome.
    pub async fn analyze(
        &self,
        document: &Document,
        job_type: JobType,
        preference: Option<&str>,
    ) -> Result<AnalysisOutcome, AppError> {
        if self.members.is_empty() {
            return Err(AppError::ConfigError("no providers configured".into()));
        }

        let order = self.chain_order(job_type, &document.mime_type, preference);
        let mut last_error: Option<AppError> = None;

        for idx in order {
            let member = &self.members[idx];
            let name = &member.provider.descriptor().name;

            if !member.breaker.allows_request() {
                tracing::debug!(
                    provider = %name,
                    retry_after = ?member.breaker.retry_after(),
                    "Skipping provider with open circuit"
                );
                continue;
            }

            tracing::debug!(provider = %name, %job_type, "Trying provider");
            match member.provider.analyze(document, job_type).await {
                Ok(output) => {
                    member.breaker.record_success();
                    return Ok(AnalysisOutcome::from_output(name, output));
                }
                Err(e) => {
                    if e.should_trip_circuit() {
                        member.breaker.record_failure(&e);
                    }
                    tracing::warn!(
                        provider = %name,
                        error = %e,
                        "Provider failed, falling back to next in chain"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(AppError::ProviderError {
            message: "all providers unavailable".into(),
            status_code: 503,
            retryable: true,
        }))
    }

    /// Indices of chain members in the order they should be attempted.
    fn chain_order(
        &self,
        job_type: JobType,
        mime_type: &str,
        preference: Option<&str>,
    ) -> Vec<usize> {
        let required = required_capabilities(job_type, mime_type);

        let mut by_priority: Vec<usize> = (0..self.members.len()).collect();
        by_priority.sort_by_key(|&i| self.members[i].provider.descriptor().priority);

        let matched: Vec<usize> = by_priority
            .iter()
            .copied()
            .filter(|&i| {
                self.members[i]
                    .provider
                    .descriptor()
                    .supports_all(&required)
            })
            .collect();

        // Fall back to the plain priority list only when nothing matches.
        let candidates = if matched.is_empty() {
            by_priority
        } else {
            matched
        };

        let mut order = Vec::with_capacity(candidates.len() + 1);
        if let Some(preferred) = preference
            && let Some(i) = self
                .members
                .iter()
                .position(|m| m.provider.descriptor().name == preferred)
        {
            order.push(i);
        }
        for i in candidates {
            if !order.contains(&i) {
                order.push(i);
            }
        }
        order
    }
}
