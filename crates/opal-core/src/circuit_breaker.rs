//! Circuit breaker guarding each provider adapter.
//!
//! A provider whose circuit is open is skipped by the fallback chain
//! instead of being called, so a degraded backend never stalls the
//! pipeline. Rate-limit failures stretch the recovery timeout, which is
//! how provider-reported backoff signals are honored locally.
//!
//! States: Closed (healthy) → Open after N consecutive failures →
//! HalfOpen after the recovery timeout → Closed again after M successful
//! probes, or back to Open on a failed probe.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Successful half-open probes before the circuit closes again.
    pub success_threshold: u32,
    /// Time to wait before probing an open circuit.
    pub recovery_timeout: Duration,
    /// Multiplier applied to the recovery timeout on rate-limit failures.
    pub rate_limit_backoff_multiplier: f32,
    pub max_recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            rate_limit_backoff_multiplier: 2.0,
            max_recovery_timeout: Duration::from_secs(300),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure_at: Option<Instant>,
    current_recovery_timeout: Duration,
}

/// Thread-safe circuit breaker, one per provider in the chain.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let inner = BreakerInner {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_failure_at: None,
            current_recovery_timeout: config.recovery_timeout,
        };
        Self {
            name: name.into(),
            config,
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(circuit = %self.name, "Recovered from poisoned mutex");
            poisoned.into_inner()
        })
    }

    /// Current state, applying the lazy Open → HalfOpen transition.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock_inner();
        Self::maybe_half_open(&self.name, &mut inner);
        inner.state
    }

    /// True if a call should be attempted right now.
    pub fn allows_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    /// How long until an open circuit will probe again.
    pub fn retry_after(&self) -> Option<Duration> {
        let mut inner = self.lock_inner();
        Self::maybe_half_open(&self.name, &mut inner);
        if inner.state != CircuitState::Open {
            return None;
        }
        Some(match inner.last_failure_at {
            Some(at) => inner
                .current_recovery_timeout
                .saturating_sub(at.elapsed()),
            None => inner.current_recovery_timeout,
        })
    }

    pub fn record_success(&self) {
        let mut inner = self.lock_inner();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    tracing::info!(
                        circuit = %self.name,
                        probes = inner.success_count,
                        "Circuit breaker closing after successful probes"
                    );
                    inner.state = CircuitState::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    inner.current_recovery_timeout = self.config.recovery_timeout;
                }
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self, error: &AppError) {
        let mut inner = self.lock_inner();

        let is_rate_limit = matches!(error, AppError::RateLimitExceeded)
            || matches!(
                error,
                AppError::ProviderError {
                    status_code: 429,
                    ..
                }
            );

        match inner.state {
            CircuitState::Closed => {
                inner.failure_count += 1;
                inner.last_failure_at = Some(Instant::now());
                if inner.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        circuit = %self.name,
                        failures = inner.failure_count,
                        error = %error,
                        "Circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    if is_rate_limit {
                        self.extend_recovery_timeout(&mut inner);
                    }
                }
            }
            CircuitState::HalfOpen => {
                tracing::warn!(
                    circuit = %self.name,
                    error = %error,
                    "Probe failed, circuit breaker reopening"
                );
                inner.state = CircuitState::Open;
                inner.last_failure_at = Some(Instant::now());
                inner.success_count = 0;
                if is_rate_limit {
                    self.extend_recovery_timeout(&mut inner);
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock_inner();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.last_failure_at = None;
        inner.current_recovery_timeout = self.config.recovery_timeout;
    }

    fn extend_recovery_timeout(&self, inner: &mut BreakerInner) {
        inner.current_recovery_timeout = std::cmp::min(
            Duration::from_secs_f32(
                inner.current_recovery_timeout.as_secs_f32()
                    * self.config.rate_limit_backoff_multiplier,
            ),
            self.config.max_recovery_timeout,
        );
        tracing::info!(
            circuit = %self.name,
            recovery_timeout_secs = inner.current_recovery_timeout.as_secs(),
            "Extended recovery timeout due to rate limit"
        );
    }

    fn maybe_half_open(name: &str, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(last_failure) = inner.last_failure_at
            && last_failure.elapsed() >= inner.current_recovery_timeout
        {
            tracing::info!(circuit = %name, "Circuit breaker transitioning to half-open");
            inner.state = CircuitState::HalfOpen;
            inner.success_count = 0;
        }
    }
}
