//! Retry utilities for provider-level resilience
//!
//! Adapters wrap each physical request in [`retry_with_backoff`]: a bounded
//! loop that retries transient failures with exponential backoff, stops at once
//! on errors retrying cannot fix, and wraps the last failure in
//! [`GatewayError::ExhaustedRetries`] when the budget runs out.

use crate::error::GatewayError;
use crate::gateway::traits::ProviderType;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Configuration for retry behavior with exponential backoff
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first. Zero behaves as one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles the delay each time)
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// `max_attempts` attempts with `2^attempt` second delays
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// A single attempt, no backoff
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Attempts the loop will actually make
    pub fn effective_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

/// Decision about whether to retry after an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation after waiting
    Retry,
    /// Fail immediately without retrying
    FailImmediately,
}

/// Delay inserted after zero-indexed `attempt` fails
///
/// With the default config this is exactly `2^attempt` seconds.
pub fn calculate_backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = config.initial_delay.as_millis() as f64;
    let multiplier = config.backoff_multiplier.powi(attempt as i32);
    Duration::from_millis((base_delay * multiplier) as u64)
}

/// Determine if a GatewayError should trigger another attempt
pub fn should_retry_gateway_error(error: &GatewayError) -> RetryDecision {
    match error {
        // Non-success responses, timeouts, and transport failures
        GatewayError::Provider { .. } => RetryDecision::Retry,

        // Retrying cannot help and would burn quota
        GatewayError::Authentication { .. } => RetryDecision::FailImmediately,
        GatewayError::RateLimit { .. } => RetryDecision::FailImmediately,

        GatewayError::Validation { .. }
        | GatewayError::Configuration { .. }
        | GatewayError::ExhaustedRetries { .. }
        | GatewayError::ProviderNotRegistered { .. }
        | GatewayError::Cancelled { .. } => RetryDecision::FailImmediately,
    }
}

/// Execute an operation with retry logic and exponential backoff
///
/// `operation` receives the zero-indexed attempt number. Cancelling `cancel`
/// aborts the in-flight attempt or backoff sleep and returns
/// [`GatewayError::Cancelled`].
pub async fn retry_with_backoff<F, Fut, T>(
    provider: ProviderType,
    config: &RetryConfig,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, GatewayError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let attempts = config.effective_attempts();
    let mut last_error: Option<GatewayError> = None;

    for attempt in 0..attempts {
        if cancel.is_cancelled() {
            return Err(GatewayError::Cancelled { provider });
        }

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled { provider }),
            outcome = operation(attempt) => outcome,
        };

        match outcome {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!("✅ {} call succeeded on attempt {}/{}", provider, attempt + 1, attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if should_retry_gateway_error(&error) == RetryDecision::FailImmediately {
                    tracing::warn!(
                        "❌ {} call failed with non-retryable error on attempt {}: {}",
                        provider,
                        attempt + 1,
                        error
                    );
                    return Err(error);
                }

                let is_last = attempt + 1 == attempts;
                if is_last {
                    tracing::error!("❌ {} call failed after {} attempts: {}", provider, attempts, error);
                    last_error = Some(error);
                    break;
                }

                let delay = calculate_backoff_delay(attempt, config);
                tracing::warn!(
                    "🔄 {} attempt {}/{} failed ({}), retrying in {} ms",
                    provider,
                    attempt + 1,
                    attempts,
                    error,
                    delay.as_millis()
                );
                last_error = Some(error);

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(GatewayError::Cancelled { provider }),
                    _ = sleep(delay) => {}
                }
            }
        }
    }

    match last_error {
        Some(error) => Err(GatewayError::exhausted(provider, attempts, error)),
        None => Err(GatewayError::configuration(format!(
            "retry loop for {} finished without making an attempt",
            provider
        ))),
    }
}
