//! Error taxonomy shared by every adapter and caller of the gateway.
//!
//! Every failure that reaches a caller is one of the [`GatewayError`] variants.
//! The variants are split by what a caller can do about them:
//!
//! - **Validation / Configuration** - the request or the adapter setup is wrong; fix the input
//! - **Authentication** - the backend rejected the credential; never retried
//! - **RateLimit** - local admission control or backend throttling; re-schedule later
//! - **Provider** - any other backend failure; retried by the adapter with backoff
//! - **ExhaustedRetries** - the retry budget ran out; wraps the last [`GatewayError::Provider`]
//!
//! # Example
//!
//! ```rust
//! use mediagate::error::GatewayError;
//! use mediagate::gateway::ProviderType;
//!
//! let error = GatewayError::provider(ProviderType::Fal, Some(503), "service unavailable", None);
//! assert!(error.is_retryable());
//! assert_eq!(error.status(), Some(503));
//!
//! let error = GatewayError::authentication(ProviderType::Fal, "invalid key");
//! assert!(!error.is_retryable());
//! assert!(error.is_auth_error());
//! ```

use crate::gateway::ProviderType;
use thiserror::Error;

/// Main error type for the gateway
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The request is malformed or names a model the adapter does not serve
    #[error("Validation error ({provider}): {message}")]
    Validation {
        provider: ProviderType,
        message: String,
    },

    /// The backend rejected the credential (HTTP 401)
    #[error("Authentication failed for provider {provider}: {message}")]
    Authentication {
        provider: ProviderType,
        message: String,
    },

    /// Local admission control denied the call, or the backend answered HTTP 429
    #[error("Rate limit exceeded for provider {provider}: {message}")]
    RateLimit {
        provider: ProviderType,
        retry_after_secs: Option<u64>,
        message: String,
    },

    /// Any other failed attempt: non-success status, transport failure, timeout,
    /// or a success body that could not be parsed. `status` is `None` when no
    /// HTTP response was received.
    #[error("Provider error ({provider}, status {status:?}): {message}")]
    Provider {
        provider: ProviderType,
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    /// The retry budget was consumed without a successful attempt
    #[error("Provider {provider} failed after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        provider: ProviderType,
        attempts: u32,
        #[source]
        last_error: Box<GatewayError>,
    },

    /// Adapter construction or gateway configuration is invalid
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No adapter is registered for the requested provider
    #[error("No adapter registered for provider {provider}")]
    ProviderNotRegistered { provider: ProviderType },

    /// The caller cancelled the call before it completed
    #[error("Call to provider {provider} was cancelled")]
    Cancelled { provider: ProviderType },
}

impl GatewayError {
    /// Create a Validation error
    pub fn validation(provider: ProviderType, message: impl Into<String>) -> Self {
        Self::Validation {
            provider,
            message: message.into(),
        }
    }

    /// Create an Authentication error
    pub fn authentication(provider: ProviderType, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider,
            message: message.into(),
        }
    }

    /// Create a RateLimit error
    pub fn rate_limit(
        provider: ProviderType,
        retry_after_secs: Option<u64>,
        message: impl Into<String>,
    ) -> Self {
        Self::RateLimit {
            provider,
            retry_after_secs,
            message: message.into(),
        }
    }

    /// Create a Provider error
    pub fn provider(
        provider: ProviderType,
        status: Option<u16>,
        message: impl Into<String>,
        body: Option<String>,
    ) -> Self {
        Self::Provider {
            provider,
            status,
            message: message.into(),
            body,
        }
    }

    /// Wrap the last attempt's error once the retry budget is gone
    pub fn exhausted(provider: ProviderType, attempts: u32, last_error: GatewayError) -> Self {
        Self::ExhaustedRetries {
            provider,
            attempts,
            last_error: Box::new(last_error),
        }
    }

    /// Create a Configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Provider the error originated from, if any
    pub fn provider_type(&self) -> Option<ProviderType> {
        match self {
            Self::Validation { provider, .. }
            | Self::Authentication { provider, .. }
            | Self::RateLimit { provider, .. }
            | Self::Provider { provider, .. }
            | Self::ExhaustedRetries { provider, .. }
            | Self::ProviderNotRegistered { provider }
            | Self::Cancelled { provider } => Some(*provider),
            Self::Configuration { .. } => None,
        }
    }

    /// Whether the adapter's retry loop may try again after this error
    ///
    /// Only [`GatewayError::Provider`] is retryable. Rate limits are left to the
    /// caller to re-schedule.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    /// Whether the credential was rejected
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Whether the caller supplied something invalid
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Configuration { .. })
    }

    /// Backend-suggested wait before re-scheduling, when known
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimit {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }

    /// HTTP status of the failing response.
    ///
    /// For [`GatewayError::ExhaustedRetries`] this is the status of the last attempt.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Provider { status, .. } => *status,
            Self::Authentication { .. } => Some(401),
            Self::RateLimit { .. } => None,
            Self::ExhaustedRetries { last_error, .. } => last_error.status(),
            _ => None,
        }
    }

    /// The error that ended the last attempt, unwrapping retry exhaustion
    pub fn root_cause(&self) -> &GatewayError {
        match self {
            Self::ExhaustedRetries { last_error, .. } => last_error.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_only_provider_errors_are_retryable() {
        let provider = ProviderType::Fal;
        assert!(GatewayError::provider(provider, Some(500), "boom", None).is_retryable());
        assert!(GatewayError::provider(provider, None, "timed out", None).is_retryable());
        assert!(!GatewayError::validation(provider, "bad model").is_retryable());
        assert!(!GatewayError::authentication(provider, "bad key").is_retryable());
        assert!(!GatewayError::rate_limit(provider, Some(3), "slow down").is_retryable());
        assert!(!GatewayError::configuration("missing key").is_retryable());
    }

    #[test]
    fn test_exhausted_exposes_last_error() {
        let last = GatewayError::provider(ProviderType::Fal, Some(502), "bad gateway", None);
        let error = GatewayError::exhausted(ProviderType::Fal, 3, last);

        assert_eq!(error.status(), Some(502));
        assert!(matches!(
            error.root_cause(),
            GatewayError::Provider {
                status: Some(502),
                ..
            }
        ));
        let source = error.source().map(|s| s.to_string()).unwrap_or_default();
        assert!(source.contains("bad gateway"));
        assert!(error.to_string().contains("3 attempts"));
    }

    #[test]
    fn test_provider_type_and_retry_after() {
        let error = GatewayError::rate_limit(ProviderType::Replicate, Some(12), "429");
        assert_eq!(error.provider_type(), Some(ProviderType::Replicate));
        assert_eq!(error.retry_after_secs(), Some(12));

        let error = GatewayError::configuration("no key");
        assert_eq!(error.provider_type(), None);
        assert!(error.is_user_error());
    }
}
