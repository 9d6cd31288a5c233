//! Gateway Configuration Management
//!
//! Configuration comes in two layers:
//!
//! - [`ProviderSettings`]: caller-supplied, every field optional. Loaded from a
//!   config file, the environment, or built in code.
//! - [`ProviderConfig`]: the resolved, validated configuration an adapter owns
//!   for its lifetime. Built by merging settings over the adapter's
//!   [`ProviderDefaults`].
//!
//! [`GatewayConfig`] groups the settings for every provider and supports
//! TOML, YAML, and JSON files plus environment variable overrides.

use crate::error::GatewayError;
use crate::gateway::providers::retry::RetryConfig;
use crate::gateway::ProviderType;
use crate::utils::logging::obscure_credential;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, time::Duration};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable parsing error: {0}")]
    EnvVarParse(String),
    #[error("File parsing error: {0}")]
    FileParse(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for GatewayError {
    fn from(error: ConfigError) -> Self {
        GatewayError::configuration(error.to_string())
    }
}

/// Top-level configuration: one optional section per provider
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GatewayConfig {
    /// fal.ai settings; the adapter is only built when this section is present
    #[serde(default)]
    pub fal: Option<ProviderSettings>,
}

/// Caller-supplied overrides for one provider
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    /// Per-attempt request timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Attempts per call, including the first
    pub max_retries: Option<u32>,
    pub rate_limit_per_minute: Option<u32>,
    /// Override the backend base URL (used for testing and proxies)
    pub base_url: Option<String>,
    /// Backoff unit in milliseconds; attempt `i` waits `unit * 2^i`
    pub retry_base_delay_ms: Option<u64>,
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &self.api_key.as_deref().map(obscure_credential))
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("base_url", &self.base_url)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

impl ProviderSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_rate_limit_per_minute(mut self, rate_limit: u32) -> Self {
        self.rate_limit_per_minute = Some(rate_limit);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_retry_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_base_delay_ms = Some(delay_ms);
        self
    }

    /// Overlay `other` on top of `self`; fields set in `other` win
    pub fn merge(mut self, other: &ProviderSettings) -> Self {
        if other.api_key.is_some() {
            self.api_key = other.api_key.clone();
        }
        if other.timeout_ms.is_some() {
            self.timeout_ms = other.timeout_ms;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.rate_limit_per_minute.is_some() {
            self.rate_limit_per_minute = other.rate_limit_per_minute;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url.clone();
        }
        if other.retry_base_delay_ms.is_some() {
            self.retry_base_delay_ms = other.retry_base_delay_ms;
        }
        self
    }

    /// Merge over `defaults` and validate, producing the adapter's config
    pub fn resolve(
        &self,
        provider: ProviderType,
        defaults: &ProviderDefaults,
    ) -> Result<ProviderConfig, GatewayError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                GatewayError::configuration(format!("API key is required for provider {}", provider))
            })?
            .to_string();

        let config = ProviderConfig {
            provider,
            api_key,
            timeout_ms: self.timeout_ms.unwrap_or(defaults.timeout_ms),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            rate_limit_per_minute: self
                .rate_limit_per_minute
                .unwrap_or(defaults.rate_limit_per_minute),
            base_url: self
                .base_url
                .clone()
                .unwrap_or_else(|| defaults.base_url.to_string()),
            retry_base_delay_ms: self
                .retry_base_delay_ms
                .unwrap_or(defaults.retry_base_delay_ms),
        };
        config.validate()?;
        Ok(config)
    }
}

/// Backend-specific defaults an adapter merges settings over
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderDefaults {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub rate_limit_per_minute: u32,
    pub base_url: &'static str,
    pub retry_base_delay_ms: u64,
}

/// Resolved configuration owned by an adapter. Immutable after construction.
#[derive(Clone, PartialEq)]
pub struct ProviderConfig {
    pub provider: ProviderType,
    pub api_key: String,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub rate_limit_per_minute: u32,
    pub base_url: String,
    pub retry_base_delay_ms: u64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &obscure_credential(&self.api_key))
            .field("timeout_ms", &self.timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("rate_limit_per_minute", &self.rate_limit_per_minute)
            .field("base_url", &self.base_url)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .finish()
    }
}

impl ProviderConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), GatewayError> {
        if self.api_key.trim().is_empty() {
            return Err(GatewayError::configuration(format!(
                "API key is required for provider {}",
                self.provider
            )));
        }
        if self.timeout_ms == 0 {
            return Err(GatewayError::configuration(
                "timeout_ms must be greater than 0",
            ));
        }
        if self.rate_limit_per_minute == 0 {
            return Err(GatewayError::configuration(
                "rate_limit_per_minute must be greater than 0",
            ));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(GatewayError::configuration(
                "retry_base_delay_ms must be greater than 0",
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(GatewayError::configuration("base_url cannot be empty"));
        }
        Ok(())
    }

    /// Per-attempt request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Retry policy derived from `max_retries` and the backoff unit
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.retry_base_delay_ms))
    }
}

impl GatewayConfig {
    /// Load configuration from a file (supports TOML, YAML, JSON)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let extension = path.extension().and_then(|s| s.to_str());

        match extension {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            Some("json") => {
                serde_json::from_str(&content).map_err(|e| ConfigError::FileParse(e.to_string()))
            }
            _ => Err(ConfigError::FileParse(
                "Unsupported file format. Use .toml, .yaml, .yml, or .json".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables
    ///
    /// The fal section is created when `FAL_KEY` or `FAL_API_KEY` is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let fal = fal_settings_from_env()?;
        let has_key = fal.api_key.is_some();
        Ok(Self {
            fal: has_key.then_some(fal),
        })
    }

    /// Merge configuration with environment variable overrides
    pub fn merge_with_env(mut self) -> Result<Self, ConfigError> {
        let env_fal = fal_settings_from_env()?;
        if env_fal != ProviderSettings::default() {
            self.fal = Some(self.fal.unwrap_or_default().merge(&env_fal));
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(fal) = &self.fal {
            validate_settings(ProviderType::Fal, fal)?;
        }
        Ok(())
    }

    /// Providers with a configuration section
    pub fn configured_providers(&self) -> Vec<ProviderType> {
        let mut providers = Vec::new();
        if self.fal.is_some() {
            providers.push(ProviderType::Fal);
        }
        providers
    }
}

fn validate_settings(provider: ProviderType, settings: &ProviderSettings) -> Result<(), ConfigError> {
    match settings.api_key.as_deref().map(str::trim) {
        None | Some("") => {
            return Err(ConfigError::Validation(format!(
                "{}: api_key cannot be empty",
                provider
            )))
        }
        Some(_) => {}
    }
    if settings.timeout_ms == Some(0) {
        return Err(ConfigError::Validation(format!(
            "{}: timeout_ms must be greater than 0",
            provider
        )));
    }
    if settings.rate_limit_per_minute == Some(0) {
        return Err(ConfigError::Validation(format!(
            "{}: rate_limit_per_minute must be greater than 0",
            provider
        )));
    }
    if settings.retry_base_delay_ms == Some(0) {
        return Err(ConfigError::Validation(format!(
            "{}: retry_base_delay_ms must be greater than 0",
            provider
        )));
    }
    Ok(())
}

fn fal_settings_from_env() -> Result<ProviderSettings, ConfigError> {
    let mut settings = ProviderSettings::default();

    if let Ok(key) = env::var("FAL_KEY").or_else(|_| env::var("FAL_API_KEY")) {
        settings.api_key = Some(key);
    }
    if let Ok(base_url) = env::var("MEDIAGATE_FAL_BASE_URL") {
        settings.base_url = Some(base_url);
    }
    settings.timeout_ms = parse_env("MEDIAGATE_FAL_TIMEOUT_MS")?;
    settings.max_retries = parse_env("MEDIAGATE_FAL_MAX_RETRIES")?;
    settings.rate_limit_per_minute = parse_env("MEDIAGATE_FAL_RATE_LIMIT_PER_MINUTE")?;
    settings.retry_base_delay_ms = parse_env("MEDIAGATE_FAL_RETRY_BASE_DELAY_MS")?;

    Ok(settings)
}

fn parse_env<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ConfigError::EnvVarParse(format!("{}: {}", name, e))),
        Err(_) => Ok(None),
    }
}
