//! Core traits and shared types for the provider abstraction.
//!
//! Every backend implements [`MediaProvider`] and speaks in terms of the types
//! defined here: a [`ModelRequest`] goes in, a [`UnifiedResponse`] comes out.

use crate::error::GatewayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Core provider trait that abstracts away backend-specific implementations
///
/// Adapters own ALL backend details: request formatting, endpoint resolution,
/// retries, response parsing, and authentication. The registry only routes.
#[async_trait]
pub trait MediaProvider: Send + Sync + std::fmt::Debug {
    /// Issue a generation request and normalize the reply
    async fn call_model(&self, request: &ModelRequest) -> Result<UnifiedResponse, GatewayError>;

    /// Like [`MediaProvider::call_model`], but stops early once `cancel` fires
    ///
    /// The default races the whole call against the token. Adapters with a
    /// retry loop override this to check the token between attempts.
    async fn call_model_with_cancellation(
        &self,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<UnifiedResponse, GatewayError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Cancelled { provider: self.provider_type() }),
            result = self.call_model(request) => result,
        }
    }

    /// Lightweight reachability probe
    async fn health_check(&self) -> HealthStatus;

    /// Convenience wrapper over [`MediaProvider::health_check`]
    async fn is_healthy(&self) -> bool {
        self.health_check().await.healthy
    }

    /// Model names this adapter accepts, in catalogue order
    fn supported_models(&self) -> Vec<&'static str>;

    /// Backend this adapter talks to
    fn provider_type(&self) -> ProviderType;
}

/// Generative media backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// fal.ai serverless inference
    Fal,
    /// Replicate
    Replicate,
    /// Stability AI platform API
    StabilityAi,
}

impl ProviderType {
    /// Get string representation of provider type
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Fal => "fal",
            ProviderType::Replicate => "replicate",
            ProviderType::StabilityAi => "stability_ai",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fal" | "fal-ai" | "fal_ai" => Ok(ProviderType::Fal),
            "replicate" => Ok(ProviderType::Replicate),
            "stability_ai" | "stability-ai" | "stability" => Ok(ProviderType::StabilityAi),
            other => Err(GatewayError::configuration(format!(
                "Unknown provider identifier: {}",
                other
            ))),
        }
    }
}

/// A single generation request. Built per call, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Model name from the adapter's catalogue
    pub model: String,
    /// Text prompt
    pub prompt: String,
    /// Optional generation parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<GenerationOptions>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: None,
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Generation parameters shared across backends
///
/// Fields a backend does not understand are ignored by that backend's adapter.
/// `extra` carries anything else; adapters copy those keys into the request body
/// without overwriting fields they set themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Number of inference steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// Output size as `"WIDTHxHEIGHT"`, e.g. `"512x512"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<String>,
    /// Video duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_length: Option<u32>,
    /// Backend-specific parameters
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl GenerationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = Some(steps);
        self
    }

    pub fn with_guidance_scale(mut self, guidance_scale: f64) -> Self {
        self.guidance_scale = Some(guidance_scale);
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn with_image_size(mut self, image_size: impl Into<String>) -> Self {
        self.image_size = Some(image_size.into());
        self
    }

    pub fn with_video_length(mut self, seconds: u32) -> Self {
        self.video_length = Some(seconds);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// Normalized success value returned for every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    /// Textual description or caption, when the backend returns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Media URLs in backend order. Never `Some(vec![])`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<String>>,
    pub metadata: ResponseMetadata,
}

impl UnifiedResponse {
    /// Media URLs, or an empty slice when the reply carried none
    pub fn urls(&self) -> &[String] {
        self.images.as_deref().unwrap_or(&[])
    }
}

/// Diagnostics attached to every [`UnifiedResponse`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub model: String,
    pub provider: ProviderType,
    /// Wall time from the first attempt to the parsed reply
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Adapter-specific fields echoed by the backend (seed, steps, ...)
    #[serde(default, flatten)]
    pub extra: HashMap<String, serde_json::Value>,
    /// The untouched backend reply
    pub original_response: serde_json::Value,
}

/// Health status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub provider: ProviderType,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn healthy(provider: ProviderType, latency_ms: u64) -> Self {
        Self {
            healthy: true,
            provider,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn unhealthy(provider: ProviderType, error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            provider,
            latency_ms: None,
            error: Some(error.into()),
        }
    }
}
