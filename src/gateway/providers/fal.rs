//! fal.ai provider implementation
//!
//! fal.ai exposes one synchronous HTTP endpoint per model under
//! `https://fal.run/fal-ai/<endpoint>`. Every call posts a JSON body with the
//! prompt and generation parameters and gets back a JSON document whose shape
//! depends on the model family (image list, single image, or video).

use crate::config::{ProviderConfig, ProviderDefaults, ProviderSettings};
use crate::error::GatewayError;
use crate::gateway::providers::retry::{retry_with_backoff, RetryConfig};
use crate::gateway::rate_limiter::RateLimiter;
use crate::gateway::traits::{
    GenerationOptions, HealthStatus, MediaProvider, ModelRequest, ProviderType, ResponseMetadata,
    UnifiedResponse,
};
use crate::utils::logging::{obscure_credential, redact_for_log};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// Default fal.ai base URL
pub const FAL_BASE_URL: &str = "https://fal.run/fal-ai";

/// Backend defaults merged under caller settings at construction
pub const FAL_DEFAULTS: ProviderDefaults = ProviderDefaults {
    timeout_ms: 120_000,
    max_retries: 3,
    rate_limit_per_minute: 60,
    base_url: FAL_BASE_URL,
    retry_base_delay_ms: 1000,
};

/// Supported models, in catalogue order
const SUPPORTED_MODELS: &[&str] = &[
    "flux-pro",
    "flux-dev",
    "flux-schnell",
    "stable-diffusion-xl",
    "stable-diffusion-v3-medium",
    "aura-flow",
    "kling-video",
    "luma-dream-machine",
    "minimax-video",
    "stable-video",
];

const VIDEO_MODELS: &[&str] = &["kling-video", "luma-dream-machine", "minimax-video", "stable-video"];

/// Models whose endpoint path differs from their name
const ENDPOINTS: &[(&str, &str)] = &[
    ("flux-dev", "flux/dev"),
    ("flux-schnell", "flux/schnell"),
    ("stable-diffusion-xl", "fast-sdxl"),
    ("kling-video", "kling-video/v1/standard/text-to-video"),
    ("minimax-video", "minimax-video/text-to-video"),
];

const HEALTH_CHECK_ENDPOINT: &str = "fast-sdxl";

const DEFAULT_STEPS: u32 = 20;
const DEFAULT_GUIDANCE_SCALE: f64 = 7.5;
const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
const DEFAULT_VIDEO_DURATION_SECS: u32 = 5;
const VIDEO_FPS: u32 = 24;
const VIDEO_ASPECT_RATIO: &str = "16:9";

/// Response fields echoed into [`ResponseMetadata::extra`]
const ECHOED_FIELDS: &[&str] = &["seed", "num_inference_steps", "guidance_scale"];

/// fal.ai adapter
#[derive(Debug)]
pub struct FalProvider {
    config: ProviderConfig,
    client: reqwest::Client,
    rate_limiter: Arc<RateLimiter>,
    retry: RetryConfig,
}

impl FalProvider {
    /// Create a new fal.ai adapter
    ///
    /// Registers the configured budget with `rate_limiter`. Fails with
    /// [`GatewayError::Configuration`] when no API key is supplied.
    pub fn new(settings: ProviderSettings, rate_limiter: Arc<RateLimiter>) -> Result<Self, GatewayError> {
        let config = settings.resolve(ProviderType::Fal, &FAL_DEFAULTS)?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GatewayError::configuration(format!("Failed to build HTTP client: {}", e)))?;

        rate_limiter.set_limit(ProviderType::Fal, config.rate_limit_per_minute);
        let retry = config.retry_config();

        tracing::info!(
            "🔧 fal.ai provider configured: base_url={}, api_key={}, timeout={}ms, attempts={}, rpm={}",
            config.base_url,
            obscure_credential(&config.api_key),
            config.timeout_ms,
            retry.effective_attempts(),
            config.rate_limit_per_minute
        );

        Ok(Self {
            config,
            client,
            rate_limiter,
            retry,
        })
    }

    /// Resolved configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn call_inner(
        &self,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<UnifiedResponse, GatewayError> {
        if !self.rate_limiter.check_limit(ProviderType::Fal) {
            return Err(GatewayError::rate_limit(
                ProviderType::Fal,
                None,
                format!(
                    "local budget of {} requests per minute exhausted",
                    self.rate_limiter.limit_for(ProviderType::Fal)
                ),
            ));
        }

        if !SUPPORTED_MODELS.contains(&request.model.as_str()) {
            return Err(GatewayError::validation(
                ProviderType::Fal,
                format!(
                    "Unsupported model '{}'. Supported models: {}",
                    request.model,
                    SUPPORTED_MODELS.join(", ")
                ),
            ));
        }

        if request.prompt.trim().is_empty() {
            return Err(GatewayError::validation(ProviderType::Fal, "prompt cannot be empty"));
        }

        let body = build_request_body(&request.model, &request.prompt, request.options.as_ref())?;
        let url = self.endpoint_url(resolve_endpoint(&request.model));

        tracing::info!("🚀 fal.ai call {} -> {}", request.model, url);
        tracing::debug!("📦 fal.ai request body: {}", body);

        let start = Instant::now();
        let url = url.as_str();
        let body = &body;
        let raw = retry_with_backoff(ProviderType::Fal, &self.retry, &cancel, move |attempt| {
            self.send_attempt(attempt, url, body)
        })
        .await?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let response = parse_response(&request.model, raw, execution_time_ms);
        tracing::info!(
            "✅ fal.ai call {} completed in {}ms with {} media url(s)",
            request.model,
            execution_time_ms,
            response.urls().len()
        );
        Ok(response)
    }

    /// One physical POST. Records with the limiter before dispatch.
    async fn send_attempt(&self, attempt: u32, url: &str, body: &Value) -> Result<Value, GatewayError> {
        self.rate_limiter.record_request(ProviderType::Fal);
        tracing::debug!("📡 fal.ai attempt {} POST {}", attempt + 1, url);

        let response = self
            .authorized_post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.map_err(|e| self.transport_error(e))?;

        if status.is_success() {
            return serde_json::from_str(&text).map_err(|e| {
                GatewayError::provider(
                    ProviderType::Fal,
                    Some(status.as_u16()),
                    format!("Failed to parse fal.ai response: {}", e),
                    Some(text.clone()),
                )
            });
        }

        let message = extract_error_message(&text);
        tracing::debug!(
            "fal.ai returned {}: {}",
            status,
            redact_for_log(&text, &self.config.api_key)
        );

        match status {
            StatusCode::UNAUTHORIZED => Err(GatewayError::authentication(ProviderType::Fal, message)),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(GatewayError::rate_limit(ProviderType::Fal, retry_after, message))
            }
            _ => Err(GatewayError::provider(
                ProviderType::Fal,
                Some(status.as_u16()),
                message,
                Some(text),
            )),
        }
    }

    fn authorized_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header(AUTHORIZATION, format!("Key {}", self.config.api_key))
            .header(CONTENT_TYPE, "application/json")
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint)
    }

    fn transport_error(&self, error: reqwest::Error) -> GatewayError {
        let message = if error.is_timeout() {
            format!("request timed out after {}ms", self.config.timeout_ms)
        } else {
            format!("request failed: {}", error)
        };
        GatewayError::provider(ProviderType::Fal, None, message, None)
    }
}

#[async_trait]
impl MediaProvider for FalProvider {
    async fn call_model(&self, request: &ModelRequest) -> Result<UnifiedResponse, GatewayError> {
        self.call_model_with_cancellation(request, CancellationToken::new())
            .await
    }

    async fn call_model_with_cancellation(
        &self,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<UnifiedResponse, GatewayError> {
        let call_id = Uuid::new_v4();
        let span = tracing::info_span!("fal_call", %call_id, model = %request.model);
        self.call_inner(request, cancel).instrument(span).await
    }

    async fn health_check(&self) -> HealthStatus {
        let start = Instant::now();
        let body = json!({
            "prompt": "health check",
            "num_inference_steps": 1,
            "image_size": "256x256",
            "width": 256,
            "height": 256,
            "num_images": 1,
        });

        match self
            .authorized_post(&self.endpoint_url(HEALTH_CHECK_ENDPOINT))
            .json(&body)
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                tracing::debug!(
                    "fal.ai health probe answered {} in {}ms",
                    response.status(),
                    latency_ms
                );
                HealthStatus::healthy(ProviderType::Fal, latency_ms)
            }
            Err(e) => {
                tracing::warn!("⚠️ fal.ai health probe failed: {}", e);
                HealthStatus::unhealthy(ProviderType::Fal, e.to_string())
            }
        }
    }

    fn supported_models(&self) -> Vec<&'static str> {
        SUPPORTED_MODELS.to_vec()
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Fal
    }
}

/// Whether `model` produces video
pub fn is_video_model(model: &str) -> bool {
    VIDEO_MODELS.contains(&model)
}

/// Endpoint path for `model`; models without a mapping use their own name
pub fn resolve_endpoint(model: &str) -> &str {
    ENDPOINTS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, endpoint)| *endpoint)
        .unwrap_or(model)
}

/// Parse a `"WIDTHxHEIGHT"` size string
pub fn parse_image_size(size: &str) -> Option<(u32, u32)> {
    let (width, height) = size.trim().split_once(['x', 'X'])?;
    let width: u32 = width.trim().parse().ok()?;
    let height: u32 = height.trim().parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Build the JSON body for `model`
///
/// Video models get duration/fps/aspect ratio, every other model gets an image
/// size with parsed dimensions. Keys in `options.extra` are added last and
/// never overwrite fields set here.
pub fn build_request_body(
    model: &str,
    prompt: &str,
    options: Option<&GenerationOptions>,
) -> Result<Value, GatewayError> {
    let defaults = GenerationOptions::default();
    let options = options.unwrap_or(&defaults);

    let mut body = Map::new();
    body.insert("prompt".to_string(), json!(prompt));
    if let Some(seed) = options.seed {
        body.insert("seed".to_string(), json!(seed));
    }
    body.insert(
        "num_inference_steps".to_string(),
        json!(options.steps.unwrap_or(DEFAULT_STEPS)),
    );
    body.insert(
        "guidance_scale".to_string(),
        json!(options.guidance_scale.unwrap_or(DEFAULT_GUIDANCE_SCALE)),
    );
    if let Some(negative_prompt) = options.negative_prompt.as_deref().filter(|p| !p.is_empty()) {
        body.insert("negative_prompt".to_string(), json!(negative_prompt));
    }

    if is_video_model(model) {
        body.insert(
            "duration".to_string(),
            json!(options.video_length.unwrap_or(DEFAULT_VIDEO_DURATION_SECS)),
        );
        body.insert("fps".to_string(), json!(VIDEO_FPS));
        body.insert("aspect_ratio".to_string(), json!(VIDEO_ASPECT_RATIO));
    } else {
        let size = options.image_size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE);
        let (width, height) = parse_image_size(size).ok_or_else(|| {
            GatewayError::validation(
                ProviderType::Fal,
                format!("Invalid image_size '{}', expected WIDTHxHEIGHT", size),
            )
        })?;
        body.insert("image_size".to_string(), json!(size));
        body.insert("width".to_string(), json!(width));
        body.insert("height".to_string(), json!(height));
        body.insert("num_images".to_string(), json!(1));
    }

    for (key, value) in &options.extra {
        body.entry(key.clone()).or_insert_with(|| value.clone());
    }

    Ok(Value::Object(body))
}

/// Normalize a fal.ai reply into a [`UnifiedResponse`]
pub fn parse_response(model: &str, raw: Value, execution_time_ms: u64) -> UnifiedResponse {
    let images = extract_media_urls(&raw);

    let text = ["description", "caption"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    let request_id = ["request_id", "id"]
        .iter()
        .find_map(|key| match raw.get(*key) {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        });

    let extra: HashMap<String, Value> = ECHOED_FIELDS
        .iter()
        .filter_map(|key| raw.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect();

    UnifiedResponse {
        text,
        images: (!images.is_empty()).then_some(images),
        metadata: ResponseMetadata {
            model: model.to_string(),
            provider: ProviderType::Fal,
            execution_time_ms,
            request_id,
            extra,
            original_response: raw,
        },
    }
}

/// Media URLs from the first populated of `images`, `image`, `video`, `url`
fn extract_media_urls(raw: &Value) -> Vec<String> {
    if let Some(Value::Array(items)) = raw.get("images") {
        let urls: Vec<String> = items.iter().filter_map(media_url).collect();
        if !urls.is_empty() {
            return urls;
        }
    }

    ["image", "video", "url"]
        .iter()
        .find_map(|key| raw.get(*key).and_then(media_url))
        .into_iter()
        .collect()
}

fn media_url(value: &Value) -> Option<String> {
    match value {
        Value::String(url) => Some(url.clone()),
        Value::Object(map) => map.get("url").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

/// Best-effort message from an error body: `detail` or `error`, else the raw text
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            ["detail", "error"]
                .iter()
                .find_map(|key| value.get(*key).cloned())
        })
        .map(|field| match field {
            Value::String(message) => message,
            other => other.to_string(),
        })
        .unwrap_or_else(|| body.to_string())
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> FalProvider {
        FalProvider::new(
            ProviderSettings::new().with_api_key("fal-test-key-123"),
            Arc::new(RateLimiter::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_construction_applies_defaults() {
        let limiter = Arc::new(RateLimiter::new());
        let provider = FalProvider::new(
            ProviderSettings::new()
                .with_api_key("key-abcdef")
                .with_rate_limit_per_minute(12),
            Arc::clone(&limiter),
        )
        .unwrap();

        assert_eq!(provider.config().timeout_ms, 120_000);
        assert_eq!(provider.config().max_retries, 3);
        assert_eq!(provider.config().base_url, FAL_BASE_URL);
        assert_eq!(limiter.limit_for(ProviderType::Fal), 12);
    }

    #[test]
    fn test_construction_without_key_fails() {
        let result = FalProvider::new(ProviderSettings::new(), Arc::new(RateLimiter::new()));
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_supported_models_in_catalogue_order() {
        let models = provider().supported_models();
        assert_eq!(models.len(), 10);
        assert_eq!(models.first(), Some(&"flux-pro"));
        assert_eq!(models.last(), Some(&"stable-video"));
        assert!(models.iter().filter(|m| is_video_model(m)).count() == 4);
    }

    #[test]
    fn test_endpoint_resolution() {
        assert_eq!(resolve_endpoint("flux-dev"), "flux/dev");
        assert_eq!(resolve_endpoint("stable-diffusion-xl"), "fast-sdxl");
        assert_eq!(resolve_endpoint("kling-video"), "kling-video/v1/standard/text-to-video");
        assert_eq!(resolve_endpoint("flux-pro"), "flux-pro");
        // Resolving twice yields the same endpoint
        for model in SUPPORTED_MODELS {
            assert_eq!(resolve_endpoint(model), resolve_endpoint(model));
        }
    }

    #[test]
    fn test_parse_image_size() {
        assert_eq!(parse_image_size("512x512"), Some((512, 512)));
        assert_eq!(parse_image_size("1920X1080"), Some((1920, 1080)));
        assert_eq!(parse_image_size("512"), None);
        assert_eq!(parse_image_size("0x512"), None);
        assert_eq!(parse_image_size("widexhigh"), None);
    }

    #[test]
    fn test_image_body_defaults() {
        let body = build_request_body("flux-dev", "a lighthouse", None).unwrap();
        assert_eq!(
            body,
            json!({
                "prompt": "a lighthouse",
                "num_inference_steps": 20,
                "guidance_scale": 7.5,
                "image_size": "1024x1024",
                "width": 1024,
                "height": 1024,
                "num_images": 1
            })
        );
    }

    #[test]
    fn test_image_body_with_options() {
        let options = GenerationOptions::new()
            .with_seed(42)
            .with_steps(30)
            .with_negative_prompt("blurry")
            .with_image_size("512x512")
            .with_extra("enable_safety_checker", json!(false))
            .with_extra("width", json!(9999));

        let body = build_request_body("flux-pro", "a cat", Some(&options)).unwrap();
        assert_eq!(body["seed"], json!(42));
        assert_eq!(body["num_inference_steps"], json!(30));
        assert_eq!(body["negative_prompt"], json!("blurry"));
        assert_eq!(body["width"], json!(512));
        assert_eq!(body["height"], json!(512));
        assert_eq!(body["enable_safety_checker"], json!(false));
        assert!(body.get("duration").is_none());
    }

    #[test]
    fn test_video_body() {
        let options = GenerationOptions::new().with_video_length(8).with_image_size("not-a-size");
        let body = build_request_body("kling-video", "waves", Some(&options)).unwrap();

        assert_eq!(body["duration"], json!(8));
        assert_eq!(body["fps"], json!(24));
        assert_eq!(body["aspect_ratio"], json!("16:9"));
        assert!(body.get("image_size").is_none());
        assert!(body.get("num_images").is_none());
        assert!(body.get("seed").is_none());
    }

    #[test]
    fn test_malformed_size_is_validation_error() {
        let options = GenerationOptions::new().with_image_size("huge");
        let result = build_request_body("flux-dev", "x", Some(&options));
        assert!(matches!(result, Err(GatewayError::Validation { .. })));
    }

    #[test]
    fn test_parse_images_list_of_objects() {
        let raw = json!({
            "images": [{"url": "a"}, {"url": "b"}],
            "seed": 7,
            "request_id": "req-1"
        });
        let response = parse_response("flux-dev", raw.clone(), 120);

        assert_eq!(response.images, Some(vec!["a".to_string(), "b".to_string()]));
        assert_eq!(response.metadata.request_id.as_deref(), Some("req-1"));
        assert_eq!(response.metadata.extra.get("seed"), Some(&json!(7)));
        assert_eq!(response.metadata.execution_time_ms, 120);
        assert_eq!(response.metadata.original_response, raw);
    }

    #[test]
    fn test_parse_alternate_shapes() {
        let video = parse_response("kling-video", json!({"video": {"url": "v.mp4"}, "id": 99}), 1);
        assert_eq!(video.urls(), ["v.mp4".to_string()]);
        assert_eq!(video.metadata.request_id.as_deref(), Some("99"));

        let image = parse_response("flux-pro", json!({"image": "i.png", "caption": "a dog"}), 1);
        assert_eq!(image.urls(), ["i.png".to_string()]);
        assert_eq!(image.text.as_deref(), Some("a dog"));

        let bare = parse_response("flux-pro", json!({"url": "u.png"}), 1);
        assert_eq!(bare.urls(), ["u.png".to_string()]);

        let strings = parse_response("flux-pro", json!({"images": ["x", "y"]}), 1);
        assert_eq!(strings.urls().len(), 2);
    }

    #[test]
    fn test_parse_without_media_has_no_images() {
        let response = parse_response("flux-pro", json!({"images": [], "description": "nothing"}), 1);
        assert_eq!(response.images, None);
        assert_eq!(response.text.as_deref(), Some("nothing"));
    }

    #[test]
    fn test_extract_error_message() {
        assert_eq!(extract_error_message(r#"{"detail": "bad prompt"}"#), "bad prompt");
        assert_eq!(
            extract_error_message(r#"{"error": {"code": 7}}"#),
            r#"{"code":7}"#
        );
        assert_eq!(extract_error_message("gateway timeout"), "gateway timeout");
    }

    #[test]
    fn test_parse_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after(&headers), None);
        headers.insert(RETRY_AFTER, "30".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(30));
    }

    #[tokio::test]
    async fn test_unsupported_model_fails_before_network() {
        let provider = provider();
        let result = provider
            .call_model(&ModelRequest::new("dall-e-3", "anything"))
            .await;

        assert!(matches!(result, Err(GatewayError::Validation { .. })));
        assert_eq!(
            provider.rate_limiter.remaining(ProviderType::Fal),
            FAL_DEFAULTS.rate_limit_per_minute
        );
    }

    #[tokio::test]
    async fn test_denied_by_limiter_without_network() {
        let limiter = Arc::new(RateLimiter::new());
        let provider = FalProvider::new(
            ProviderSettings::new()
                .with_api_key("fal-test-key-123")
                .with_rate_limit_per_minute(1)
                .with_base_url("http://127.0.0.1:1"),
            Arc::clone(&limiter),
        )
        .unwrap();
        limiter.record_request(ProviderType::Fal);

        let result = provider.call_model(&ModelRequest::new("flux-dev", "cat")).await;
        match result {
            Err(GatewayError::RateLimit { provider, .. }) => assert_eq!(provider, ProviderType::Fal),
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }
}
