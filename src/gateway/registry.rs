//! Provider registry: one adapter per backend, one call surface for callers.
//!
//! The registry only routes. Backend-specific behaviour (rate limiting,
//! retries, request formatting) lives in the adapters it holds.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::providers::FalProvider;
use crate::gateway::rate_limiter::RateLimiter;
use crate::gateway::traits::{MediaProvider, ModelRequest, ProviderType, UnifiedResponse};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Registry of configured adapters keyed by [`ProviderType`]
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<ProviderType, Arc<dyn MediaProvider>>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every adapter whose section is present in `config`
    ///
    /// All adapters share `rate_limiter`.
    pub async fn from_config(
        config: &GatewayConfig,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, GatewayError> {
        config.validate()?;
        let registry = Self::new();

        if let Some(settings) = &config.fal {
            let provider = FalProvider::new(settings.clone(), Arc::clone(&rate_limiter))?;
            registry.register(Arc::new(provider)).await;
        }

        tracing::info!(
            "Provider registry ready with {} provider(s)",
            registry.registered_providers().await.len()
        );
        Ok(registry)
    }

    /// Register an adapter, replacing any previous adapter for its provider
    pub async fn register(&self, provider: Arc<dyn MediaProvider>) {
        let provider_type = provider.provider_type();
        let mut providers = self.providers.write().await;
        if providers.insert(provider_type, provider).is_some() {
            tracing::debug!("Replaced adapter for provider {}", provider_type);
        } else {
            tracing::debug!("Registered adapter for provider {}", provider_type);
        }
    }

    /// Adapter for `provider`
    pub async fn get(&self, provider: ProviderType) -> Result<Arc<dyn MediaProvider>, GatewayError> {
        self.providers
            .read()
            .await
            .get(&provider)
            .cloned()
            .ok_or(GatewayError::ProviderNotRegistered { provider })
    }

    /// Route a generation request to `provider`
    pub async fn call(
        &self,
        provider: ProviderType,
        request: &ModelRequest,
    ) -> Result<UnifiedResponse, GatewayError> {
        let adapter = self.get(provider).await?;
        adapter.call_model(request).await
    }

    /// Route a cancellable generation request to `provider`
    pub async fn call_with_cancellation(
        &self,
        provider: ProviderType,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<UnifiedResponse, GatewayError> {
        let adapter = self.get(provider).await?;
        adapter.call_model_with_cancellation(request, cancel).await
    }

    /// Models served by `provider`
    pub async fn list_supported_models(
        &self,
        provider: ProviderType,
    ) -> Result<Vec<&'static str>, GatewayError> {
        Ok(self.get(provider).await?.supported_models())
    }

    /// Probe `provider`
    pub async fn is_healthy(&self, provider: ProviderType) -> Result<bool, GatewayError> {
        Ok(self.get(provider).await?.is_healthy().await)
    }

    /// Registered providers, sorted
    pub async fn registered_providers(&self) -> Vec<ProviderType> {
        let mut providers: Vec<ProviderType> = self.providers.read().await.keys().copied().collect();
        providers.sort();
        providers
    }

    pub async fn is_registered(&self, provider: ProviderType) -> bool {
        self.providers.read().await.contains_key(&provider)
    }

    /// Snapshot of the registered adapters, sorted by provider
    pub async fn adapters(&self) -> Vec<Arc<dyn MediaProvider>> {
        let providers = self.providers.read().await;
        let mut adapters: Vec<_> = providers.values().cloned().collect();
        adapters.sort_by_key(|adapter| adapter.provider_type());
        adapters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::gateway::traits::{HealthStatus, ResponseMetadata};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Adapter that answers without touching the network
    #[derive(Debug)]
    struct StubProvider {
        provider: ProviderType,
        healthy: bool,
        delay: Duration,
        calls: AtomicU32,
    }

    impl StubProvider {
        fn new(provider: ProviderType) -> Self {
            Self {
                provider,
                healthy: true,
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaProvider for StubProvider {
        async fn call_model(&self, request: &ModelRequest) -> Result<UnifiedResponse, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(UnifiedResponse {
                text: Some(request.prompt.clone()),
                images: Some(vec![format!("https://stub/{}", request.model)]),
                metadata: ResponseMetadata {
                    model: request.model.clone(),
                    provider: self.provider,
                    execution_time_ms: 0,
                    request_id: None,
                    extra: HashMap::new(),
                    original_response: serde_json::Value::Null,
                },
            })
        }

        async fn health_check(&self) -> HealthStatus {
            if self.healthy {
                HealthStatus::healthy(self.provider, 1)
            } else {
                HealthStatus::unhealthy(self.provider, "stub is down")
            }
        }

        fn supported_models(&self) -> Vec<&'static str> {
            vec!["stub-image", "stub-video"]
        }

        fn provider_type(&self) -> ProviderType {
            self.provider
        }
    }

    #[tokio::test]
    async fn test_routes_to_registered_adapter() {
        let registry = ProviderRegistry::new();
        let stub = Arc::new(StubProvider::new(ProviderType::Replicate));
        registry.register(stub.clone()).await;

        let response = registry
            .call(ProviderType::Replicate, &ModelRequest::new("stub-image", "hello"))
            .await
            .unwrap();

        assert_eq!(response.urls(), ["https://stub/stub-image".to_string()]);
        assert_eq!(response.metadata.provider, ProviderType::Replicate);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_an_error() {
        let registry = ProviderRegistry::new();
        let request = ModelRequest::new("flux-dev", "x");

        assert!(matches!(
            registry.call(ProviderType::Fal, &request).await,
            Err(GatewayError::ProviderNotRegistered {
                provider: ProviderType::Fal
            })
        ));
        assert!(registry.list_supported_models(ProviderType::Fal).await.is_err());
        assert!(registry.is_healthy(ProviderType::Fal).await.is_err());
    }

    #[tokio::test]
    async fn test_register_replaces_previous_adapter() {
        let registry = ProviderRegistry::new();
        let first = Arc::new(StubProvider::new(ProviderType::Replicate));
        let second = Arc::new(StubProvider::new(ProviderType::Replicate));
        registry.register(first.clone()).await;
        registry.register(second.clone()).await;

        registry
            .call(ProviderType::Replicate, &ModelRequest::new("stub-image", "x"))
            .await
            .unwrap();

        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.registered_providers().await, vec![ProviderType::Replicate]);
    }

    #[tokio::test]
    async fn test_registered_providers_are_sorted() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(StubProvider::new(ProviderType::StabilityAi))).await;
        registry.register(Arc::new(StubProvider::new(ProviderType::Replicate))).await;

        assert_eq!(
            registry.registered_providers().await,
            vec![ProviderType::Replicate, ProviderType::StabilityAi]
        );
        assert!(registry.is_registered(ProviderType::StabilityAi).await);
        assert!(!registry.is_registered(ProviderType::Fal).await);
        assert_eq!(
            registry.list_supported_models(ProviderType::Replicate).await.unwrap(),
            vec!["stub-image", "stub-video"]
        );
    }

    #[tokio::test]
    async fn test_health_is_delegated() {
        let registry = ProviderRegistry::new();
        let mut down = StubProvider::new(ProviderType::StabilityAi);
        down.healthy = false;
        registry.register(Arc::new(down)).await;
        registry.register(Arc::new(StubProvider::new(ProviderType::Replicate))).await;

        assert!(registry.is_healthy(ProviderType::Replicate).await.unwrap());
        assert!(!registry.is_healthy(ProviderType::StabilityAi).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_cancellation_races_the_call() {
        let registry = ProviderRegistry::new();
        let mut slow = StubProvider::new(ProviderType::Replicate);
        slow.delay = Duration::from_secs(30);
        registry.register(Arc::new(slow)).await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let result = registry
            .call_with_cancellation(
                ProviderType::Replicate,
                &ModelRequest::new("stub-image", "x"),
                cancel,
            )
            .await;
        assert!(matches!(result, Err(GatewayError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_from_config_builds_fal_adapter() {
        let limiter = Arc::new(RateLimiter::new());
        let config = GatewayConfig {
            fal: Some(
                ProviderSettings::new()
                    .with_api_key("fal-key-abcdef")
                    .with_rate_limit_per_minute(5),
            ),
        };

        let registry = ProviderRegistry::from_config(&config, Arc::clone(&limiter))
            .await
            .unwrap();

        assert_eq!(registry.registered_providers().await, vec![ProviderType::Fal]);
        assert_eq!(limiter.limit_for(ProviderType::Fal), 5);
        let models = registry.list_supported_models(ProviderType::Fal).await.unwrap();
        assert!(models.contains(&"flux-dev"));
    }

    #[tokio::test]
    async fn test_from_config_rejects_missing_key() {
        let config = GatewayConfig {
            fal: Some(ProviderSettings::new()),
        };
        let result = ProviderRegistry::from_config(&config, Arc::new(RateLimiter::new())).await;
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_empty_config_builds_empty_registry() {
        let registry = ProviderRegistry::from_config(&GatewayConfig::default(), Arc::new(RateLimiter::new()))
            .await
            .unwrap();
        assert!(registry.registered_providers().await.is_empty());
        assert!(registry.adapters().await.is_empty());
    }
}
