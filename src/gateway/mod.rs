//! Provider abstraction layer for generative media backends.
//!
//! This module is the core of the crate:
//!
//! - [`MediaProvider`]: the trait every backend adapter implements
//! - [`ProviderRegistry`]: holds one adapter per [`ProviderType`] and routes calls
//! - [`RateLimiter`]: per-provider sliding-window admission control shared by adapters
//! - [`providers`]: concrete adapters ([`FalProvider`]) and the shared retry loop
//!
//! # Example
//!
//! ```rust,no_run
//! use mediagate::config::ProviderSettings;
//! use mediagate::gateway::{
//!     FalProvider, GenerationOptions, ModelRequest, ProviderRegistry, ProviderType, RateLimiter,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> mediagate::Result<()> {
//! let limiter = Arc::new(RateLimiter::new());
//! let fal = FalProvider::new(ProviderSettings::new().with_api_key("fal-key"), limiter)?;
//!
//! let registry = ProviderRegistry::new();
//! registry.register(Arc::new(fal)).await;
//!
//! let request = ModelRequest::new("flux-dev", "a lighthouse at dusk")
//!     .with_options(GenerationOptions::new().with_image_size("512x512"));
//! let response = registry.call(ProviderType::Fal, &request).await?;
//! println!("{:?}", response.urls());
//! # Ok(())
//! # }
//! ```

pub mod providers;
pub mod rate_limiter;
pub mod registry;
pub mod traits;

pub use providers::FalProvider;
pub use rate_limiter::RateLimiter;
pub use registry::ProviderRegistry;
pub use traits::{
    GenerationOptions, HealthStatus, MediaProvider, ModelRequest, ProviderType, ResponseMetadata,
    UnifiedResponse,
};
