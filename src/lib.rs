//! Call generative media backends through one uniform, rate-limited interface.
//!
//! mediagate sits between an application and third-party image/video
//! generation APIs. You describe what you want with a [`ModelRequest`], the
//! gateway routes it to the right backend adapter, and you get back a
//! [`UnifiedResponse`] with media URLs and diagnostics, whatever shape the
//! backend replied in.
//!
//! # Quick Start
//!
//! ```no_run
//! use mediagate::config::GatewayConfig;
//! use mediagate::gateway::{GenerationOptions, ModelRequest, ProviderRegistry, ProviderType, RateLimiter};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // FAL_KEY must be set
//!     let config = GatewayConfig::from_env()?;
//!     let registry = ProviderRegistry::from_config(&config, Arc::new(RateLimiter::new())).await?;
//!
//!     let request = ModelRequest::new("flux-schnell", "a red bicycle against a white wall")
//!         .with_options(GenerationOptions::new().with_seed(42));
//!
//!     let response = registry.call(ProviderType::Fal, &request).await?;
//!     for url in response.urls() {
//!         println!("{}", url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # What the gateway handles
//!
//! - **Rate limiting** - a shared [`RateLimiter`] keeps each backend inside its
//!   requests-per-minute budget and rejects calls locally once it is spent
//! - **Retries** - transient failures are retried with `2^attempt` second
//!   backoff; credential and throttling errors surface immediately
//! - **Normalization** - image lists, single images, and videos all become
//!   `UnifiedResponse::images`
//! - **Cancellation** - pass a `CancellationToken` to stop between attempts
//!
//! # Key Modules
//!
//! - [`gateway`] - provider trait, registry, rate limiter, and adapters
//! - [`error`] - the [`GatewayError`] taxonomy
//! - [`config`] - file and environment configuration
//! - [`health`] - aggregated provider health reports
//! - [`telemetry`] - logging setup
//!
//! [`ModelRequest`]: gateway::ModelRequest
//! [`UnifiedResponse`]: gateway::UnifiedResponse
//! [`RateLimiter`]: gateway::RateLimiter

pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod telemetry;
pub mod utils;

pub use error::GatewayError;

pub type Result<T> = std::result::Result<T, GatewayError>;
