//! Backend adapter implementations
//!
//! Each adapter implements [`MediaProvider`](crate::gateway::MediaProvider) and
//! owns everything specific to its backend. [`retry`] holds the backoff loop
//! they share.

pub mod fal;
pub mod retry;

pub use fal::FalProvider;
pub use retry::{retry_with_backoff, RetryConfig, RetryDecision};
