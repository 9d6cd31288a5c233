//! Per-provider sliding-window admission control.
//!
//! One [`RateLimiter`] is built at startup and shared (via `Arc`) by every
//! adapter, so all concurrent callers of a provider draw on the same budget.
//! Each provider keeps a queue of request timestamps covering the trailing
//! 60 seconds. Expired entries are pruned lazily when the window is inspected;
//! nothing runs on a timer.
//!
//! ```rust
//! use mediagate::gateway::{ProviderType, RateLimiter};
//!
//! let limiter = RateLimiter::new();
//! limiter.set_limit(ProviderType::Fal, 2);
//!
//! assert!(limiter.check_limit(ProviderType::Fal));
//! limiter.record_request(ProviderType::Fal);
//! limiter.record_request(ProviderType::Fal);
//! assert!(!limiter.check_limit(ProviderType::Fal));
//! ```

use crate::gateway::traits::ProviderType;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Length of the trailing window
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Budget used for providers that never registered one
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

#[derive(Debug)]
struct ProviderWindow {
    limit: u32,
    timestamps: VecDeque<Instant>,
}

impl ProviderWindow {
    fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            timestamps: VecDeque::new(),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= RATE_LIMIT_WINDOW {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window rate limiter keyed by provider
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<ProviderType, ProviderWindow>>,
}

impl RateLimiter {
    /// Create a limiter with no registered budgets
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a limiter with budgets for several providers at once
    pub fn with_limits(limits: impl IntoIterator<Item = (ProviderType, u32)>) -> Self {
        let limiter = Self::new();
        for (provider, limit) in limits {
            limiter.set_limit(provider, limit);
        }
        limiter
    }

    /// Register or replace a provider's requests-per-minute budget.
    ///
    /// Recorded timestamps are kept, so lowering a budget takes effect on the
    /// next check. Zero is raised to one.
    pub fn set_limit(&self, provider: ProviderType, requests_per_minute: u32) {
        let mut windows = self.lock();
        let window = windows
            .entry(provider)
            .or_insert_with(|| ProviderWindow::new(requests_per_minute));
        window.limit = requests_per_minute.max(1);
        tracing::debug!(
            provider = %provider,
            requests_per_minute = window.limit,
            "Rate limit registered"
        );
    }

    /// Budget currently applied to `provider`
    pub fn limit_for(&self, provider: ProviderType) -> u32 {
        self.lock()
            .get(&provider)
            .map(|w| w.limit)
            .unwrap_or(DEFAULT_REQUESTS_PER_MINUTE)
    }

    /// Whether a new request to `provider` may proceed now.
    ///
    /// Never blocks or sleeps.
    pub fn check_limit(&self, provider: ProviderType) -> bool {
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows
            .entry(provider)
            .or_insert_with(|| ProviderWindow::new(DEFAULT_REQUESTS_PER_MINUTE));
        window.prune(now);

        let allowed = (window.timestamps.len() as u32) < window.limit;
        if !allowed {
            tracing::warn!(
                provider = %provider,
                in_window = window.timestamps.len(),
                limit = window.limit,
                "Rate limit reached, denying request"
            );
        }
        allowed
    }

    /// Record that a physical request to `provider` is about to be dispatched
    pub fn record_request(&self, provider: ProviderType) {
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows
            .entry(provider)
            .or_insert_with(|| ProviderWindow::new(DEFAULT_REQUESTS_PER_MINUTE));
        window.timestamps.push_back(now);
    }

    /// Requests still available to `provider` in the current window
    pub fn remaining(&self, provider: ProviderType) -> u32 {
        let now = Instant::now();
        let mut windows = self.lock();
        match windows.get_mut(&provider) {
            Some(window) => {
                window.prune(now);
                window.limit.saturating_sub(window.timestamps.len() as u32)
            }
            None => DEFAULT_REQUESTS_PER_MINUTE,
        }
    }

    // The guarded sections never panic, so a poisoned lock still holds a
    // consistent map.
    fn lock(&self) -> MutexGuard<'_, HashMap<ProviderType, ProviderWindow>> {
        self.windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
