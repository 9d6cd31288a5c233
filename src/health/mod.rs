//! Health reporting across every registered provider
//!
//! [`HealthReport::collect`] probes all adapters concurrently and folds the
//! per-provider results into one overall [`HealthState`].

use crate::gateway::{HealthStatus, ProviderRegistry, ProviderType};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

/// Overall gateway health
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HealthState {
    /// Every provider answered its probe
    Healthy,
    /// Some providers answered, some did not
    Degraded,
    /// No provider answered, or none are registered
    Unhealthy,
}

impl HealthState {
    /// Derive the overall state from per-provider results
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a HealthStatus>) -> Self {
        let (mut healthy, mut total) = (0usize, 0usize);
        for status in statuses {
            total += 1;
            if status.healthy {
                healthy += 1;
            }
        }

        match (healthy, total) {
            (_, 0) | (0, _) => HealthState::Unhealthy,
            (h, t) if h == t => HealthState::Healthy,
            _ => HealthState::Degraded,
        }
    }
}

/// Point-in-time health of every registered provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub providers: BTreeMap<ProviderType, HealthStatus>,
    /// Wall time spent probing, in milliseconds
    pub total_duration_ms: u64,
    pub checked_at: chrono::DateTime<chrono::Utc>,
}

impl HealthReport {
    /// Probe every adapter in `registry` concurrently
    pub async fn collect(registry: &ProviderRegistry) -> Self {
        let start = Instant::now();
        let adapters = registry.adapters().await;

        let results = join_all(adapters.iter().map(|adapter| adapter.health_check())).await;
        let providers: BTreeMap<ProviderType, HealthStatus> = results
            .into_iter()
            .map(|status| (status.provider, status))
            .collect();

        let status = HealthState::from_statuses(providers.values());
        let total_duration_ms = start.elapsed().as_millis() as u64;

        match status {
            HealthState::Healthy => info!(
                "Health check complete: {} provider(s) healthy in {}ms",
                providers.len(),
                total_duration_ms
            ),
            _ => warn!(
                "Health check complete: status {:?}, unhealthy providers: {:?}",
                status,
                providers
                    .values()
                    .filter(|s| !s.healthy)
                    .map(|s| s.provider.as_str())
                    .collect::<Vec<_>>()
            ),
        }

        Self {
            status,
            providers,
            total_duration_ms,
            checked_at: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}
