//! Health probe implementations

use super::{HealthStatus, Subsystem};
use crate::error::{ReliabilityError, Result};
use crate::performance::PerformanceTracker;
use crate::storage::KeyValueStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// A check against one subsystem
///
/// Returning `Err` marks the subsystem unhealthy for the cycle.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn subsystem(&self) -> Subsystem;

    async fn probe(&self) -> Result<HealthStatus>;

    /// Upper bound the monitor allows this probe, given the per-probe timeout
    fn timeout_budget(&self, probe_timeout: Duration) -> Duration {
        probe_timeout
    }
}

/// Tries an ordered list of dev-server status endpoints
pub struct BundlerProbe {
    client: reqwest::Client,
    candidates: Vec<String>,
    request_timeout: Duration,
}

impl BundlerProbe {
    pub fn new(client: reqwest::Client, candidates: Vec<String>, request_timeout: Duration) -> Self {
        Self {
            client,
            candidates,
            request_timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for BundlerProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Bundler
    }

    async fn probe(&self) -> Result<HealthStatus> {
        for candidate in &self.candidates {
            let response = self
                .client
                .get(candidate)
                .timeout(self.request_timeout)
                .send()
                .await;
            match response {
                Ok(response) if response.status().is_success() => {
                    debug!("Bundler responding at {}", candidate);
                    return Ok(HealthStatus::Healthy);
                }
                Ok(response) => {
                    debug!("Bundler candidate {} returned {}", candidate, response.status());
                }
                Err(e) => {
                    debug!("Bundler candidate {} unreachable: {}", candidate, e);
                }
            }
        }
        Ok(HealthStatus::Unhealthy)
    }

    fn timeout_budget(&self, probe_timeout: Duration) -> Duration {
        probe_timeout * self.candidates.len().max(1) as u32
    }
}

/// Issues a lightweight request to the remote API and records its latency
pub struct ApiProbe {
    client: reqwest::Client,
    url: String,
    request_timeout: Duration,
    tracker: Arc<PerformanceTracker>,
}

impl ApiProbe {
    pub fn new(
        client: reqwest::Client,
        url: impl Into<String>,
        request_timeout: Duration,
        tracker: Arc<PerformanceTracker>,
    ) -> Self {
        Self {
            client,
            url: url.into(),
            request_timeout,
            tracker,
        }
    }
}

#[async_trait]
impl HealthProbe for ApiProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Api
    }

    async fn probe(&self) -> Result<HealthStatus> {
        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.request_timeout, self.client.get(&self.url).send()).await;
        // Latency is recorded whatever the outcome
        self.tracker.record_latency(started.elapsed());

        match outcome {
            Ok(Ok(response)) if response.status().is_success() => Ok(HealthStatus::Healthy),
            Ok(Ok(response)) => {
                debug!("API health check returned {}", response.status());
                Ok(HealthStatus::Unhealthy)
            }
            Ok(Err(e)) => Err(ReliabilityError::from(e)),
            Err(_) => Err(ReliabilityError::timeout(format!(
                "API did not answer within {:?}",
                self.request_timeout
            ))),
        }
    }

    fn timeout_budget(&self, probe_timeout: Duration) -> Duration {
        // The probe enforces its own timeout so it can record the latency
        probe_timeout + Duration::from_millis(500)
    }
}

/// Compares the stored item count against a warning threshold
pub struct StorageProbe {
    store: Arc<dyn KeyValueStore>,
    warning_threshold: usize,
}

impl StorageProbe {
    pub fn new(store: Arc<dyn KeyValueStore>, warning_threshold: usize) -> Self {
        Self {
            store,
            warning_threshold,
        }
    }
}

#[async_trait]
impl HealthProbe for StorageProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Storage
    }

    async fn probe(&self) -> Result<HealthStatus> {
        let count = self.store.item_count().await?;
        if count < self.warning_threshold {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Warning)
        }
    }
}

/// Checks average latency against the alert threshold
pub struct PerformanceProbe {
    tracker: Arc<PerformanceTracker>,
    alert_threshold: Duration,
}

impl PerformanceProbe {
    pub fn new(tracker: Arc<PerformanceTracker>, alert_threshold: Duration) -> Self {
        Self {
            tracker,
            alert_threshold,
        }
    }
}

#[async_trait]
impl HealthProbe for PerformanceProbe {
    fn subsystem(&self) -> Subsystem {
        Subsystem::Performance
    }

    async fn probe(&self) -> Result<HealthStatus> {
        let average = self.tracker.summary().average_latency();
        if average < self.alert_threshold {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Warning)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_storage_probe_thresholds() {
        let store = Arc::new(MemoryStore::new());
        let probe = StorageProbe::new(store.clone(), 2);
        assert_eq!(probe.probe().await.unwrap(), HealthStatus::Healthy);

        store.set("a", "1".to_string()).await.unwrap();
        store.set("b", "2".to_string()).await.unwrap();
        assert_eq!(probe.probe().await.unwrap(), HealthStatus::Warning);

        store.set_available(false);
        assert!(probe.probe().await.is_err());
    }

    #[tokio::test]
    async fn test_performance_probe() {
        let tracker = Arc::new(PerformanceTracker::new(10));
        let probe = PerformanceProbe::new(tracker.clone(), Duration::from_millis(500));
        assert_eq!(probe.probe().await.unwrap(), HealthStatus::Healthy);

        tracker.record_latency(Duration::from_millis(900));
        assert_eq!(probe.probe().await.unwrap(), HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_bundler_probe_without_candidates() {
        let probe = BundlerProbe::new(reqwest::Client::new(), Vec::new(), Duration::from_secs(1));
        assert_eq!(probe.probe().await.unwrap(), HealthStatus::Unhealthy);
    }
}
