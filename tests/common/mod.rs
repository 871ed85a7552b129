//! Shared test fixtures: mock dependency endpoints and engine builders

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reliability_engine::{
    KeyValueStore, ManualClock, MemoryStore, ReliabilityConfig, ReliabilityEngine, Result,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

/// Mock bundler status endpoint and remote API
pub struct MockDependencies {
    pub bundler: MockServer,
    pub api: MockServer,
}

impl MockDependencies {
    /// Both dependencies answering 200
    pub async fn start() -> Self {
        let deps = Self {
            bundler: MockServer::start().await,
            api: MockServer::start().await,
        };
        deps.bundler_responds(200).await;
        deps.api_responds(200, Duration::ZERO).await;
        deps
    }

    pub fn bundler_url(&self) -> String {
        format!("{}/status", self.bundler.uri())
    }

    pub fn api_url(&self) -> String {
        format!("{}/api/v1/models", self.api.uri())
    }

    pub async fn bundler_responds(&self, status: u16) {
        self.bundler.reset().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .respond_with(ResponseTemplate::new(status).set_body_string("packager-status:running"))
            .mount(&self.bundler)
            .await;
    }

    pub async fn api_responds(&self, status: u16, delay: Duration) {
        self.api.reset().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/models"))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(serde_json::json!({ "data": [] }))
                    .set_delay(delay),
            )
            .mount(&self.api)
            .await;
    }

    /// Configuration pointing the probes at the mock servers
    pub fn config(&self) -> ReliabilityConfig {
        let mut config = ReliabilityConfig::default();
        config.health.api_url = self.api_url();
        config.health.bundler_candidates = vec![self.bundler_url()];
        config.health.probe_timeout = Duration::from_millis(500);
        config
    }
}

/// Clock fixed at a known instant
pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ))
}

/// Engine with in-memory storage, no probes and no automatic recovery
pub fn offline_engine(clock: Arc<ManualClock>) -> ReliabilityEngine {
    let mut config = ReliabilityConfig::default();
    config.recovery.auto_recovery = false;
    ReliabilityEngine::builder(config)
        .store(Arc::new(MemoryStore::new()))
        .clock(clock)
        .probes(Vec::new())
        .build()
        .unwrap()
}

/// Store whose operations never complete
#[derive(Debug, Default)]
pub struct StalledStore;

#[async_trait]
impl KeyValueStore for StalledStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        std::future::pending().await
    }

    async fn set(&self, _key: &str, _value: String) -> Result<()> {
        std::future::pending().await
    }

    async fn item_count(&self) -> Result<usize> {
        std::future::pending().await
    }
}

/// Poll `condition` until it holds or `deadline` passes
pub async fn eventually<F, Fut>(deadline: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let started = tokio::time::Instant::now();
    loop {
        if condition().await {
            return true;
        }
        if started.elapsed() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
