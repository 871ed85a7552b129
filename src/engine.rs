//! Reliability engine facade
//!
//! The engine is constructed explicitly by the application and shared by
//! reference; there is no process-wide instance. `initialize` starts the
//! health, performance and breaker loops exactly once and `shutdown` stops
//! them, after which the engine may be initialized again.

use crate::clock::{Clock, SystemClock};
use crate::config::ReliabilityConfig;
use crate::error::{ErrorClass, ReportedError, Result};
use crate::error_recovery::{
    CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStats, ErrorClassifier,
    ErrorRecoveryCoordinator, RecoveryHook, RecoverySettings,
};
use crate::health::{
    ApiProbe, BundlerProbe, HealthMonitor, HealthProbe, HealthSnapshot, PerformanceProbe,
    StorageProbe,
};
use crate::performance::{PerformanceSummary, PerformanceTracker};
use crate::scheduler::Scheduler;
use crate::storage::{ErrorLog, ErrorRecord, FileStore, KeyValueStore};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Composition root for health monitoring, breakers and error recovery
pub struct ReliabilityEngine {
    config: ReliabilityConfig,
    store: Arc<dyn KeyValueStore>,
    tracker: Arc<PerformanceTracker>,
    monitor: Arc<HealthMonitor>,
    breakers: Arc<CircuitBreakerManager>,
    error_log: Arc<ErrorLog>,
    coordinator: Arc<ErrorRecoveryCoordinator>,
    lifecycle: Mutex<Option<Scheduler>>,
    initialized: AtomicBool,
}

impl ReliabilityEngine {
    /// Engine with file-backed storage, the system clock and HTTP probes
    pub fn new(config: ReliabilityConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ReliabilityConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &ReliabilityConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Start the periodic loops; a no-op when already initialized
    pub async fn initialize(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.is_some() {
            debug!("Reliability engine already initialized");
            return;
        }

        let scheduler = Scheduler::new();

        let monitor = self.monitor.clone();
        scheduler.spawn_periodic("health-check", self.config.health.check_interval, move || {
            let monitor = monitor.clone();
            async move {
                monitor.run_probe_cycle().await;
            }
        });

        let (tracker, monitor) = (self.tracker.clone(), self.monitor.clone());
        scheduler.spawn_periodic(
            "performance-summary",
            self.config.performance.summary_interval,
            move || {
                let tracker = tracker.clone();
                let monitor = monitor.clone();
                async move {
                    let health = monitor.snapshot().await;
                    tracker.emit_summary(&health);
                }
            },
        );

        let breakers = self.breakers.clone();
        scheduler.spawn_periodic(
            "circuit-breaker-check",
            self.config.circuit_breaker.check_interval,
            move || {
                let breakers = breakers.clone();
                async move {
                    breakers.check_all_timeouts().await;
                }
            },
        );

        self.coordinator.attach_scheduler(scheduler.clone()).await;
        *lifecycle = Some(scheduler);
        self.initialized.store(true, Ordering::SeqCst);

        info!(
            health_interval = ?self.config.health.check_interval,
            performance_interval = ?self.config.performance.summary_interval,
            breaker_interval = ?self.config.circuit_breaker.check_interval,
            "Reliability engine initialized"
        );
    }

    /// Cancel all scheduled work and wait for it to stop
    pub async fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(scheduler) = lifecycle.take() else {
            debug!("Reliability engine not running");
            return;
        };

        self.initialized.store(false, Ordering::SeqCst);
        self.coordinator.detach_scheduler().await;
        scheduler.shutdown().await;
        info!("Reliability engine shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Hand a caught error to the engine; never fails
    pub async fn report_error(&self, error: &ReportedError) -> ErrorClass {
        self.coordinator.handle(error).await
    }

    /// Report a successful guarded call to `dependency`
    ///
    /// Dependencies that never failed have no breaker and nothing to record.
    pub async fn report_success(&self, dependency: &str) {
        if let Some(breaker) = self.breakers.find(dependency).await {
            breaker.report_success().await;
        }
    }

    /// Record the latency of a call made outside the probes
    pub fn record_latency(&self, latency: Duration) {
        self.tracker.record_latency(latency);
    }

    /// Snapshot from the last completed probe cycle
    pub async fn get_health(&self) -> HealthSnapshot {
        self.monitor.snapshot().await
    }

    pub fn get_performance(&self) -> PerformanceSummary {
        self.tracker.summary()
    }

    /// Whether a guarded call to `dependency` may be issued now
    ///
    /// While half-open each `true` consumes one of the allowed trials.
    /// A dependency without recorded failures is always allowed.
    pub async fn is_call_allowed(&self, dependency: &str) -> bool {
        match self.breakers.find(dependency).await {
            Some(breaker) => breaker.allow_request().await,
            None => true,
        }
    }

    pub async fn breaker_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        self.breakers.get_all_stats().await
    }

    /// Persisted error records, oldest first
    pub async fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.error_log.load_all().await
    }

    /// Run one probe cycle outside the scheduler
    pub async fn run_probe_cycle(&self) -> HealthSnapshot {
        self.monitor.run_probe_cycle().await
    }

    /// Run the breaker timeout check outside the scheduler
    pub async fn check_breaker_timeouts(&self) {
        self.breakers.check_all_timeouts().await;
    }
}

impl Drop for ReliabilityEngine {
    fn drop(&mut self) {
        if let Some(scheduler) = self.lifecycle.get_mut().take() {
            scheduler.token().cancel();
        }
    }
}

impl std::fmt::Debug for ReliabilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReliabilityEngine")
            .field("initialized", &self.is_initialized())
            .field("monitor", &self.monitor)
            .finish()
    }
}

/// Builder for [`ReliabilityEngine`]
pub struct EngineBuilder {
    config: ReliabilityConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    probes: Option<Vec<Arc<dyn HealthProbe>>>,
    recovery_hook: Option<Arc<dyn RecoveryHook>>,
    http_client: Option<reqwest::Client>,
    classifier: ErrorClassifier,
}

impl EngineBuilder {
    pub fn new(config: ReliabilityConfig) -> Self {
        Self {
            config,
            store: None,
            clock: None,
            probes: None,
            recovery_hook: None,
            http_client: None,
            classifier: ErrorClassifier::default(),
        }
    }

    /// Storage backing the error log and the storage probe
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the default probes
    pub fn probes(mut self, probes: Vec<Arc<dyn HealthProbe>>) -> Self {
        self.probes = Some(probes);
        self
    }

    pub fn recovery_hook(mut self, hook: Arc<dyn RecoveryHook>) -> Self {
        self.recovery_hook = Some(hook);
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn build(self) -> Result<ReliabilityEngine> {
        let config = self.config;
        config.validate()?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FileStore::new(config.error_log.storage_dir.clone())));
        let tracker = Arc::new(PerformanceTracker::from_config(
            &config.performance,
            clock.clone(),
        ));

        let probes = match self.probes {
            Some(probes) => probes,
            None => {
                let client = match self.http_client {
                    Some(client) => client,
                    None => reqwest::Client::builder()
                        .timeout(config.health.probe_timeout)
                        .build()?,
                };
                default_probes(&config, client, store.clone(), tracker.clone())
            }
        };
        let monitor = Arc::new(HealthMonitor::with_clock(
            probes,
            config.health.probe_timeout,
            clock.clone(),
        ));

        let breakers = Arc::new(CircuitBreakerManager::new(
            CircuitBreakerConfig::from(&config.circuit_breaker),
            clock.clone(),
        ));
        let error_log = Arc::new(
            ErrorLog::new(
                store.clone(),
                config.error_log.key.clone(),
                config.error_log.max_size,
            )
            .with_timeout(config.error_log.storage_timeout),
        );

        let mut coordinator = ErrorRecoveryCoordinator::new(
            self.classifier,
            breakers.clone(),
            error_log.clone(),
            monitor.clone(),
            tracker.clone(),
            clock,
            RecoverySettings::from(&config),
        );
        if let Some(hook) = self.recovery_hook {
            coordinator = coordinator.with_recovery_hook(hook);
        }

        Ok(ReliabilityEngine {
            config,
            store,
            tracker,
            monitor,
            breakers,
            error_log,
            coordinator: Arc::new(coordinator),
            lifecycle: Mutex::new(None),
            initialized: AtomicBool::new(false),
        })
    }
}

fn default_probes(
    config: &ReliabilityConfig,
    client: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
    tracker: Arc<PerformanceTracker>,
) -> Vec<Arc<dyn HealthProbe>> {
    let probe_timeout = config.health.probe_timeout;
    vec![
        Arc::new(BundlerProbe::new(
            client.clone(),
            config.health.bundler_candidates.clone(),
            probe_timeout,
        )),
        Arc::new(ApiProbe::new(
            client,
            config.health.api_url.clone(),
            probe_timeout,
            tracker.clone(),
        )),
        Arc::new(StorageProbe::new(
            store,
            config.health.storage_warning_threshold,
        )),
        Arc::new(PerformanceProbe::new(
            tracker,
            config.performance.latency_alert_threshold,
        )),
    ]
}
