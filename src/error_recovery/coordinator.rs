//! Central handling of reported errors
//!
//! Every reported error is classified, persisted with the current health
//! snapshot, counted by the dependency's breaker when recoverable, and
//! optionally followed by a delayed recovery attempt. Handling never fails.
//! At most one recovery attempt per dependency is pending or running at a
//! time; errors reported meanwhile are folded into it.

use super::circuit_breaker::CircuitBreakerManager;
use super::classifier::ErrorClassifier;
use crate::clock::Clock;
use crate::config::ReliabilityConfig;
use crate::error::{ErrorClass, ReliabilityError, ReportedError, Result};
use crate::health::{HealthMonitor, HealthStatus, Subsystem};
use crate::performance::PerformanceTracker;
use crate::scheduler::Scheduler;
use crate::storage::{ErrorLog, ErrorRecord};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Breaker used when a reported error names no dependency
pub const DEFAULT_DEPENDENCY: &str = "api";

/// Side effects requested by recovery attempts
#[async_trait]
pub trait RecoveryHook: Send + Sync {
    /// A subsystem stayed unreachable after its recovery probe
    async fn request_restart(&self, subsystem: Subsystem);
}

/// Logs restart requests without acting on them
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingRecoveryHook;

#[async_trait]
impl RecoveryHook for LoggingRecoveryHook {
    async fn request_restart(&self, subsystem: Subsystem) {
        warn!(%subsystem, "{} still unreachable after recovery attempt, restart requested", subsystem);
    }
}

/// Recovery policy
#[derive(Debug, Clone, Copy)]
pub struct RecoverySettings {
    pub auto_recovery: bool,
    pub delay: Duration,
}

impl From<&ReliabilityConfig> for RecoverySettings {
    fn from(config: &ReliabilityConfig) -> Self {
        Self {
            auto_recovery: config.recovery.auto_recovery,
            delay: config.recovery_delay(),
        }
    }
}

/// Shared handles a recovery attempt needs once it runs detached
#[derive(Clone)]
struct RecoveryContext {
    monitor: Arc<HealthMonitor>,
    breakers: Arc<CircuitBreakerManager>,
    hook: Arc<dyn RecoveryHook>,
    pending: Arc<Mutex<HashSet<String>>>,
}

/// Marks a dependency's recovery as pending until dropped
struct PendingRecovery {
    pending: Arc<Mutex<HashSet<String>>>,
    dependency: String,
}

impl PendingRecovery {
    /// `None` when a recovery for `dependency` is already pending
    fn claim(pending: &Arc<Mutex<HashSet<String>>>, dependency: &str) -> Option<Self> {
        let mut claimed = pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !claimed.insert(dependency.to_string()) {
            return None;
        }
        Some(Self {
            pending: pending.clone(),
            dependency: dependency.to_string(),
        })
    }
}

impl Drop for PendingRecovery {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.dependency);
    }
}

pub struct ErrorRecoveryCoordinator {
    classifier: ErrorClassifier,
    error_log: Arc<ErrorLog>,
    tracker: Arc<PerformanceTracker>,
    clock: Arc<dyn Clock>,
    settings: RecoverySettings,
    recovery: RecoveryContext,
    scheduler: RwLock<Option<Scheduler>>,
}

impl ErrorRecoveryCoordinator {
    pub fn new(
        classifier: ErrorClassifier,
        breakers: Arc<CircuitBreakerManager>,
        error_log: Arc<ErrorLog>,
        monitor: Arc<HealthMonitor>,
        tracker: Arc<PerformanceTracker>,
        clock: Arc<dyn Clock>,
        settings: RecoverySettings,
    ) -> Self {
        Self {
            classifier,
            error_log,
            tracker,
            clock,
            settings,
            recovery: RecoveryContext {
                monitor,
                breakers,
                hook: Arc::new(LoggingRecoveryHook),
                pending: Arc::new(Mutex::new(HashSet::new())),
            },
            scheduler: RwLock::new(None),
        }
    }

    /// Replace the hook invoked by failed recovery probes
    pub fn with_recovery_hook(mut self, hook: Arc<dyn RecoveryHook>) -> Self {
        self.recovery.hook = hook;
        self
    }

    pub fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// Recovery attempts are only scheduled while a scheduler is attached
    pub async fn attach_scheduler(&self, scheduler: Scheduler) {
        *self.scheduler.write().await = Some(scheduler);
    }

    pub async fn detach_scheduler(&self) {
        self.scheduler.write().await.take();
    }

    /// Handle one reported error
    pub async fn handle(&self, reported: &ReportedError) -> ErrorClass {
        let class = self.classifier.classify(reported);
        let dependency = reported
            .dependency
            .as_deref()
            .unwrap_or(DEFAULT_DEPENDENCY)
            .to_string();

        match class {
            ErrorClass::Recoverable => {
                warn!(%dependency, %class, "Reported error: {}", reported.message)
            }
            ErrorClass::Fatal => error!(%dependency, %class, "Reported error: {}", reported.message),
        }

        let health_status = self.recovery.monitor.snapshot().await;
        self.error_log
            .append(ErrorRecord {
                timestamp: self.clock.now(),
                message: reported.message.clone(),
                stack_trace: reported.stack_trace.clone(),
                health_status,
            })
            .await;

        if class.is_recoverable() {
            self.recovery
                .breakers
                .get_breaker(&dependency)
                .await
                .report_failure(class)
                .await;

            if self.settings.auto_recovery {
                if let Err(e) = self.schedule_recovery(&dependency).await {
                    debug!(%dependency, "Automatic recovery skipped: {}", e);
                }
            }
        }

        self.tracker.record_error();
        class
    }

    async fn schedule_recovery(&self, dependency: &str) -> Result<()> {
        let scheduler = match self.scheduler.read().await.clone() {
            Some(scheduler) if !scheduler.is_cancelled() => scheduler,
            _ => {
                return Err(ReliabilityError::not_initialized(
                    "no scheduler attached for recovery attempts",
                ))
            }
        };

        let Some(claim) = PendingRecovery::claim(&self.recovery.pending, dependency) else {
            debug!(%dependency, "Recovery attempt already pending");
            return Ok(());
        };

        debug!(%dependency, delay = ?self.settings.delay, "Scheduling recovery attempt");
        let context = self.recovery.clone();
        scheduler.spawn_delayed("error-recovery", self.settings.delay, async move {
            context.attempt(&claim.dependency).await;
            drop(claim);
        });
        Ok(())
    }

    /// Dependencies with a recovery attempt pending or running
    pub fn pending_recoveries(&self) -> usize {
        self.recovery
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Run a recovery attempt now, without waiting for the delay
    pub async fn recover_now(&self, dependency: &str) {
        self.recovery.attempt(dependency).await;
    }
}

impl RecoveryContext {
    async fn attempt(&self, dependency: &str) {
        let snapshot = self.monitor.snapshot().await;
        let mut targets: BTreeSet<Subsystem> = snapshot
            .unhealthy()
            .into_iter()
            .filter(Subsystem::is_network)
            .collect();
        let dependency_subsystem = dependency.parse::<Subsystem>().ok();
        targets.extend(dependency_subsystem);

        if targets.is_empty() {
            debug!(%dependency, "Nothing to re-probe during recovery");
            return;
        }

        info!(%dependency, ?targets, "Attempting automatic recovery");
        for subsystem in targets {
            match self.monitor.probe_subsystem(subsystem).await {
                Some(HealthStatus::Healthy) => self.subsystem_recovered(subsystem, dependency).await,
                Some(status) => {
                    debug!(%subsystem, %status, "Subsystem not recovered yet");
                    if subsystem == Subsystem::Bundler {
                        self.hook.request_restart(subsystem).await;
                    }
                }
                None => debug!(%subsystem, "No probe registered for subsystem"),
            }
        }
    }

    async fn subsystem_recovered(&self, subsystem: Subsystem, dependency: &str) {
        info!(%subsystem, "Subsystem recovered");

        let mut names = vec![subsystem.as_str().to_string()];
        // Dependencies that are not subsystems themselves are reached through the api
        if subsystem == Subsystem::Api && dependency.parse::<Subsystem>().is_err() {
            names.push(dependency.to_string());
        }

        for name in names {
            if let Some(breaker) = self.breakers.find(&name).await {
                breaker.recovery_succeeded().await;
            }
        }
    }
}

impl std::fmt::Debug for ErrorRecoveryCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorRecoveryCoordinator")
            .field("settings", &self.settings)
            .field("monitor", &self.recovery.monitor)
            .finish()
    }
}
