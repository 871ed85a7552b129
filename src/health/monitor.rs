//! Periodic health probing and snapshot publication
//!
//! Probes run concurrently, each under its own timeout. A probe that errors,
//! times out or panics marks only its own subsystem unhealthy. Results are
//! published as a whole new snapshot once every probe of the cycle is done;
//! readers never wait on an in-flight cycle.

use super::{HealthProbe, HealthSnapshot, HealthStatus, Subsystem};
use crate::clock::{Clock, SystemClock};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
struct Published {
    snapshot: HealthSnapshot,
    completed_at: Option<DateTime<Utc>>,
}

/// Runs probe cycles and holds the latest snapshot
pub struct HealthMonitor {
    probes: Vec<Arc<dyn HealthProbe>>,
    probe_timeout: Duration,
    published: RwLock<Published>,
    /// Serializes full cycles and single-subsystem re-probes
    cycle_lock: Mutex<()>,
    clock: Arc<dyn Clock>,
}

impl HealthMonitor {
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>, probe_timeout: Duration) -> Self {
        Self::with_clock(probes, probe_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(
        probes: Vec<Arc<dyn HealthProbe>>,
        probe_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            probes,
            probe_timeout,
            published: RwLock::new(Published::default()),
            cycle_lock: Mutex::new(()),
            clock,
        }
    }

    /// Snapshot from the last completed cycle
    pub async fn snapshot(&self) -> HealthSnapshot {
        self.published.read().await.snapshot.clone()
    }

    /// When the last cycle completed
    pub async fn last_cycle_at(&self) -> Option<DateTime<Utc>> {
        self.published.read().await.completed_at
    }

    /// Probe every subsystem and replace the snapshot
    pub async fn run_probe_cycle(&self) -> HealthSnapshot {
        let _cycle = self.cycle_lock.lock().await;

        let results = join_all(self.probes.iter().map(|probe| self.run_probe(probe))).await;

        let snapshot = results
            .into_iter()
            .fold(HealthSnapshot::default(), |snapshot, (subsystem, status)| {
                snapshot.with_status(subsystem, status)
            });

        let mut published = self.published.write().await;
        published.snapshot = snapshot.clone();
        published.completed_at = Some(self.clock.now());
        drop(published);

        info!(health = %snapshot, "Health check completed");
        snapshot
    }

    /// Re-probe a single subsystem and publish the updated snapshot
    ///
    /// Returns `None` when no probe is registered for the subsystem.
    pub async fn probe_subsystem(&self, subsystem: Subsystem) -> Option<HealthStatus> {
        let probe = self
            .probes
            .iter()
            .find(|probe| probe.subsystem() == subsystem)?
            .clone();

        let _cycle = self.cycle_lock.lock().await;
        let (_, status) = self.run_probe(&probe).await;

        let mut published = self.published.write().await;
        published.snapshot = published.snapshot.clone().with_status(subsystem, status);
        debug!(%subsystem, %status, "Subsystem re-probed");
        Some(status)
    }

    async fn run_probe(&self, probe: &Arc<dyn HealthProbe>) -> (Subsystem, HealthStatus) {
        let subsystem = probe.subsystem();
        let budget = probe.timeout_budget(self.probe_timeout);

        let guarded = AssertUnwindSafe(probe.probe()).catch_unwind();
        let status = match tokio::time::timeout(budget, guarded).await {
            Ok(Ok(Ok(status))) => status,
            Ok(Ok(Err(e))) => {
                warn!(%subsystem, "{} health check failed: {}", subsystem, e);
                HealthStatus::Unhealthy
            }
            Ok(Err(_)) => {
                warn!(%subsystem, "{} health check panicked", subsystem);
                HealthStatus::Unhealthy
            }
            Err(_) => {
                warn!(%subsystem, "{} health check timed out after {:?}", subsystem, budget);
                HealthStatus::Unhealthy
            }
        };
        (subsystem, status)
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field(
                "probes",
                &self.probes.iter().map(|p| p.subsystem()).collect::<Vec<_>>(),
            )
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReliabilityError, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedProbe {
        subsystem: Subsystem,
        status: HealthStatus,
    }

    #[async_trait]
    impl HealthProbe for FixedProbe {
        fn subsystem(&self) -> Subsystem {
            self.subsystem
        }

        async fn probe(&self) -> Result<HealthStatus> {
            Ok(self.status)
        }
    }

    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        fn subsystem(&self) -> Subsystem {
            Subsystem::Api
        }

        async fn probe(&self) -> Result<HealthStatus> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(HealthStatus::Healthy)
        }
    }

    struct FailingProbe {
        panic: bool,
    }

    #[async_trait]
    impl HealthProbe for FailingProbe {
        fn subsystem(&self) -> Subsystem {
            Subsystem::Storage
        }

        async fn probe(&self) -> Result<HealthStatus> {
            if self.panic {
                panic!("storage probe exploded");
            }
            Err(ReliabilityError::probe("storage offline"))
        }
    }

    struct ToggleProbe {
        up: AtomicBool,
    }

    #[async_trait]
    impl HealthProbe for ToggleProbe {
        fn subsystem(&self) -> Subsystem {
            Subsystem::Bundler
        }

        async fn probe(&self) -> Result<HealthStatus> {
            Ok(if self.up.load(Ordering::SeqCst) {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            })
        }
    }

    fn fixed(subsystem: Subsystem, status: HealthStatus) -> Arc<dyn HealthProbe> {
        Arc::new(FixedProbe { subsystem, status })
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_isolated_to_one_subsystem() {
        let monitor = HealthMonitor::new(
            vec![
                fixed(Subsystem::Bundler, HealthStatus::Healthy),
                Arc::new(HangingProbe),
                fixed(Subsystem::Storage, HealthStatus::Warning),
                fixed(Subsystem::Performance, HealthStatus::Healthy),
            ],
            Duration::from_secs(5),
        );

        let snapshot = monitor.run_probe_cycle().await;
        assert_eq!(snapshot.get(Subsystem::Api), HealthStatus::Unhealthy);
        assert_eq!(snapshot.get(Subsystem::Bundler), HealthStatus::Healthy);
        assert_eq!(snapshot.get(Subsystem::Storage), HealthStatus::Warning);
        assert_eq!(snapshot.get(Subsystem::Performance), HealthStatus::Healthy);
        assert_eq!(monitor.snapshot().await, snapshot);
    }

    #[tokio::test]
    async fn test_errors_and_panics_mark_unhealthy() {
        for panic in [false, true] {
            let monitor = HealthMonitor::new(
                vec![
                    Arc::new(FailingProbe { panic }),
                    fixed(Subsystem::Api, HealthStatus::Healthy),
                ],
                Duration::from_secs(5),
            );

            let snapshot = monitor.run_probe_cycle().await;
            assert_eq!(snapshot.get(Subsystem::Storage), HealthStatus::Unhealthy);
            assert_eq!(snapshot.get(Subsystem::Api), HealthStatus::Healthy);
        }
    }

    #[tokio::test]
    async fn test_snapshot_is_replaced_wholesale() {
        let monitor = HealthMonitor::new(
            vec![fixed(Subsystem::Api, HealthStatus::Healthy)],
            Duration::from_secs(5),
        );
        assert_eq!(monitor.snapshot().await, HealthSnapshot::default());
        assert!(monitor.last_cycle_at().await.is_none());

        monitor.run_probe_cycle().await;
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.get(Subsystem::Api), HealthStatus::Healthy);
        // Subsystems without a probe stay unknown
        assert_eq!(snapshot.get(Subsystem::Bundler), HealthStatus::Unknown);
        assert!(monitor.last_cycle_at().await.is_some());
    }

    #[tokio::test]
    async fn test_probe_subsystem_updates_only_that_entry() {
        let toggle = Arc::new(ToggleProbe {
            up: AtomicBool::new(false),
        });
        let monitor = HealthMonitor::new(
            vec![
                toggle.clone() as Arc<dyn HealthProbe>,
                fixed(Subsystem::Api, HealthStatus::Healthy),
            ],
            Duration::from_secs(5),
        );

        monitor.run_probe_cycle().await;
        assert_eq!(
            monitor.snapshot().await.get(Subsystem::Bundler),
            HealthStatus::Unhealthy
        );

        toggle.up.store(true, Ordering::SeqCst);
        assert_eq!(
            monitor.probe_subsystem(Subsystem::Bundler).await,
            Some(HealthStatus::Healthy)
        );
        let snapshot = monitor.snapshot().await;
        assert_eq!(snapshot.get(Subsystem::Bundler), HealthStatus::Healthy);
        assert_eq!(snapshot.get(Subsystem::Api), HealthStatus::Healthy);
        assert_eq!(monitor.probe_subsystem(Subsystem::Storage).await, None);
    }
}
