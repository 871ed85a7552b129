//! Rolling latency and error-rate tracking
//!
//! The tracker owns one [`MetricsWindow`] and a monotonic error counter,
//! both behind a single lock so that [`PerformanceTracker::summary`] always
//! sees a consistent pair.

use super::window::{MetricsWindow, PerformanceSample};
use crate::clock::{Clock, SystemClock};
use crate::config::PerformanceConfig;
use crate::health::HealthSnapshot;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// Derived view of the current window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Mean latency over the window, in milliseconds
    pub average_latency_ms: f64,
    /// `error_count / max(1, sample_count)`
    pub error_rate: f64,
    /// Samples currently in the window
    pub sample_count: usize,
    /// Errors recorded since the tracker was created
    pub error_count: u64,
}

impl PerformanceSummary {
    pub fn average_latency(&self) -> Duration {
        Duration::from_secs_f64(self.average_latency_ms / 1000.0)
    }
}

#[derive(Debug)]
struct TrackerState {
    window: MetricsWindow,
    error_count: u64,
}

/// Aggregates latency samples and error counts
#[derive(Debug)]
pub struct PerformanceTracker {
    state: Mutex<TrackerState>,
    clock: Arc<dyn Clock>,
    log_summaries: bool,
}

impl PerformanceTracker {
    /// Create a tracker with a window of `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                window: MetricsWindow::new(capacity),
                error_count: 0,
            }),
            clock,
            log_summaries: true,
        }
    }

    pub fn from_config(config: &PerformanceConfig, clock: Arc<dyn Clock>) -> Self {
        let mut tracker = Self::with_clock(config.window_capacity, clock);
        tracker.log_summaries = config.log_summaries;
        tracker
    }

    /// Record an observed latency
    pub fn record_latency(&self, latency: Duration) {
        let sample = PerformanceSample::new(latency, self.clock.now());
        self.lock().window.record(sample);
    }

    /// Count one handled error
    pub fn record_error(&self) {
        self.lock().error_count += 1;
    }

    /// Consistent snapshot of the current counters
    pub fn summary(&self) -> PerformanceSummary {
        let state = self.lock();
        let sample_count = state.window.count();
        PerformanceSummary {
            average_latency_ms: state.window.average().as_secs_f64() * 1000.0,
            error_rate: state.error_count as f64 / sample_count.max(1) as f64,
            sample_count,
            error_count: state.error_count,
        }
    }

    /// Log the current summary; never mutates tracker state
    pub fn emit_summary(&self, health: &HealthSnapshot) -> PerformanceSummary {
        let summary = self.summary();
        if self.log_summaries {
            info!(
                avg_response_time_ms = summary.average_latency_ms,
                error_rate_percent = summary.error_rate * 100.0,
                samples = summary.sample_count,
                health = %health,
                "Performance metrics"
            );
        }
        summary
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // Counters stay meaningful even if a holder panicked
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(super::window::DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_scenario() {
        let tracker = PerformanceTracker::new(10);
        tracker.record_latency(Duration::from_millis(100));
        tracker.record_latency(Duration::from_millis(300));
        tracker.record_error();

        let summary = tracker.summary();
        assert_eq!(summary.average_latency_ms, 200.0);
        assert_eq!(summary.average_latency(), Duration::from_millis(200));
        assert_eq!(summary.error_rate, 0.5);
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.error_count, 1);
    }

    #[test]
    fn test_error_rate_without_samples() {
        let tracker = PerformanceTracker::default();
        tracker.record_error();
        tracker.record_error();

        let summary = tracker.summary();
        assert_eq!(summary.error_rate, 2.0);
        assert_eq!(summary.average_latency_ms, 0.0);
    }

    #[test]
    fn test_error_rate_uses_window_count() {
        let tracker = PerformanceTracker::new(2);
        for _ in 0..5 {
            tracker.record_latency(Duration::from_millis(10));
        }
        tracker.record_error();

        // Window holds two samples regardless of how many were recorded
        let summary = tracker.summary();
        assert_eq!(summary.sample_count, 2);
        assert_eq!(summary.error_rate, 0.5);
    }

    #[test]
    fn test_emit_does_not_mutate() {
        let tracker = PerformanceTracker::new(10);
        tracker.record_latency(Duration::from_millis(50));
        let before = tracker.summary();
        let emitted = tracker.emit_summary(&HealthSnapshot::default());
        assert_eq!(before, emitted);
        assert_eq!(tracker.summary(), before);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let tracker = Arc::new(PerformanceTracker::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        tracker.record_error();
                        tracker.record_latency(Duration::from_millis(1));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = tracker.summary();
        assert_eq!(summary.error_count, 800);
        assert_eq!(summary.sample_count, 800);
    }
}
