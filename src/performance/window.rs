//! Fixed-capacity rolling window of latency samples

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Default number of samples retained
pub const DEFAULT_WINDOW_CAPACITY: usize = 10;

/// A single observed latency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSample {
    /// Observed latency
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// When the sample was recorded
    pub recorded_at: DateTime<Utc>,
}

impl PerformanceSample {
    pub fn new(latency: Duration, recorded_at: DateTime<Utc>) -> Self {
        Self {
            latency,
            recorded_at,
        }
    }
}

/// Rolling buffer that evicts its oldest sample once full
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    capacity: usize,
    samples: VecDeque<PerformanceSample>,
}

impl MetricsWindow {
    /// Create a window holding at most `capacity` samples (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sample, evicting the oldest once over capacity
    pub fn record(&mut self, sample: PerformanceSample) {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    /// Mean latency of the retained samples; zero when empty
    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().map(|s| s.latency).sum();
        total / self.samples.len() as u32
    }

    pub fn count(&self) -> usize {
        self.samples.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples oldest-first
    pub fn samples(&self) -> impl Iterator<Item = &PerformanceSample> {
        self.samples.iter()
    }
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ms: u64) -> PerformanceSample {
        PerformanceSample::new(Duration::from_millis(ms), Utc::now())
    }

    #[test]
    fn test_empty_window_average_is_zero() {
        let window = MetricsWindow::default();
        assert_eq!(window.average(), Duration::ZERO);
        assert_eq!(window.count(), 0);
    }

    #[test]
    fn test_average() {
        let mut window = MetricsWindow::new(10);
        window.record(sample(100));
        window.record(sample(300));
        assert_eq!(window.average(), Duration::from_millis(200));
        assert_eq!(window.count(), 2);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut window = MetricsWindow::new(3);
        for ms in [1000, 10, 20, 30] {
            window.record(sample(ms));
        }

        assert_eq!(window.count(), 3);
        let latencies: Vec<u128> = window.samples().map(|s| s.latency.as_millis()).collect();
        assert_eq!(latencies, vec![10, 20, 30]);
        assert_eq!(window.average(), Duration::from_millis(20));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut window = MetricsWindow::new(0);
        window.record(sample(5));
        window.record(sample(7));
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.average(), Duration::from_millis(7));
    }
}
