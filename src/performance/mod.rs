//! Performance tracking: rolling latency window and error-rate summaries

pub mod tracker;
pub mod window;

pub use tracker::{PerformanceSummary, PerformanceTracker};
pub use window::{MetricsWindow, PerformanceSample, DEFAULT_WINDOW_CAPACITY};
