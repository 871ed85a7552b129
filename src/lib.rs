//! Reliability engine for applications with unreliable dependencies
//!
//! This crate watches the health of an application's dependencies (a local
//! dev server, a remote API, device storage and the response-time budget),
//! guards calls to them with circuit breakers and turns caught errors into
//! persisted records and scheduled recovery attempts.
//!
//! # Features
//!
//! - Periodic concurrent health probes with per-probe timeouts
//! - Per-dependency circuit breakers (closed / open / half-open)
//! - Recoverable/fatal error classification with automatic recovery
//! - Rolling latency window and error-rate summaries
//! - Bounded, persisted error log
//! - Deterministic testing through an injectable clock and paused tokio time

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod error_recovery;
pub mod health;
pub mod logging;
pub mod performance;
pub mod scheduler;
pub mod storage;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::ReliabilityConfig;
pub use engine::{EngineBuilder, ReliabilityEngine};
pub use error::{ErrorClass, ReliabilityError, ReportedError, Result};
pub use error_recovery::{CircuitBreakerStats, CircuitState, RecoveryHook};
pub use health::{HealthSnapshot, HealthStatus, Subsystem};
pub use performance::PerformanceSummary;
pub use storage::{ErrorRecord, FileStore, KeyValueStore, MemoryStore};
