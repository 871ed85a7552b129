//! Error recovery for unreliable dependencies
//!
//! Classification of reported errors, per-dependency circuit breakers and
//! the coordinator that ties them to the error log and health monitor.

pub mod circuit_breaker;
pub mod classifier;
pub mod coordinator;

// Re-export commonly used types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitBreakerStats, CircuitState,
};
pub use classifier::ErrorClassifier;
pub use coordinator::{
    ErrorRecoveryCoordinator, LoggingRecoveryHook, RecoveryHook, RecoverySettings,
    DEFAULT_DEPENDENCY,
};
