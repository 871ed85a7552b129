//! Error types for the reliability engine
//!
//! Two families of errors live here. `ReliabilityError` covers faults raised
//! by the engine itself (configuration, persistence, probes). `ReportedError`
//! is what the rest of the application hands to the engine when it catches a
//! failure; the engine classifies it into an [`ErrorClass`] and absorbs it.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, ReliabilityError>;

/// Errors raised by the engine's own components
#[derive(Error, Debug)]
pub enum ReliabilityError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Error log or store could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// A health probe failed to produce a result
    #[error("Probe failed: {0}")]
    Probe(String),

    /// Circuit breaker asked to make a transition its state machine forbids
    #[error("Invalid circuit breaker transition: {0}")]
    InvalidTransition(String),

    /// Operation requires an initialized engine
    #[error("Engine not initialized: {0}")]
    NotInitialized(String),
}

impl ReliabilityError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a persistence error
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a probe error
    pub fn probe<S: Into<String>>(msg: S) -> Self {
        Self::Probe(msg.into())
    }

    /// Create an invalid transition error
    pub fn invalid_transition<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTransition(msg.into())
    }

    /// Create a not-initialized error
    pub fn not_initialized<S: Into<String>>(msg: S) -> Self {
        Self::NotInitialized(msg.into())
    }

    /// Check if error came from the persistence layer
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            ReliabilityError::Persistence(_) | ReliabilityError::Io(_) | ReliabilityError::Json(_)
        )
    }
}

/// Outcome of classifying a reported error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Transient fault (network, timeout, 5xx); counts toward the breaker
    Recoverable,
    /// Anything else; recorded and reported, never retried
    Fatal,
}

impl ErrorClass {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorClass::Recoverable)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorClass::Recoverable => write!(f, "recoverable"),
            ErrorClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// An error caught somewhere in the application and handed to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedError {
    /// Error message as produced by the failing code path
    pub message: String,
    /// Optional stack trace or backtrace text
    pub stack_trace: Option<String>,
    /// Guarded dependency the failure belongs to (defaults to `api`)
    pub dependency: Option<String>,
}

impl ReportedError {
    /// Create a reported error from a message
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
            dependency: None,
        }
    }

    /// Attach a stack trace
    pub fn with_stack_trace<S: Into<String>>(mut self, stack_trace: S) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// Attribute the failure to a named dependency
    pub fn for_dependency<S: Into<String>>(mut self, dependency: S) -> Self {
        self.dependency = Some(dependency.into());
        self
    }
}

impl From<&ReliabilityError> for ReportedError {
    fn from(error: &ReliabilityError) -> Self {
        ReportedError::new(error.to_string())
    }
}

impl From<&std::io::Error> for ReportedError {
    fn from(error: &std::io::Error) -> Self {
        ReportedError::new(error.to_string())
    }
}

impl From<&reqwest::Error> for ReportedError {
    fn from(error: &reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("timeout: {error}")
        } else if error.is_connect() {
            format!("network error: {error}")
        } else {
            error.to_string()
        };
        ReportedError::new(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_helpers() {
        let error = ReliabilityError::persistence("disk full");
        assert!(error.is_persistence());
        assert_eq!(error.to_string(), "Persistence error: disk full");

        let error = ReliabilityError::timeout("api probe");
        assert!(!error.is_persistence());
    }

    #[test]
    fn test_reported_error_builder() {
        let reported = ReportedError::new("network request failed")
            .with_stack_trace("at fetch (app.js:10)")
            .for_dependency("bundler");

        assert_eq!(reported.message, "network request failed");
        assert_eq!(reported.stack_trace.as_deref(), Some("at fetch (app.js:10)"));
        assert_eq!(reported.dependency.as_deref(), Some("bundler"));
    }

    #[test]
    fn test_reported_error_from_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout");
        let reported = ReportedError::from(&io);
        assert_eq!(reported.message, "read timeout");
    }
}
