//! Circuit breaker guarding calls to unreliable dependencies
//!
//! The breaker is an explicit state machine:
//!
//! ```text
//! CLOSED --(failure_threshold recoverable failures)--> OPEN
//! OPEN   --(next_attempt_time reached)---------------> HALF_OPEN (or CLOSED)
//! HALF_OPEN --(success)------------------------------> CLOSED
//! HALF_OPEN --(failure)------------------------------> OPEN
//! ```
//!
//! OPEN never moves on its own: the periodic checker calls
//! [`CircuitBreaker::check_timeout`] to expire it. The same checker hands out
//! fresh trials when every half-open trial went unreported for a full
//! recovery timeout.

use crate::clock::{Clock, SystemClock};
use crate::config::BreakerSettings;
use crate::error::{ErrorClass, ReliabilityError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Circuit is closed - normal operation
    Closed,
    /// Circuit is open - operations blocked
    Open,
    /// Circuit is half-open - testing if service recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Edges the state machine allows
pub fn is_valid_transition(from: CircuitState, to: CircuitState) -> bool {
    matches!(
        (from, to),
        (CircuitState::Closed, CircuitState::Open)
            | (CircuitState::Open, CircuitState::HalfOpen)
            | (CircuitState::Open, CircuitState::Closed)
            | (CircuitState::HalfOpen, CircuitState::Closed)
            | (CircuitState::HalfOpen, CircuitState::Open)
    )
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// A disabled breaker counts nothing and allows every call
    pub enabled: bool,
    /// Failure threshold before opening circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial is allowed
    pub recovery_timeout: Duration,
    /// Pass through HALF_OPEN instead of closing directly on expiry
    pub half_open_enabled: bool,
    /// Trial calls let through while half-open
    pub half_open_max_trials: u32,
    /// Enable detailed logging
    pub detailed_logging: bool,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout: Duration::seconds(60),
            half_open_enabled: true,
            half_open_max_trials: 1,
            detailed_logging: false,
        }
    }
}

impl From<&BreakerSettings> for CircuitBreakerConfig {
    fn from(settings: &BreakerSettings) -> Self {
        Self {
            enabled: settings.enabled,
            failure_threshold: settings.failure_threshold,
            recovery_timeout: Duration::from_std(settings.recovery_timeout)
                .unwrap_or_else(|_| Duration::days(1)),
            half_open_enabled: settings.half_open_enabled,
            half_open_max_trials: settings.half_open_max_trials.max(1),
            detailed_logging: false,
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Current state
    pub state: CircuitState,
    /// Recoverable failures counted toward the threshold
    pub failure_count: u32,
    /// Last recoverable failure
    pub last_failure_time: Option<DateTime<Utc>>,
    /// When an open circuit may be tried again
    pub next_attempt_time: Option<DateTime<Utc>>,
    /// Successful operations reported
    pub successful_requests: u64,
    /// Recoverable failures reported
    pub failed_requests: u64,
    /// Requests rejected while open
    pub blocked_requests: u64,
    /// Number of times the circuit opened
    pub circuit_open_count: u64,
}

/// Internal circuit breaker state
#[derive(Debug)]
struct CircuitBreakerState {
    current_state: CircuitState,
    failure_count: u32,
    last_failure_time: Option<DateTime<Utc>>,
    next_attempt_time: Option<DateTime<Utc>>,
    half_open_trials: u32,
    trial_deadline: Option<DateTime<Utc>>,
    successful_requests: u64,
    failed_requests: u64,
    blocked_requests: u64,
    circuit_open_count: u64,
}

impl CircuitBreakerState {
    fn new() -> Self {
        Self {
            current_state: CircuitState::Closed,
            failure_count: 0,
            last_failure_time: None,
            next_attempt_time: None,
            half_open_trials: 0,
            trial_deadline: None,
            successful_requests: 0,
            failed_requests: 0,
            blocked_requests: 0,
            circuit_open_count: 0,
        }
    }
}

/// Circuit breaker for a single named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    state: RwLock<CircuitBreakerState>,
}

impl CircuitBreaker {
    /// Create new circuit breaker
    pub fn new<S: Into<String>>(name: S, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    pub fn with_clock<S: Into<String>>(
        name: S,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            clock,
            state: RwLock::new(CircuitBreakerState::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub async fn current_state(&self) -> CircuitState {
        self.state.read().await.current_state
    }

    /// True while calls are being rejected
    pub async fn is_open(&self) -> bool {
        self.config.enabled && self.state.read().await.current_state == CircuitState::Open
    }

    /// Ask to issue a guarded call; consumes a trial while half-open
    pub async fn allow_request(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let mut state = self.state.write().await;
        match state.current_state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                state.blocked_requests += 1;
                if self.config.detailed_logging {
                    debug!(breaker = %self.name, "Circuit breaker open, blocking request");
                }
                false
            }
            CircuitState::HalfOpen => {
                if state.half_open_trials < self.config.half_open_max_trials {
                    state.half_open_trials += 1;
                    if state.trial_deadline.is_none() {
                        state.trial_deadline =
                            Some(self.clock.now() + self.config.recovery_timeout);
                    }
                    debug!(
                        breaker = %self.name,
                        trial = state.half_open_trials,
                        "Circuit breaker half-open, allowing trial request"
                    );
                    true
                } else {
                    state.blocked_requests += 1;
                    false
                }
            }
        }
    }

    /// Record successful operation
    pub async fn report_success(&self) {
        if !self.config.enabled {
            return;
        }

        let mut state = self.state.write().await;
        state.successful_requests += 1;

        match state.current_state {
            CircuitState::Closed => {
                state.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.transition_state(&mut state, CircuitState::Closed);
                info!(breaker = %self.name, "Circuit breaker closed after successful trial");
            }
            CircuitState::Open => {
                warn!(
                    breaker = %self.name,
                    "Success recorded while circuit is open - ignoring"
                );
            }
        }
    }

    /// Record a failed operation; fatal failures leave the state untouched
    pub async fn report_failure(&self, class: ErrorClass) -> CircuitState {
        let mut state = self.state.write().await;

        if !self.config.enabled || !class.is_recoverable() {
            if self.config.detailed_logging {
                debug!(breaker = %self.name, %class, "Failure not counted by circuit breaker");
            }
            return state.current_state;
        }

        let now = self.clock.now();
        state.failed_requests += 1;
        state.last_failure_time = Some(now);

        match state.current_state {
            CircuitState::Closed => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    let failures = state.failure_count;
                    self.transition_state(&mut state, CircuitState::Open);
                    error!(
                        breaker = %self.name,
                        failures,
                        "Circuit breaker opened after {} failures", failures
                    );
                }
            }
            CircuitState::HalfOpen => {
                // Single failure in half-open state reopens the circuit
                self.transition_state(&mut state, CircuitState::Open);
                warn!(breaker = %self.name, "Circuit breaker reopened after failed trial");
            }
            CircuitState::Open => {
                debug!(breaker = %self.name, "Failure recorded while circuit is open");
            }
        }

        state.current_state
    }

    /// Expire an open circuit whose recovery timeout has elapsed, and renew
    /// half-open trials whose outcome was never reported
    pub async fn check_timeout(&self) -> CircuitState {
        let mut state = self.state.write().await;
        let now = self.clock.now();

        match state.current_state {
            CircuitState::Open => {
                let due = state.next_attempt_time.map_or(true, |next| now >= next);
                if due {
                    self.leave_open(&mut state);
                }
            }
            CircuitState::HalfOpen => {
                let exhausted = state.half_open_trials >= self.config.half_open_max_trials;
                let expired = state.trial_deadline.is_some_and(|deadline| now >= deadline);
                if exhausted && expired {
                    warn!(
                        breaker = %self.name,
                        trials = state.half_open_trials,
                        "No outcome reported for half-open trials, allowing new trials"
                    );
                    state.half_open_trials = 0;
                    state.trial_deadline = None;
                }
            }
            CircuitState::Closed => {}
        }
        state.current_state
    }

    /// A recovery probe found the dependency reachable again
    pub async fn recovery_succeeded(&self) -> CircuitState {
        let mut state = self.state.write().await;
        if state.current_state == CircuitState::Open {
            info!(breaker = %self.name, "Recovery probe succeeded, ending open period early");
            self.leave_open(&mut state);
        }
        state.current_state
    }

    /// Get current statistics
    pub async fn get_stats(&self) -> CircuitBreakerStats {
        let state = self.state.read().await;
        CircuitBreakerStats {
            state: state.current_state,
            failure_count: state.failure_count,
            last_failure_time: state.last_failure_time,
            next_attempt_time: state.next_attempt_time,
            successful_requests: state.successful_requests,
            failed_requests: state.failed_requests,
            blocked_requests: state.blocked_requests,
            circuit_open_count: state.circuit_open_count,
        }
    }

    fn leave_open(&self, state: &mut CircuitBreakerState) {
        if self.config.half_open_enabled {
            self.transition_state(state, CircuitState::HalfOpen);
            info!(breaker = %self.name, "Circuit breaker half-open - testing connection");
        } else {
            self.transition_state(state, CircuitState::Closed);
            info!(breaker = %self.name, "Circuit breaker closed - resuming normal operation");
        }
    }

    /// Transition to new state
    fn transition_state(&self, state: &mut CircuitBreakerState, new_state: CircuitState) {
        let old_state = state.current_state;
        if !is_valid_transition(old_state, new_state) {
            let error = ReliabilityError::invalid_transition(format!(
                "{}: {old_state} -> {new_state}",
                self.name
            ));
            debug_assert!(false, "{error}");
            error!(breaker = %self.name, "{error}; falling back to CLOSED");
            Self::force_closed(state);
            return;
        }

        state.current_state = new_state;
        state.failure_count = 0;
        state.half_open_trials = 0;
        state.trial_deadline = None;
        state.next_attempt_time = None;

        if new_state == CircuitState::Open {
            state.circuit_open_count += 1;
            state.next_attempt_time = Some(self.clock.now() + self.config.recovery_timeout);
        }

        debug!(
            breaker = %self.name,
            from = %old_state,
            to = %new_state,
            "Circuit breaker state transition"
        );
    }

    fn force_closed(state: &mut CircuitBreakerState) {
        state.current_state = CircuitState::Closed;
        state.failure_count = 0;
        state.half_open_trials = 0;
        state.trial_deadline = None;
        state.next_attempt_time = None;
    }
}

/// Circuit breakers keyed by dependency name
#[derive(Debug)]
pub struct CircuitBreakerManager {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreakerManager {
    /// Create new circuit breaker manager
    pub fn new(default_config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
            clock,
        }
    }

    /// Get or create circuit breaker for a dependency
    pub async fn get_breaker(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(name) {
            return breaker.clone();
        }

        let mut breakers = self.breakers.write().await;
        breakers
            .entry(name.to_string())
            .or_insert_with(|| {
                info!("Created new circuit breaker for dependency: {}", name);
                Arc::new(CircuitBreaker::with_clock(
                    name,
                    self.default_config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Existing breaker, without creating one
    pub async fn find(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.read().await.get(name).cloned()
    }

    /// Expire every open breaker whose timeout has elapsed
    pub async fn check_all_timeouts(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.read().await.values().cloned().collect();
        for breaker in breakers {
            breaker.check_timeout().await;
        }
    }

    /// Get all circuit breaker statistics
    pub async fn get_all_stats(&self) -> HashMap<String, CircuitBreakerStats> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.read().await.values().cloned().collect();
        let mut stats = HashMap::new();
        for breaker in breakers {
            stats.insert(breaker.name().to_string(), breaker.get_stats().await);
        }
        stats
    }
}
