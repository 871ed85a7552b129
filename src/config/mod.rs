//! Configuration for the reliability engine
//!
//! Loaded from a TOML file, then overridden by `RELIABILITY_*` environment
//! variables. Every section has defaults so a partial file is valid.

use crate::error::{ReliabilityError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::{env, time::Duration};
use url::Url;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReliabilityConfig {
    /// Health probe configuration
    pub health: HealthConfig,

    /// Performance tracking configuration
    pub performance: PerformanceConfig,

    /// Circuit breaker configuration
    pub circuit_breaker: BreakerSettings,

    /// Automatic recovery configuration
    pub recovery: RecoveryConfig,

    /// Persisted error log configuration
    pub error_log: ErrorLogConfig,
}

/// Health probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between probe cycles
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,

    /// Timeout applied to every individual probe
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,

    /// Dev-server status endpoints, tried in order
    pub bundler_candidates: Vec<String>,

    /// Lightweight endpoint used to check the remote API
    pub api_url: String,

    /// Stored item count at which storage reports a warning
    pub storage_warning_threshold: usize,
}

/// Performance tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Interval between summary log emissions
    #[serde(with = "humantime_serde")]
    pub summary_interval: Duration,

    /// Number of latency samples kept in the rolling window
    pub window_capacity: usize,

    /// Average latency above which performance is reported as a warning
    #[serde(with = "humantime_serde")]
    pub latency_alert_threshold: Duration,

    /// Emit the periodic summary as a log event
    pub log_summaries: bool,
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Master switch; a disabled breaker never opens
    pub enabled: bool,

    /// Consecutive recoverable failures before the circuit opens
    pub failure_threshold: u32,

    /// Time the circuit stays open before a trial is allowed
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,

    /// Pass through HALF_OPEN on recovery instead of closing directly
    pub half_open_enabled: bool,

    /// Trial calls allowed while half-open
    pub half_open_max_trials: u32,

    /// Interval of the open-timeout checker
    #[serde(with = "humantime_serde")]
    pub check_interval: Duration,
}

/// Automatic recovery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Schedule a recovery attempt after each recoverable error
    pub auto_recovery: bool,

    /// Delay before the recovery attempt; defaults to the breaker recovery timeout
    #[serde(with = "humantime_serde")]
    pub recovery_delay: Option<Duration>,
}

/// Persisted error log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorLogConfig {
    /// Maximum number of records kept
    pub max_size: usize,

    /// Directory backing the key-value store
    pub storage_dir: PathBuf,

    /// Key the log is stored under
    pub key: String,

    /// Upper bound on a single read or write of the log
    #[serde(with = "humantime_serde")]
    pub storage_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            bundler_candidates: (8081..=8085)
                .map(|port| format!("http://localhost:{port}/status"))
                .collect(),
            api_url: "https://openrouter.ai/api/v1/models".to_string(),
            storage_warning_threshold: 1000,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            summary_interval: Duration::from_secs(30),
            window_capacity: 10,
            latency_alert_threshold: Duration::from_secs(5),
            log_summaries: true,
        }
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_enabled: true,
            half_open_max_trials: 1,
            check_interval: Duration::from_secs(10),
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_recovery: true,
            recovery_delay: None,
        }
    }
}

impl Default for ErrorLogConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            storage_dir: default_storage_dir(),
            key: "errorLog".to_string(),
            storage_timeout: Duration::from_secs(5),
        }
    }
}

fn default_storage_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".reliability-engine")
        .join("store")
}

impl ReliabilityConfig {
    /// Load configuration from a TOML file and apply environment overrides
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ReliabilityError::config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        let mut config: Self = toml::from_str(&content)
            .map_err(|e| ReliabilityError::config(format!("Failed to parse config: {e}")))?;

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Delay applied before an automatic recovery attempt
    pub fn recovery_delay(&self) -> Duration {
        self.recovery
            .recovery_delay
            .unwrap_or(self.circuit_breaker.recovery_timeout)
    }

    /// Override settings from `RELIABILITY_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(interval) = env_duration("RELIABILITY_HEALTH_CHECK_INTERVAL")? {
            self.health.check_interval = interval;
        }
        if let Some(timeout) = env_duration("RELIABILITY_PROBE_TIMEOUT")? {
            self.health.probe_timeout = timeout;
        }
        if let Ok(url) = env::var("RELIABILITY_API_URL") {
            self.health.api_url = url;
        }
        if let Ok(candidates) = env::var("RELIABILITY_BUNDLER_CANDIDATES") {
            self.health.bundler_candidates = candidates
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(interval) = env_duration("RELIABILITY_PERFORMANCE_INTERVAL")? {
            self.performance.summary_interval = interval;
        }
        if let Some(threshold) = env_duration("RELIABILITY_LATENCY_ALERT_THRESHOLD")? {
            self.performance.latency_alert_threshold = threshold;
        }
        if let Some(threshold) = env_parse::<u32>("RELIABILITY_FAILURE_THRESHOLD")? {
            self.circuit_breaker.failure_threshold = threshold;
        }
        if let Some(timeout) = env_duration("RELIABILITY_RECOVERY_TIMEOUT")? {
            self.circuit_breaker.recovery_timeout = timeout;
        }
        if let Some(enabled) = env_parse::<bool>("RELIABILITY_HALF_OPEN")? {
            self.circuit_breaker.half_open_enabled = enabled;
        }
        if let Some(enabled) = env_parse::<bool>("RELIABILITY_CIRCUIT_BREAKER")? {
            self.circuit_breaker.enabled = enabled;
        }
        if let Some(enabled) = env_parse::<bool>("RELIABILITY_AUTO_RECOVERY")? {
            self.recovery.auto_recovery = enabled;
        }
        if let Some(max_size) = env_parse::<usize>("RELIABILITY_ERROR_LOG_MAX")? {
            self.error_log.max_size = max_size;
        }
        if let Ok(dir) = env::var("RELIABILITY_STORAGE_DIR") {
            self.error_log.storage_dir = PathBuf::from(dir);
        }
        if let Some(timeout) = env_duration("RELIABILITY_STORAGE_TIMEOUT")? {
            self.error_log.storage_timeout = timeout;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("health.check_interval", self.health.check_interval),
            ("health.probe_timeout", self.health.probe_timeout),
            ("performance.summary_interval", self.performance.summary_interval),
            ("circuit_breaker.recovery_timeout", self.circuit_breaker.recovery_timeout),
            ("circuit_breaker.check_interval", self.circuit_breaker.check_interval),
            ("error_log.storage_timeout", self.error_log.storage_timeout),
        ];
        for (name, value) in intervals {
            if value.is_zero() {
                return Err(ReliabilityError::config(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ReliabilityError::config(
                "circuit_breaker.failure_threshold must be at least 1",
            ));
        }
        if self.circuit_breaker.half_open_max_trials == 0 {
            return Err(ReliabilityError::config(
                "circuit_breaker.half_open_max_trials must be at least 1",
            ));
        }
        if self.performance.window_capacity == 0 {
            return Err(ReliabilityError::config(
                "performance.window_capacity must be at least 1",
            ));
        }
        if self.error_log.max_size == 0 {
            return Err(ReliabilityError::config("error_log.max_size must be at least 1"));
        }
        if self.error_log.key.is_empty() {
            return Err(ReliabilityError::config("error_log.key cannot be empty"));
        }

        validate_http_url("health.api_url", &self.health.api_url)?;
        for candidate in &self.health.bundler_candidates {
            validate_http_url("health.bundler_candidates", candidate)?;
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let url = Url::parse(value)
        .map_err(|e| ReliabilityError::config(format!("Invalid {field} '{value}': {e}")))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ReliabilityError::config(format!(
            "{field} must use http or https scheme: {value}"
        )));
    }
    Ok(())
}

fn env_duration(name: &str) -> Result<Option<Duration>> {
    match env::var(name) {
        Ok(value) => humantime::parse_duration(&value)
            .map(Some)
            .map_err(|e| ReliabilityError::config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ReliabilityError::config(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
