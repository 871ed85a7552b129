//! Logging setup with optional daily-rotated file output

use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer};

const DEFAULT_LOG_FILE_NAME: &str = "reliability-engine.log";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` sets no directive
    pub level: Level,

    /// Log to a daily-rotated file
    pub file_path: Option<PathBuf>,

    /// Log to stderr
    pub stderr: bool,

    /// Emit JSON lines instead of the compact format
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            file_path: None,
            stderr: true,
            json: false,
        }
    }
}

impl LogConfig {
    /// Create config from environment
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            if let Some(level) = level_from_directive(&rust_log) {
                config.level = level;
            }
        }

        if let Ok(log_file) = std::env::var("RELIABILITY_LOG_FILE") {
            if !log_file.trim().is_empty() {
                config.file_path = Some(PathBuf::from(log_file));
            }
        }

        if let Ok(log_stderr) = std::env::var("RELIABILITY_LOG_STDERR") {
            config.stderr = log_stderr.to_lowercase() != "false";
        }

        if let Ok(json) = std::env::var("RELIABILITY_LOG_JSON") {
            config.json = matches!(json.to_lowercase().as_str(), "1" | "true" | "yes");
        }

        config
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// Most verbose level named in a `RUST_LOG` value
fn level_from_directive(directive: &str) -> Option<Level> {
    let directive = directive.to_lowercase();
    [
        ("trace", Level::TRACE),
        ("debug", Level::DEBUG),
        ("info", Level::INFO),
        ("warn", Level::WARN),
        ("error", Level::ERROR),
    ]
    .into_iter()
    .find(|(name, _)| directive.contains(name))
    .map(|(_, level)| level)
}

/// Initialize the global subscriber
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let stderr_layer = config.stderr.then(|| {
        let layer = fmt::layer().with_writer(std::io::stderr).with_target(true);
        if config.json {
            layer.json().boxed()
        } else {
            layer.compact().with_ansi(true).boxed()
        }
    });

    let file_layer = match &config.file_path {
        Some(file_path) => {
            let dir = file_path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = file_path
                .file_name()
                .unwrap_or_else(|| std::ffi::OsStr::new(DEFAULT_LOG_FILE_NAME));
            let appender = tracing_appender::rolling::daily(dir, file_name);

            let layer = fmt::layer().with_writer(appender).with_ansi(false);
            Some(if config.json {
                layer.json().boxed()
            } else {
                layer.boxed()
            })
        }
        None => None,
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_level_from_directive() {
        assert_eq!(level_from_directive("debug"), Some(Level::DEBUG));
        assert_eq!(
            level_from_directive("reliability_engine=trace,hyper=warn"),
            Some(Level::TRACE)
        );
        assert_eq!(level_from_directive("off"), None);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        temp_env::with_vars(
            [
                ("RUST_LOG", Some("warn")),
                ("RELIABILITY_LOG_FILE", Some("/tmp/reliability/engine.log")),
                ("RELIABILITY_LOG_STDERR", Some("false")),
                ("RELIABILITY_LOG_JSON", Some("true")),
            ],
            || {
                let config = LogConfig::from_env();
                assert_eq!(config.level, Level::WARN);
                assert_eq!(
                    config.file_path,
                    Some(PathBuf::from("/tmp/reliability/engine.log"))
                );
                assert!(!config.stderr);
                assert!(config.json);
            },
        );
    }

    #[test]
    #[serial]
    fn test_defaults_without_env() {
        temp_env::with_vars_unset(
            [
                "RUST_LOG",
                "RELIABILITY_LOG_FILE",
                "RELIABILITY_LOG_STDERR",
                "RELIABILITY_LOG_JSON",
            ],
            || {
                let config = LogConfig::from_env();
                assert_eq!(config.level, Level::INFO);
                assert!(config.file_path.is_none());
                assert!(config.stderr);
                assert!(!config.json);
            },
        );
    }
}
