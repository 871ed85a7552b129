//! Reliability Engine - command line entry point
//!
//! Runs the engine until interrupted, or performs one-shot operations
//! against the configured probes and persisted error log.

use anyhow::Context;
use clap::{Parser, Subcommand};
use reliability_engine::{
    logging::{init_logging, LogConfig},
    ReliabilityConfig, ReliabilityEngine, ReportedError,
};
use std::path::PathBuf;
use tracing::{info, Level};

/// Reliability Engine Configuration
#[derive(Parser, Debug)]
#[command(name = "reliability-engine")]
#[command(about = "Health monitoring, circuit breaking and error recovery for app dependencies")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "RELIABILITY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine until Ctrl-C
    Run,
    /// Run one probe cycle and print the health snapshot as JSON
    Probe,
    /// Print the persisted error log as JSON
    Errors,
    /// Classify and record a single error
    Report {
        /// Error message
        message: String,

        /// Stack trace to store with the record
        #[arg(long)]
        stack_trace: Option<String>,

        /// Dependency the error belongs to
        #[arg(long)]
        dependency: Option<String>,
    },
}

impl Cli {
    fn initialize_logging(&self) -> anyhow::Result<()> {
        let mut config = LogConfig::from_env();
        if self.debug {
            config = config.with_level(Level::DEBUG);
        }
        init_logging(config).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))
    }

    fn load_config(&self) -> anyhow::Result<ReliabilityConfig> {
        let config = match &self.config {
            Some(path) => ReliabilityConfig::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => ReliabilityConfig::from_env()?,
        };
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    cli.initialize_logging()?;

    let config = cli.load_config()?;
    let engine = ReliabilityEngine::new(config)?;

    match cli.command {
        Command::Run => {
            engine.initialize().await;
            info!("Press Ctrl-C to stop");
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl-C")?;
            engine.shutdown().await;
        }
        Command::Probe => {
            let snapshot = engine.run_probe_cycle().await;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Command::Errors => {
            let records = engine.recent_errors().await;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Command::Report {
            message,
            stack_trace,
            dependency,
        } => {
            let mut error = ReportedError::new(message);
            if let Some(stack_trace) = stack_trace {
                error = error.with_stack_trace(stack_trace);
            }
            if let Some(dependency) = dependency {
                error = error.for_dependency(dependency);
            }

            let class = engine.report_error(&error).await;
            println!("{class}");
        }
    }

    Ok(())
}
