//! Health monitoring of the engine's dependencies
//!
//! Four subsystems are tracked: the local bundler/dev server, the remote
//! API, device storage and the response-time budget. Each probe cycle
//! produces a fresh [`HealthSnapshot`] that replaces the previous one.

pub mod monitor;
pub mod probes;

pub use monitor::HealthMonitor;
pub use probes::{ApiProbe, BundlerProbe, HealthProbe, PerformanceProbe, StorageProbe};

use crate::error::ReliabilityError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A monitored subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    /// Local bundler / dev-server endpoint
    Bundler,
    /// Remote API
    Api,
    /// Device storage
    Storage,
    /// Response-time budget
    Performance,
}

impl Subsystem {
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Bundler,
        Subsystem::Api,
        Subsystem::Storage,
        Subsystem::Performance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Bundler => "bundler",
            Subsystem::Api => "api",
            Subsystem::Storage => "storage",
            Subsystem::Performance => "performance",
        }
    }

    /// Subsystems reached over the network; recovery may reconnect these
    pub fn is_network(&self) -> bool {
        matches!(self, Subsystem::Bundler | Subsystem::Api)
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = ReliabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bundler" | "metro" | "dev-server" => Ok(Subsystem::Bundler),
            "api" => Ok(Subsystem::Api),
            "storage" => Ok(Subsystem::Storage),
            "performance" => Ok(Subsystem::Performance),
            other => Err(ReliabilityError::config(format!("Unknown subsystem: {other}"))),
        }
    }
}

/// Status of one subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Not probed yet
    #[default]
    Unknown,
    /// Operating normally
    Healthy,
    /// Degraded but usable
    Warning,
    /// Unreachable or failing
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(name)
    }
}

/// Per-subsystem statuses from the last completed probe cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HealthSnapshot {
    statuses: BTreeMap<Subsystem, HealthStatus>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            statuses: Subsystem::ALL
                .iter()
                .map(|s| (*s, HealthStatus::Unknown))
                .collect(),
        }
    }
}

impl HealthSnapshot {
    /// Status of a subsystem (`Unknown` if absent)
    pub fn get(&self, subsystem: Subsystem) -> HealthStatus {
        self.statuses.get(&subsystem).copied().unwrap_or_default()
    }

    pub fn with_status(mut self, subsystem: Subsystem, status: HealthStatus) -> Self {
        self.statuses.insert(subsystem, status);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Subsystem, HealthStatus)> + '_ {
        self.statuses.iter().map(|(s, h)| (*s, *h))
    }

    /// Subsystems currently marked unhealthy
    pub fn unhealthy(&self) -> Vec<Subsystem> {
        self.iter()
            .filter(|(_, status)| *status == HealthStatus::Unhealthy)
            .map(|(subsystem, _)| subsystem)
            .collect()
    }
}

impl fmt::Display for HealthSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (subsystem, status) in self.iter() {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{subsystem}={status}")?;
            first = false;
        }
        Ok(())
    }
}
