//! Bounded, persisted log of handled errors
//!
//! The log lives under a single key as a JSON array, oldest first. Appends
//! are serialized so the FIFO cap holds under concurrent callers. Any
//! persistence failure is logged on the fallback target and swallowed:
//! recording an error must never fail the code path that reported it.
//! Every store access is bounded by the storage timeout, so a stalled
//! backend delays a report by at most that long.

use super::KeyValueStore;
use crate::error::{ReliabilityError, Result};
use crate::health::HealthSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Default storage key
pub const DEFAULT_ERROR_LOG_KEY: &str = "errorLog";

/// Default maximum number of stored records
pub const DEFAULT_MAX_RECORDS: usize = 100;

/// Default bound on a single store read or write
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// One handled error, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    /// When the error was handled (epoch milliseconds on disk)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Error message
    pub message: String,
    /// Stack trace, if the reporter had one
    pub stack_trace: Option<String>,
    /// Health snapshot at the time the error was handled
    pub health_status: HealthSnapshot,
}

/// Persisted FIFO of [`ErrorRecord`]s
#[derive(Debug)]
pub struct ErrorLog {
    store: Arc<dyn KeyValueStore>,
    key: String,
    max_size: usize,
    timeout: Duration,
    write_lock: Mutex<()>,
}

impl ErrorLog {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>, max_size: usize) -> Self {
        Self {
            store,
            key: key.into(),
            max_size: max_size.max(1),
            timeout: DEFAULT_STORAGE_TIMEOUT,
            write_lock: Mutex::new(()),
        }
    }

    /// Bound each store access by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Append a record, trimming the oldest entries past the cap
    pub async fn append(&self, record: ErrorRecord) {
        if let Err(e) = self.try_append(record).await {
            report_persistence_failure("append", &e);
        }
    }

    /// Append a record, surfacing persistence failures
    pub async fn try_append(&self, record: ErrorRecord) -> Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut records = match self.read_records().await {
            Ok(records) => records,
            Err(ReliabilityError::Json(e)) => {
                warn!(
                    target: "reliability::fallback",
                    key = %self.key,
                    "Stored error log is corrupt, starting a fresh log: {}", e
                );
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        records.push(record);
        if records.len() > self.max_size {
            let excess = records.len() - self.max_size;
            records.drain(..excess);
        }

        let serialized = serde_json::to_string(&records)?;
        self.bounded("write", self.store.set(&self.key, serialized)).await?;

        debug!(key = %self.key, stored = records.len(), "Error record persisted");
        Ok(records.len())
    }

    /// All stored records, oldest first; empty if the log cannot be read
    pub async fn load_all(&self) -> Vec<ErrorRecord> {
        match self.read_records().await {
            Ok(records) => records,
            Err(e) => {
                report_persistence_failure("load", &e);
                Vec::new()
            }
        }
    }

    async fn read_records(&self) -> Result<Vec<ErrorRecord>> {
        match self.bounded("read", self.store.get(&self.key)).await? {
            Some(content) if !content.trim().is_empty() => Ok(serde_json::from_str(&content)?),
            _ => Ok(Vec::new()),
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        access: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.timeout, access)
            .await
            .map_err(|_| {
                ReliabilityError::persistence(format!(
                    "{operation} of '{}' timed out after {:?}",
                    self.key, self.timeout
                ))
            })?
    }
}

fn report_persistence_failure(operation: &str, error: &ReliabilityError) {
    let error = if error.is_persistence() {
        error.to_string()
    } else {
        ReliabilityError::persistence(error.to_string()).to_string()
    };
    warn!(
        target: "reliability::fallback",
        operation,
        "Failed to {} error log: {}", operation, error
    );
}
