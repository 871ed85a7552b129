//! Storage layer backing the persisted error log
//!
//! Available implementations:
//! - File storage, one JSON document per key (default)
//! - In-memory storage (tests and offline runs)

pub mod error_log;
pub mod file_store;
pub mod memory_store;

use crate::error::Result;
use async_trait::async_trait;

pub use error_log::{ErrorLog, ErrorRecord, DEFAULT_ERROR_LOG_KEY, DEFAULT_MAX_RECORDS};
pub use file_store::FileStore;
pub use memory_store::MemoryStore;

/// Minimal async key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value stored under `key`
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Number of keys currently stored
    async fn item_count(&self) -> Result<usize>;
}
