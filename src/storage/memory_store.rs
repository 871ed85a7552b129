//! In-memory key-value store

use super::KeyValueStore;
use crate::error::{ReliabilityError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Volatile store; can be switched offline to simulate storage failures
#[derive(Debug)]
pub struct MemoryStore {
    data: RwLock<HashMap<String, String>>,
    available: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every subsequent operation succeed or fail
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ReliabilityError::persistence("storage unavailable"))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.check_available()?;
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn item_count(&self) -> Result<usize> {
        self.check_available()?;
        Ok(self.data.read().await.len())
    }
}
