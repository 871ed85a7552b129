//! Directory-backed key-value store
//!
//! Each key maps to `<dir>/<key>.json`. Writes go to a temp file that is
//! renamed into place, so a crash never leaves a half-written value.

use super::KeyValueStore;
use crate::error::{ReliabilityError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

const FILE_EXTENSION: &str = "json";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(ReliabilityError::persistence(format!(
                "Invalid storage key: {key:?}"
            )));
        }
        Ok(self.dir.join(format!("{key}.{FILE_EXTENSION}")))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ReliabilityError::persistence(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ReliabilityError::persistence(format!(
                "Failed to create storage directory {}: {e}",
                self.dir.display()
            ))
        })?;

        let tmp = path.with_extension(format!("{FILE_EXTENSION}.tmp"));
        tokio::fs::write(&tmp, value).await.map_err(|e| {
            ReliabilityError::persistence(format!("Failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            ReliabilityError::persistence(format!("Failed to replace {}: {e}", path.display()))
        })?;

        debug!("Persisted key {} to {:?}", key, path);
        Ok(())
    }

    async fn item_count(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(ReliabilityError::persistence(format!(
                    "Failed to list {}: {e}",
                    self.dir.display()
                )))
            }
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store"));

        assert_eq!(store.item_count().await.unwrap(), 0);
        assert_eq!(store.get("errorLog").await.unwrap(), None);

        store.set("errorLog", "[]".to_string()).await.unwrap();
        store.set("settings", "{}".to_string()).await.unwrap();
        store.set("errorLog", "[1]".to_string()).await.unwrap();

        assert_eq!(store.get("errorLog").await.unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.item_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(store.set("../escape", "x".to_string()).await.is_err());
        assert!(store.get("").await.is_err());
    }
}
