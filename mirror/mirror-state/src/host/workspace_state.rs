//! Small persisted key-value store for restoring UI state between runs.

use mirror_core::{MirrorError, Result};
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// JSON-file backed key-value store. Without a path it only lives in memory.
#[derive(Debug)]
pub struct WorkspaceState {
    path: Option<PathBuf>,
    values: RwLock<BTreeMap<String, Value>>,
}

impl WorkspaceState {
    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            values: RwLock::new(BTreeMap::new()),
        }
    }

    /// Load the store at `path`. A missing or unreadable file starts an empty store.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<BTreeMap<String, Value>>(&bytes) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Ignoring corrupt workspace state at {}: {e}", path.display());
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        debug!(keys = values.len(), "Loaded workspace state from {}", path.display());
        Ok(Self {
            path: Some(path),
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.read().get(key).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.read().keys().cloned().collect()
    }

    /// Set `key` to `value`, or remove it when `value` is `None`, then persist.
    pub async fn update<T: Serialize>(&self, key: &str, value: Option<T>) -> Result<()> {
        let snapshot = {
            let mut values = self.values.write();
            match value {
                Some(value) => {
                    values.insert(key.to_string(), serde_json::to_value(value)?);
                }
                None => {
                    values.remove(key);
                }
            }
            values.clone()
        };
        self.persist(&snapshot).await
    }

    async fn persist(&self, values: &BTreeMap<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_vec_pretty(values)?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await.map_err(|e| {
            MirrorError::internal(format!("Failed to replace {}: {e}", path.display()))
        })?;
        Ok(())
    }
}
