//! Key-value storage backends
//!
//! The store persists JSON values under string keys, the shape of a browser
//! extension's storage area. Backends may enforce a per-item byte quota;
//! chunking exists precisely because real backends do.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde_json::Value;

/// Error type for backend operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("item {key:?} exceeds the per-item capacity: {size} > {limit} bytes")]
    QuotaExceeded {
        key: String,
        size: usize,
        limit: usize,
    },
}

/// A size-constrained key-value store.
pub trait StorageBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
    fn keys(&self) -> Result<Vec<String>, StorageError>;
}

// =============================================================================
// MemoryBackend
// =============================================================================

/// In-memory backend for tests and the wasm host.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: BTreeMap<String, Value>,
    max_item_bytes: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce a per-item quota, measured like a browser storage area: the
    /// key length plus the serialized value length.
    pub fn with_quota(max_item_bytes: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            max_item_bytes: Some(max_item_bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.items.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        if let Some(limit) = self.max_item_bytes {
            let size = key.len() + serde_json::to_string(&value)?.len();
            if size > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size,
                    limit,
                });
            }
        }
        self.items.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.items.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.items.keys().cloned().collect())
    }
}

// =============================================================================
// JsonFileBackend
// =============================================================================

/// File-backed storage: the whole key space persisted as one JSON object.
///
/// Every operation reloads and rewrites the file, which is plenty for a CLI
/// managing a few thousand patterns.
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn load(&self) -> Result<serde_json::Map<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(serde_json::Map::new());
        }
        let text = fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn save(&self, items: &serde_json::Map<String, Value>) -> Result<(), StorageError> {
        let text = serde_json::to_string_pretty(&Value::Object(items.clone()))?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

impl StorageBackend for JsonFileBackend {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.load()?.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut items = self.load()?;
        items.insert(key.to_string(), value);
        self.save(&items)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let mut items = self.load()?;
        items.remove(key);
        self.save(&items)
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.load()?.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_backend_round_trip() {
        let mut backend = MemoryBackend::new();
        backend.set("a", json!(["x", "y"])).unwrap();
        assert_eq!(backend.get("a").unwrap(), Some(json!(["x", "y"])));
        backend.remove("a").unwrap();
        assert_eq!(backend.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_backend_quota() {
        let mut backend = MemoryBackend::with_quota(16);
        backend.set("k", json!("short")).unwrap();
        let err = backend
            .set("k", json!("far too long for the quota"))
            .unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { .. }));
    }

    #[test]
    fn test_json_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = JsonFileBackend::new(dir.path().join("store.json"));

        assert_eq!(backend.get("missing").unwrap(), None);
        backend.set("list", json!(["alice"])).unwrap();
        backend.set("meta", json!({"totalCount": 1})).unwrap();

        let reopened = JsonFileBackend::new(backend.path());
        assert_eq!(reopened.get("list").unwrap(), Some(json!(["alice"])));
        assert_eq!(
            reopened.keys().unwrap(),
            vec!["list".to_string(), "meta".to_string()]
        );
    }
}
