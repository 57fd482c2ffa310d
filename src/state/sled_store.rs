use crate::error::{AppError, Result};
use crate::state::KeyValueStore;
use async_trait::async_trait;
use serde_json::Value;
use sled::{Db, IVec};
use std::path::Path;
use std::sync::Arc;

/// Persistent key-value store using Sled embedded database
#[derive(Clone)]
pub struct SledStore {
    db: Arc<Db>,
    tree: sled::Tree,
}

impl SledStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref();
        let db = sled::open(&path).map_err(|e| {
            AppError::Database(format!("Failed to open Sled database: {}", e))
        })?;

        let tree = db.open_tree("kv").map_err(|e| {
            AppError::Database(format!("Failed to open kv tree: {}", e))
        })?;

        tracing::info!("Initialized Sled store at {:?}", path_str);

        Ok(Self {
            db: Arc::new(db),
            tree,
        })
    }

    fn encode(value: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            AppError::Serialization(format!("Failed to encode value: {}", e))
        })
    }

    fn decode(bytes: &IVec) -> Result<Value> {
        serde_json::from_slice(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to decode value: {}", e))
        })
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Database(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        self.db.size_on_disk().map_err(|e| {
            AppError::Database(format!("Failed to get database size: {}", e))
        })
    }
}

#[async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        match self.tree.get(key.as_bytes()) {
            Ok(Some(bytes)) => Ok(Some(Self::decode(&bytes)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(AppError::Database(format!(
                "Failed to get '{}': {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let bytes = Self::encode(&value)?;

        self.tree.insert(key.as_bytes(), bytes).map_err(|e| {
            AppError::Database(format!("Failed to set '{}': {}", key, e))
        })?;

        // Flush to ensure durability
        self.tree.flush_async().await.map_err(|e| {
            AppError::Database(format!("Failed to flush kv tree: {}", e))
        })?;

        tracing::debug!(key = %key, "Value stored in Sled");
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
    ) -> Result<bool> {
        // Compare decoded values, then swap against the exact bytes seen
        let current = self.tree.get(key.as_bytes())?;
        let current_value = current.as_ref().map(Self::decode).transpose()?;
        if current_value.as_ref() != expected {
            return Ok(false);
        }

        let swapped = self
            .tree
            .compare_and_swap(key.as_bytes(), current, Some(Self::encode(&new)?))
            .map_err(|e| {
                AppError::Database(format!("Failed to compare-and-swap '{}': {}", key, e))
            })?
            .is_ok();

        if swapped {
            self.tree.flush_async().await.map_err(|e| {
                AppError::Database(format!("Failed to flush kv tree: {}", e))
            })?;
        }

        Ok(swapped)
    }
}
