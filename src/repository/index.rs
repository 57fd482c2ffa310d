use crate::config::IndexMode;
use crate::error::{AppError, Result};
use crate::metrics::INDEX_CAS_CONFLICTS_TOTAL;
use crate::state::KeyValueStore;
use serde_json::Value;
use std::sync::Arc;

/// Store key holding the ids of open incidents
pub const ACTIVE_INCIDENTS_KEY: &str = "active_incidents";

/// The active-incidents index: an ordered list of ids kept under one key
///
/// In [`IndexMode::ReadModifyWrite`] every edit reads the whole list and
/// writes it back, so two concurrent edits can overwrite each other.
/// [`IndexMode::CompareAndSwap`] retries the edit until the swap lands.
#[derive(Clone)]
pub struct ActiveIndex {
    store: Arc<dyn KeyValueStore>,
    mode: IndexMode,
    max_retries: u32,
}

impl ActiveIndex {
    pub fn new(store: Arc<dyn KeyValueStore>, mode: IndexMode, max_retries: u32) -> Self {
        Self {
            store,
            mode,
            max_retries: max_retries.max(1),
        }
    }

    pub fn mode(&self) -> IndexMode {
        self.mode
    }

    /// Current ids in index order; a missing index reads as empty
    pub async fn ids(&self) -> Result<Vec<String>> {
        let raw = self.store.get(ACTIVE_INCIDENTS_KEY).await?;
        decode(raw.as_ref())
    }

    /// Append an id unless it is already present
    pub async fn push(&self, id: &str) -> Result<()> {
        self.update(|ids| {
            if ids.iter().any(|existing| existing == id) {
                return false;
            }
            ids.push(id.to_string());
            true
        })
        .await?;
        Ok(())
    }

    /// Remove an id; returns whether it was present
    pub async fn remove(&self, id: &str) -> Result<bool> {
        self.update(|ids| {
            let before = ids.len();
            ids.retain(|existing| existing != id);
            ids.len() != before
        })
        .await
    }

    async fn update<F>(&self, edit: F) -> Result<bool>
    where
        F: Fn(&mut Vec<String>) -> bool,
    {
        match self.mode {
            IndexMode::ReadModifyWrite => {
                let mut ids = self.ids().await?;
                let changed = edit(&mut ids);
                self.store.set(ACTIVE_INCIDENTS_KEY, encode(ids)).await?;
                Ok(changed)
            }
            IndexMode::CompareAndSwap => {
                for attempt in 1..=self.max_retries {
                    let current = self.store.get(ACTIVE_INCIDENTS_KEY).await?;
                    let mut ids = decode(current.as_ref())?;
                    if !edit(&mut ids) {
                        return Ok(false);
                    }

                    if self
                        .store
                        .compare_and_swap(ACTIVE_INCIDENTS_KEY, current.as_ref(), encode(ids))
                        .await?
                    {
                        return Ok(true);
                    }

                    INDEX_CAS_CONFLICTS_TOTAL.inc();
                    tracing::debug!(attempt, "Active index changed concurrently, retrying");
                }

                tracing::warn!(
                    attempts = self.max_retries,
                    "Giving up on active index update"
                );
                Err(AppError::IndexContention {
                    key: ACTIVE_INCIDENTS_KEY.to_string(),
                    attempts: self.max_retries,
                })
            }
        }
    }
}

fn decode(raw: Option<&Value>) -> Result<Vec<String>> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
            AppError::Serialization(format!("Malformed active incidents index: {}", e))
        }),
    }
}

fn encode(ids: Vec<String>) -> Value {
    Value::Array(ids.into_iter().map(Value::String).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn index(mode: IndexMode) -> (ActiveIndex, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        (ActiveIndex::new(store.clone(), mode, 4), store)
    }

    #[tokio::test]
    async fn test_missing_index_reads_empty() {
        let (index, _) = index(IndexMode::ReadModifyWrite);
        assert!(index.ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_push_and_remove_preserve_order() {
        for mode in [IndexMode::ReadModifyWrite, IndexMode::CompareAndSwap] {
            let (index, store) = index(mode);

            index.push("a").await.unwrap();
            index.push("b").await.unwrap();
            index.push("c").await.unwrap();
            index.push("b").await.unwrap();
            assert_eq!(index.ids().await.unwrap(), vec!["a", "b", "c"]);

            assert!(index.remove("b").await.unwrap());
            assert!(!index.remove("zz").await.unwrap());
            assert_eq!(store.get(ACTIVE_INCIDENTS_KEY).await.unwrap(), Some(json!(["a", "c"])));
        }
    }

    #[tokio::test]
    async fn test_malformed_index_is_an_infrastructure_error() {
        let (index, store) = index(IndexMode::ReadModifyWrite);
        store.set(ACTIVE_INCIDENTS_KEY, json!({"not": "a list"})).await.unwrap();

        let err = index.ids().await.unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }

    /// Store whose compare-and-swap always loses
    struct AlwaysConflicting(InMemoryStore);

    #[async_trait]
    impl KeyValueStore for AlwaysConflicting {
        async fn get(&self, key: &str) -> Result<Option<Value>> {
            self.0.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> Result<()> {
            self.0.set(key, value).await
        }

        async fn compare_and_swap(&self, _: &str, _: Option<&Value>, _: Value) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_compare_and_swap_gives_up_after_max_retries() {
        let store = Arc::new(AlwaysConflicting(InMemoryStore::new()));
        let index = ActiveIndex::new(store, IndexMode::CompareAndSwap, 3);

        let err = index.push("a").await.unwrap_err();
        assert!(matches!(err, AppError::IndexContention { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_compare_and_swap_skips_noop_edits() {
        let store = Arc::new(AlwaysConflicting(InMemoryStore::new()));
        let index = ActiveIndex::new(store, IndexMode::CompareAndSwap, 3);

        // Nothing to remove, so no swap is attempted
        assert!(!index.remove("a").await.unwrap());
    }
}
