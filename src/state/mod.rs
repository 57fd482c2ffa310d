pub mod store;
pub mod sled_store;
pub mod redis_store;
pub mod factory;

pub use store::*;
pub use sled_store::SledStore;
pub use redis_store::RedisStore;
pub use factory::{create_in_memory_store, create_store};

use crate::error::Result;
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;

/// Asynchronous mapping from string key to JSON value
///
/// Implementations only promise per-key atomicity of single operations;
/// anything spanning several calls can interleave with other writers.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Resolve several keys at once, preserving order
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        try_join_all(keys.iter().map(|key| self.get(key))).await
    }

    /// Replace the value under `key` with `new` only if it currently equals `expected`
    ///
    /// `expected == None` means the key must be absent. Returns whether the swap
    /// happened.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
    ) -> Result<bool>;
}
