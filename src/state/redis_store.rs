use crate::error::{AppError, Result};
use crate::state::KeyValueStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use serde_json::Value;
use std::sync::Arc;

/// Swap only if the current value matches. ARGV: absent-flag, expected, new.
const COMPARE_AND_SWAP_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if ARGV[1] == '1' then
  if current ~= false then return 0 end
elseif current ~= ARGV[2] then
  return 0
end
redis.call('SET', KEYS[1], ARGV[3])
return 1
"#;

/// Redis-based persistent key-value store
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    key_prefix: String,
    cas_script: Arc<Script>,
}

impl RedisStore {
    /// Create a new Redis store without key prefix
    pub async fn new(redis_url: &str) -> Result<Self> {
        Self::new_with_prefix(redis_url, "").await
    }

    /// Create a new Redis store with custom key prefix
    pub async fn new_with_prefix(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            AppError::Database(format!("Failed to create Redis client: {}", e))
        })?;

        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Redis: {}", e)))?;

        // Test connection
        let mut test_conn = connection.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut test_conn)
            .await
            .map_err(|e| AppError::Database(format!("Redis connection test failed: {}", e)))?;

        tracing::info!("Initialized Redis store with prefix '{}'", prefix);

        Ok(Self {
            connection,
            key_prefix: prefix.to_string(),
            cas_script: Arc::new(Script::new(COMPARE_AND_SWAP_SCRIPT)),
        })
    }

    /// Physical key for a logical key
    fn full_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    fn encode(value: &Value) -> Result<String> {
        serde_json::to_string(value).map_err(|e| {
            AppError::Serialization(format!("Failed to encode value: {}", e))
        })
    }

    fn decode(json: &str) -> Result<Value> {
        serde_json::from_str(json).map_err(|e| {
            AppError::Serialization(format!("Failed to decode value: {}", e))
        })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection.clone();

        let value: Option<String> = conn
            .get(self.full_key(key))
            .await
            .map_err(|e| AppError::Database(format!("Failed to get '{}': {}", key, e)))?;

        value.as_deref().map(Self::decode).transpose()
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut conn = self.connection.clone();
        let json = Self::encode(&value)?;

        let _: () = conn
            .set(self.full_key(key), json)
            .await
            .map_err(|e| AppError::Database(format!("Failed to set '{}': {}", key, e)))?;

        tracing::debug!(key = %key, "Value stored in Redis");
        Ok(())
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.clone();
        let full_keys: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();

        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&full_keys)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Database(format!("Failed to MGET {} keys: {}", keys.len(), e)))?;

        values
            .into_iter()
            .map(|v| v.as_deref().map(Self::decode).transpose())
            .collect()
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
    ) -> Result<bool> {
        let mut conn = self.connection.clone();

        let (absent_flag, expected_json) = match expected {
            Some(value) => ("0", Self::encode(value)?),
            None => ("1", String::new()),
        };

        let swapped: i32 = self
            .cas_script
            .key(self.full_key(key))
            .arg(absent_flag)
            .arg(expected_json)
            .arg(Self::encode(&new)?)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to compare-and-swap '{}': {}", key, e))
            })?;

        Ok(swapped == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Helper to check if Redis is available
    async fn redis_available() -> bool {
        match Client::open("redis://127.0.0.1:6379/15") {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(mut conn) => redis::cmd("PING")
                    .query_async::<_, String>(&mut conn)
                    .await
                    .is_ok(),
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    async fn create_test_store(prefix: &str) -> Option<RedisStore> {
        if !redis_available().await {
            return None;
        }

        RedisStore::new_with_prefix("redis://127.0.0.1:6379/15", prefix)
            .await
            .ok()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let Some(store) = create_test_store("test-set-get").await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        store.set("incident_1", json!({"status": "active"})).await.unwrap();
        let value = store.get("incident_1").await.unwrap();
        assert_eq!(value, Some(json!({"status": "active"})));

        let values = store
            .get_many(&["incident_1".to_string(), "nope".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some(json!({"status": "active"})), None]);
    }

    #[tokio::test]
    async fn test_compare_and_swap() {
        let Some(store) = create_test_store("test-cas").await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        store.set("idx", json!(["a"])).await.unwrap();

        assert!(!store.compare_and_swap("idx", None, json!(["b"])).await.unwrap());
        assert!(store
            .compare_and_swap("idx", Some(&json!(["a"])), json!(["a", "b"]))
            .await
            .unwrap());
        assert_eq!(store.get("idx").await.unwrap(), Some(json!(["a", "b"])));
    }
}
