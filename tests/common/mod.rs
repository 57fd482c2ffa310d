//! Shared helpers for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ecall_incidents::{
    config::{IndexMode, RepositoryConfig},
    models::NewIncident,
    repository::IncidentRepository,
    state::{InMemoryStore, KeyValueStore},
    AppError, Result,
};
use serde_json::Value;
use std::sync::Arc;

/// Typical intake payload from the reception console
pub fn sample_payload(caller: &str) -> NewIncident {
    NewIncident::new()
        .with("phoneNumber", "010-1234-5678")
        .with("callerName", caller)
        .with("location", "12 Harbor Road")
        .with("incidentType", "fire")
        .with("severity", "high")
        .with("status", "active")
}

pub fn repository_over(store: Arc<dyn KeyValueStore>, mode: IndexMode) -> IncidentRepository {
    let config = RepositoryConfig {
        index_mode: mode,
        ..RepositoryConfig::default()
    };
    IncidentRepository::with_config(store, &config)
}

/// In-memory store that hands control back to the scheduler before every
/// operation, so futures joined on one task interleave step by step
#[derive(Default)]
pub struct YieldingStore {
    inner: InMemoryStore,
}

impl YieldingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for YieldingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
    ) -> Result<bool> {
        tokio::task::yield_now().await;
        self.inner.compare_and_swap(key, expected, new).await
    }
}

/// Store whose backend is unreachable, wholly or for writes to one key
pub struct FailingStore {
    inner: InMemoryStore,
    reads_fail: bool,
    failing_write_key: Option<String>,
}

impl FailingStore {
    /// Every operation fails
    pub fn unreachable() -> Self {
        Self {
            inner: InMemoryStore::new(),
            reads_fail: true,
            failing_write_key: None,
        }
    }

    /// Reads and other writes go to `inner`; writes to `key` fail
    pub fn failing_writes_to(key: &str, inner: InMemoryStore) -> Self {
        Self {
            inner,
            reads_fail: false,
            failing_write_key: Some(key.to_string()),
        }
    }

    fn disk_gone() -> AppError {
        AppError::Database("disk gone".to_string())
    }

    fn check_read(&self) -> Result<()> {
        if self.reads_fail {
            return Err(Self::disk_gone());
        }
        Ok(())
    }

    fn check_write(&self, key: &str) -> Result<()> {
        match &self.failing_write_key {
            Some(failing) if failing != key => Ok(()),
            _ => Err(Self::disk_gone()),
        }
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check_read()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.check_write(key)?;
        self.inner.set(key, value).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&Value>,
        new: Value,
    ) -> Result<bool> {
        self.check_write(key)?;
        self.inner.compare_and_swap(key, expected, new).await
    }
}

/// Parse Prometheus text exposition into `metric name -> sample lines`
pub fn parse_prometheus_output(output: &str) -> std::collections::HashMap<String, Vec<String>> {
    let mut metrics = std::collections::HashMap::new();

    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let name_end = line.find(|c| c == '{' || c == ' ').unwrap_or(line.len());
        metrics
            .entry(line[..name_end].to_string())
            .or_insert_with(Vec::new)
            .push(line.to_string());
    }

    metrics
}
