use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Key-value backend configuration
    #[serde(default)]
    pub state: StateConfig,

    /// Incident repository behaviour
    #[serde(default)]
    pub repository: RepositoryConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/local.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: ECALL_)
            .add_source(
                config::Environment::with_prefix("ECALL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Prefix the incident and health routes are mounted under, e.g. `/make-server-dd6e4f12`
    #[serde(default)]
    pub path_prefix: String,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            path_prefix: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// State backend type
    #[serde(default)]
    pub backend: StateBackend,

    /// Path for the embedded database (sled)
    pub path: Option<PathBuf>,

    /// Redis connection string
    pub redis_url: Option<String>,

    /// Prefix prepended to every Redis key
    #[serde(default)]
    pub key_prefix: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            path: Some(PathBuf::from("./data/state")),
            redis_url: None,
            key_prefix: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StateBackend {
    Memory,
    #[default]
    Sled,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// How the active-incidents index is rewritten
    #[serde(default)]
    pub index_mode: IndexMode,

    /// Compare-and-swap attempts before giving up (compare_and_swap mode only)
    #[serde(default = "default_max_index_retries")]
    pub max_index_retries: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            index_mode: IndexMode::default(),
            max_index_retries: default_max_index_retries(),
        }
    }
}

/// Index update strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexMode {
    /// Read, edit locally, write the whole index back. Concurrent edits can be lost.
    #[default]
    ReadModifyWrite,
    /// Apply the edit through the store's compare-and-swap, retrying on conflict
    CompareAndSwap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_index_retries() -> u32 {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "ecall-incidents".to_string()
}

fn default_true() -> bool {
    true
}
