//! Configuration management for the Data API client
//!
//! This module handles loading, parsing, and managing configuration from various sources:
//! - Configuration files (TOML format)
//! - Environment variables
//!
//! Configuration precedence (highest to lowest):
//! 1. Environment variables (`ASTRA_DATA_API_*`)
//! 2. Configuration file
//! 3. Default values

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::admin::BackendKind;
use crate::error::{ConfigError, Result};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "ASTRA_DATA_API_";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint and credentials
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Multi-request write defaults
    #[serde(default)]
    pub batch: BatchConfig,

    /// DevOps API and polling defaults
    #[serde(default)]
    pub admin: AdminConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event channel configuration
    #[serde(default)]
    pub events: EventsConfig,
}

/// Connection-related configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Data API endpoint, e.g. `https://<db-id>-<region>.apps.astra.datastax.com`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Application token (falls back to `ASTRA_DB_APPLICATION_TOKEN`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Keyspace used when none is given
    #[serde(default = "default_keyspace")]
    pub keyspace: String,

    /// Path of the JSON API below the endpoint
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Kind of server behind the endpoint
    #[serde(default)]
    pub backend: BackendKind,

    /// Timeout of a single request in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Multi-request write defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Stop at the first failure and dispatch in sequence
    #[serde(default)]
    pub ordered: bool,

    /// Requests in flight for unordered writes
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Documents per `insertMany` request
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// DevOps API and long-running operation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminConfig {
    /// DevOps API base URL
    #[serde(default = "default_devops_url")]
    pub devops_url: String,

    /// Poll interval of database create/terminate in milliseconds
    #[serde(default = "default_database_poll_interval_ms")]
    pub database_poll_interval_ms: u64,

    /// Poll interval of keyspace create/drop in milliseconds
    #[serde(default = "default_keyspace_poll_interval_ms")]
    pub keyspace_poll_interval_ms: u64,

    /// Wait budget of database operations in milliseconds (0 = unbounded)
    #[serde(default = "default_database_timeout_ms")]
    pub database_timeout_ms: u64,

    /// Wait budget of keyspace operations in milliseconds (0 = unbounded)
    #[serde(default = "default_keyspace_timeout_ms")]
    pub keyspace_timeout_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub level: LogLevel,

    /// Enable timestamps in logs
    #[serde(default = "default_log_timestamps")]
    pub timestamps: bool,
}

/// Log level options
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Event channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Events buffered per subscriber before the oldest are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

// Default value functions
fn default_keyspace() -> String {
    "default_keyspace".to_string()
}

fn default_api_path() -> String {
    "api/json/v1".to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_concurrency() -> usize {
    crate::batch::DEFAULT_CONCURRENCY
}

fn default_chunk_size() -> usize {
    crate::batch::DEFAULT_CHUNK_SIZE
}

fn default_devops_url() -> String {
    "https://api.astra.datastax.com/v2".to_string()
}

fn default_database_poll_interval_ms() -> u64 {
    10_000
}

fn default_keyspace_poll_interval_ms() -> u64 {
    1_000
}

fn default_database_timeout_ms() -> u64 {
    600_000
}

fn default_keyspace_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> LogLevel {
    LogLevel::Warn
}

fn default_log_timestamps() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            keyspace: default_keyspace(),
            api_path: default_api_path(),
            backend: BackendKind::default(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            ordered: false,
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            devops_url: default_devops_url(),
            database_poll_interval_ms: default_database_poll_interval_ms(),
            keyspace_poll_interval_ms: default_keyspace_poll_interval_ms(),
            database_timeout_ms: default_database_timeout_ms(),
            keyspace_timeout_ms: default_keyspace_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            timestamps: default_log_timestamps(),
        }
    }
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file (TOML format)
    ///
    /// # Returns
    /// * `Result<ClientConfig>` - Loaded configuration or error
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration from multiple sources with proper precedence
    ///
    /// The default file is optional; environment overrides are applied on top
    /// and the result is validated.
    ///
    /// # Returns
    /// * `Result<ClientConfig>` - Merged configuration or error
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables over the defaults
    ///
    /// Environment variables are prefixed with `ASTRA_DATA_API_`
    /// Example: `ASTRA_DATA_API_CONNECTION_REQUEST_TIMEOUT_MS=60000`
    ///
    /// # Returns
    /// * `Result<ClientConfig>` - Configuration from environment or default
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, `None` when unset
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(&format!("{ENV_PREFIX}{key}"));

        if let Some(endpoint) = var("CONNECTION_ENDPOINT") {
            self.connection.endpoint = Some(endpoint);
        }
        if let Some(token) = var("CONNECTION_TOKEN") {
            self.connection.token = Some(token);
        }
        if let Some(keyspace) = var("CONNECTION_KEYSPACE") {
            self.connection.keyspace = keyspace;
        }
        if let Some(api_path) = var("CONNECTION_API_PATH") {
            self.connection.api_path = api_path;
        }
        if let Some(backend) = var("CONNECTION_BACKEND") {
            self.connection.backend = backend.parse()?;
        }
        if let Some(value) = var("CONNECTION_REQUEST_TIMEOUT_MS") {
            self.connection.request_timeout_ms = parse_field("connection.request_timeout_ms", &value)?;
        }
        if let Some(value) = var("BATCH_ORDERED") {
            self.batch.ordered = parse_field("batch.ordered", &value)?;
        }
        if let Some(value) = var("BATCH_CONCURRENCY") {
            self.batch.concurrency = parse_field("batch.concurrency", &value)?;
        }
        if let Some(value) = var("BATCH_CHUNK_SIZE") {
            self.batch.chunk_size = parse_field("batch.chunk_size", &value)?;
        }
        if let Some(devops_url) = var("ADMIN_DEVOPS_URL") {
            self.admin.devops_url = devops_url;
        }
        if let Some(value) = var("ADMIN_DATABASE_POLL_INTERVAL_MS") {
            self.admin.database_poll_interval_ms =
                parse_field("admin.database_poll_interval_ms", &value)?;
        }
        if let Some(value) = var("ADMIN_KEYSPACE_POLL_INTERVAL_MS") {
            self.admin.keyspace_poll_interval_ms =
                parse_field("admin.keyspace_poll_interval_ms", &value)?;
        }
        if let Some(value) = var("ADMIN_DATABASE_TIMEOUT_MS") {
            self.admin.database_timeout_ms = parse_field("admin.database_timeout_ms", &value)?;
        }
        if let Some(value) = var("ADMIN_KEYSPACE_TIMEOUT_MS") {
            self.admin.keyspace_timeout_ms = parse_field("admin.keyspace_timeout_ms", &value)?;
        }
        if let Some(value) = var("LOGGING_LEVEL") {
            self.logging.level = value.parse()?;
        }
        if let Some(value) = var("LOGGING_TIMESTAMPS") {
            self.logging.timestamps = parse_field("logging.timestamps", &value)?;
        }
        if let Some(value) = var("EVENTS_CHANNEL_CAPACITY") {
            self.events.channel_capacity = parse_field("events.channel_capacity", &value)?;
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// # Returns
    /// * `PathBuf` - Path to default configuration file
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".astra-data-api")
            .join("config.toml")
    }

    /// Save configuration to a file
    ///
    /// # Arguments
    /// * `path` - Path where to save the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Success or error
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok if valid, error otherwise
    pub fn validate(&self) -> Result<()> {
        if let Some(endpoint) = &self.connection.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(invalid("connection.endpoint", endpoint));
            }
        }
        if self.connection.keyspace.is_empty() {
            return Err(ConfigError::MissingField("connection.keyspace".to_string()).into());
        }
        if self.connection.request_timeout_ms == 0 {
            return Err(invalid("connection.request_timeout_ms", "0"));
        }
        if self.batch.chunk_size == 0 {
            return Err(invalid("batch.chunk_size", "0"));
        }
        if self.admin.database_poll_interval_ms == 0 {
            return Err(invalid("admin.database_poll_interval_ms", "0"));
        }
        if self.admin.keyspace_poll_interval_ms == 0 {
            return Err(invalid("admin.keyspace_poll_interval_ms", "0"));
        }
        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.request_timeout_ms)
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| invalid(field, value))
}

fn invalid(field: &str, value: &str) -> crate::error::DataApiError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
    .into()
}

impl std::str::FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}
