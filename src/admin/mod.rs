//! Database and keyspace administration
//!
//! Two backends answer the same [`DbAdmin`] capability:
//!
//! - [`AstraDbAdmin`] goes through the DevOps API, whose keyspace operations
//!   are asynchronous and are polled until the database is `ACTIVE` again
//! - [`DataApiDbAdmin`] issues Data API commands, which complete server-side
//!   before responding
//!
//! [`AstraAdmin`] manages whole databases through the DevOps API.

pub mod astra;
pub mod data_api;
pub mod poller;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::config::AdminConfig;
use crate::error::{ConfigError, Result};

pub use astra::{AstraAdmin, AstraDbAdmin, CreateDatabaseOptions, DatabaseInfo, DatabaseStatus};
pub use data_api::DataApiDbAdmin;
pub use poller::{OperationPoller, PollOptions, PollStatus, StatusExpectation};

/// Kind of server behind a Data API endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Astra,
    Dse,
    Hcd,
    Cassandra,
    Other,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Astra => "astra",
            BackendKind::Dse => "dse",
            BackendKind::Hcd => "hcd",
            BackendKind::Cassandra => "cassandra",
            BackendKind::Other => "other",
        }
    }

    /// Whether keyspace administration goes through the DevOps API.
    pub fn uses_devops_api(&self) -> bool {
        matches!(self, BackendKind::Astra)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "astra" => Ok(BackendKind::Astra),
            "dse" => Ok(BackendKind::Dse),
            "hcd" => Ok(BackendKind::Hcd),
            "cassandra" => Ok(BackendKind::Cassandra),
            "other" => Ok(BackendKind::Other),
            _ => Err(ConfigError::InvalidValue {
                field: "backend".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Per-call options of an admin operation.
#[derive(Debug, Clone)]
pub struct AdminOptions {
    /// Wait until the operation has taken effect
    pub blocking: bool,

    /// Overrides the default poll interval
    pub poll_interval: Option<Duration>,

    /// Overrides the default budget of the whole operation, requests included
    pub max_time: Option<Duration>,

    /// Stops a blocking wait early
    pub cancel: Option<CancellationToken>,
}

impl Default for AdminOptions {
    fn default() -> Self {
        Self {
            blocking: true,
            poll_interval: None,
            max_time: None,
            cancel: None,
        }
    }
}

impl AdminOptions {
    pub fn non_blocking() -> Self {
        Self {
            blocking: false,
            ..Self::default()
        }
    }

    pub(crate) fn poll_options(
        &self,
        interval: Duration,
        timeout: Option<Duration>,
        request_timeout: Duration,
    ) -> PollOptions {
        PollOptions {
            blocking: self.blocking,
            interval: self.poll_interval.unwrap_or(interval),
            timeout: self.max_time.or(timeout),
            request_timeout,
            cancel: self.cancel.clone(),
        }
    }
}

/// Keyspace replication for backends that accept it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyspaceReplication {
    Simple { factor: u32 },
    NetworkTopology(BTreeMap<String, u32>),
}

impl Default for KeyspaceReplication {
    fn default() -> Self {
        KeyspaceReplication::Simple { factor: 1 }
    }
}

impl KeyspaceReplication {
    pub fn to_json(&self) -> Value {
        match self {
            KeyspaceReplication::Simple { factor } => json!({
                "class": "SimpleStrategy",
                "replication_factor": factor
            }),
            KeyspaceReplication::NetworkTopology(datacenters) => {
                let mut replication = json!({ "class": "NetworkTopologyStrategy" });
                for (datacenter, factor) in datacenters {
                    replication[datacenter] = json!(factor);
                }
                replication
            }
        }
    }
}

/// Options of `create_keyspace`.
#[derive(Debug, Clone, Default)]
pub struct KeyspaceOptions {
    pub admin: AdminOptions,

    /// Ignored by Astra, which manages replication itself
    pub replication: KeyspaceReplication,
}

/// Poll defaults shared by the admin implementations.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSettings {
    pub database_poll_interval: Duration,
    pub keyspace_poll_interval: Duration,
    pub database_timeout: Option<Duration>,
    pub keyspace_timeout: Option<Duration>,
    pub request_timeout: Duration,
}

impl AdminSettings {
    /// # Arguments
    /// * `config` - Admin section of the client configuration
    /// * `request_timeout` - Timeout of each individual DevOps request
    pub fn from_config(config: &AdminConfig, request_timeout: Duration) -> Self {
        let budget = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        Self {
            database_poll_interval: Duration::from_millis(config.database_poll_interval_ms),
            keyspace_poll_interval: Duration::from_millis(config.keyspace_poll_interval_ms),
            database_timeout: budget(config.database_timeout_ms),
            keyspace_timeout: budget(config.keyspace_timeout_ms),
            request_timeout,
        }
    }
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self::from_config(&AdminConfig::default(), Duration::from_secs(30))
    }
}

/// Keyspace administration of one database.
#[async_trait]
pub trait DbAdmin: Send + Sync {
    fn backend(&self) -> BackendKind;

    async fn list_keyspaces(&self) -> Result<Vec<String>>;

    async fn create_keyspace(&self, name: &str, options: &KeyspaceOptions) -> Result<()>;

    async fn drop_keyspace(&self, name: &str, options: &AdminOptions) -> Result<()>;

    /// Embedding providers the database can vectorize with, keyed by provider name.
    async fn find_embedding_providers(&self) -> Result<Value>;
}
