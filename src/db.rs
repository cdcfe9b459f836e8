//! Client entry points
//!
//! [`DataApiClient`] owns the configuration, credentials, event channel and
//! the DevOps transport. [`Db`] binds a command transport to one database
//! endpoint and hands out collections and the backend's admin.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use crate::admin::{
    AdminSettings, AstraAdmin, BackendKind, DataApiDbAdmin, DbAdmin, OperationPoller,
};
use crate::batch::BatchOptions;
use crate::client::{CommandClient, command};
use crate::collection::Collection;
use crate::config::ClientConfig;
use crate::error::{AdminError, ConfigError, Result};
use crate::events::{CommandEvent, EventBus};
use crate::transport::{
    CommandTarget, CommandTransport, DevOpsTransport, EnvTokenProvider, HttpTransport,
    StaticTokenProvider, TokenProvider,
};

/// Per-database overrides of the client configuration.
#[derive(Clone, Default)]
pub struct DbOptions {
    /// Keyspace used by [`Db::collection`]
    pub keyspace: Option<String>,

    /// Kind of server behind the endpoint
    pub backend: Option<BackendKind>,

    /// Token used for this database only
    pub token: Option<Arc<dyn TokenProvider>>,
}

/// Root handle of the library.
#[derive(Clone)]
pub struct DataApiClient {
    config: ClientConfig,
    token: Arc<dyn TokenProvider>,
    events: EventBus,
    devops: Arc<dyn DevOpsTransport>,
    command_transport: Option<Arc<dyn CommandTransport>>,
}

impl DataApiClient {
    /// Create a client talking HTTP.
    ///
    /// The token comes from `connection.token`, or from
    /// `ASTRA_DB_APPLICATION_TOKEN` when unset.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let token: Arc<dyn TokenProvider> = match &config.connection.token {
            Some(token) => Arc::new(StaticTokenProvider::new(token.clone())),
            None => Arc::new(EnvTokenProvider::default()),
        };
        let devops = HttpTransport::new(
            "",
            config.connection.api_path.clone(),
            config.admin.devops_url.clone(),
            token.clone(),
        )?;

        Ok(Self {
            events: EventBus::new(config.events.channel_capacity),
            config,
            token,
            devops: Arc::new(devops),
            command_transport: None,
        })
    }

    /// Create a client over caller-supplied transports.
    ///
    /// Every [`Db`] shares `commands`, whatever its endpoint.
    pub fn with_transports(
        config: ClientConfig,
        commands: Arc<dyn CommandTransport>,
        devops: Arc<dyn DevOpsTransport>,
    ) -> Self {
        Self {
            events: EventBus::new(config.events.channel_capacity),
            config,
            token: Arc::new(StaticTokenProvider::anonymous()),
            devops,
            command_transport: Some(commands),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Receive command and admin lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<CommandEvent> {
        self.events.subscribe()
    }

    /// Database at `endpoint` with the configured keyspace and backend.
    pub fn db(&self, endpoint: &str) -> Result<Db> {
        self.db_with(endpoint, DbOptions::default())
    }

    /// Database at the configured `connection.endpoint`.
    pub fn default_db(&self) -> Result<Db> {
        let endpoint = self
            .config
            .connection
            .endpoint
            .clone()
            .ok_or_else(|| ConfigError::MissingField("connection.endpoint".to_string()))?;
        self.db(&endpoint)
    }

    pub fn db_with(&self, endpoint: &str, options: DbOptions) -> Result<Db> {
        let transport: Arc<dyn CommandTransport> = match &self.command_transport {
            Some(transport) => transport.clone(),
            None => Arc::new(HttpTransport::new(
                endpoint,
                self.config.connection.api_path.clone(),
                self.config.admin.devops_url.clone(),
                options.token.clone().unwrap_or_else(|| self.token.clone()),
            )?),
        };
        let backend = options.backend.unwrap_or(self.config.connection.backend);
        let keyspace = options
            .keyspace
            .unwrap_or_else(|| self.config.connection.keyspace.clone());

        debug!("Opening {} database at {} (keyspace {})", backend, endpoint, keyspace);
        Ok(Db {
            client: CommandClient::new(transport, self.events.clone(), self.config.request_timeout()),
            endpoint: endpoint.to_string(),
            keyspace,
            backend,
            devops: self.devops.clone(),
            admin_settings: self.admin_settings(),
            batch_defaults: self.batch_defaults(),
        })
    }

    /// Database lifecycle management through the DevOps API.
    pub fn admin(&self) -> AstraAdmin {
        AstraAdmin::new(
            self.devops.clone(),
            self.admin_settings(),
            OperationPoller::new(self.events.clone()),
        )
    }

    fn admin_settings(&self) -> AdminSettings {
        AdminSettings::from_config(&self.config.admin, self.config.request_timeout())
    }

    fn batch_defaults(&self) -> BatchOptions {
        BatchOptions {
            ordered: self.config.batch.ordered,
            concurrency: self.config.batch.concurrency,
            chunk_size: self.config.batch.chunk_size,
            max_time: None,
        }
    }
}

/// One database endpoint.
#[derive(Clone)]
pub struct Db {
    client: CommandClient,
    endpoint: String,
    keyspace: String,
    backend: BackendKind,
    devops: Arc<dyn DevOpsTransport>,
    admin_settings: AdminSettings,
    batch_defaults: BatchOptions,
}

impl Db {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    /// Astra database id encoded in the endpoint host, if any.
    pub fn id(&self) -> Option<String> {
        database_id(&self.endpoint)
    }

    /// Batch options built from the client configuration.
    pub fn batch_defaults(&self) -> BatchOptions {
        self.batch_defaults.clone()
    }

    /// Collection in the database's keyspace. No I/O.
    pub fn collection(&self, name: &str) -> Collection {
        self.collection_in(&self.keyspace, name)
    }

    pub fn collection_in(&self, keyspace: &str, name: &str) -> Collection {
        Collection::new(self.client.clone(), keyspace, name)
    }

    /// Names of the collections of the database's keyspace.
    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        let budget = self.client.budget(None);
        let response = self
            .client
            .run(
                &CommandTarget::Keyspace(self.keyspace.clone()),
                command("findCollections", json!({})),
                &budget,
            )
            .await?;
        Ok(response
            .status_field("collections")
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|entry| match entry {
                        Value::String(name) => Some(name.clone()),
                        Value::Object(def) => def.get("name").and_then(Value::as_str).map(str::to_string),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Keyspace admin of the backend behind this endpoint.
    pub fn admin(&self) -> Result<Box<dyn DbAdmin>> {
        if !self.backend.uses_devops_api() {
            return Ok(Box::new(DataApiDbAdmin::new(self.client.clone(), self.backend)));
        }

        let id = self
            .id()
            .ok_or_else(|| AdminError::NotAnAstraDatabase(self.endpoint.clone()))?;
        info!("Using DevOps keyspace admin for database {}", id);
        let admin = AstraAdmin::new(
            self.devops.clone(),
            self.admin_settings.clone(),
            OperationPoller::new(self.client.events().clone()),
        );
        Ok(Box::new(admin.db_admin(id, self.client.clone())))
    }
}

/// Extract the database id from `https://<id>-<region>.apps.astra.datastax.com`.
pub fn database_id(endpoint: &str) -> Option<String> {
    let host = endpoint
        .split_once("://")
        .map_or(endpoint, |(_, rest)| rest)
        .split(['/', ':'])
        .next()?;
    let candidate = host.get(..36)?;
    Uuid::parse_str(candidate).ok().map(|id| id.to_string())
}
