//! Astra DevOps API administration

use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::client::{CommandClient, command};
use crate::error::{AdminError, Result, TransportError};
use crate::timeout::TimeoutBudget;
use crate::transport::{CommandTarget, DevOpsRequest, DevOpsResponse, DevOpsTransport};

use super::poller::{OperationPoller, PollOptions, PollStatus, StatusExpectation};
use super::{AdminOptions, AdminSettings, BackendKind, DbAdmin, KeyspaceOptions};

const DATABASE_CREATED: StatusExpectation =
    StatusExpectation::new("ACTIVE", &["PENDING", "INITIALIZING"]);
const DATABASE_TERMINATED: StatusExpectation =
    StatusExpectation::new("TERMINATED", &["TERMINATING"]);
const KEYSPACE_CHANGED: StatusExpectation =
    StatusExpectation::new("ACTIVE", &["MAINTENANCE", "INITIALIZING", "PENDING"]);

/// Lifecycle status of an Astra database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseStatus {
    Active,
    Pending,
    Initializing,
    Maintenance,
    Hibernated,
    Parked,
    Terminating,
    Terminated,
    Error,
    Other(String),
}

impl DatabaseStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "ACTIVE" => DatabaseStatus::Active,
            "PENDING" => DatabaseStatus::Pending,
            "INITIALIZING" => DatabaseStatus::Initializing,
            "MAINTENANCE" => DatabaseStatus::Maintenance,
            "HIBERNATED" => DatabaseStatus::Hibernated,
            "PARKED" => DatabaseStatus::Parked,
            "TERMINATING" => DatabaseStatus::Terminating,
            "TERMINATED" => DatabaseStatus::Terminated,
            "ERROR" => DatabaseStatus::Error,
            other => DatabaseStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            DatabaseStatus::Active => "ACTIVE",
            DatabaseStatus::Pending => "PENDING",
            DatabaseStatus::Initializing => "INITIALIZING",
            DatabaseStatus::Maintenance => "MAINTENANCE",
            DatabaseStatus::Hibernated => "HIBERNATED",
            DatabaseStatus::Parked => "PARKED",
            DatabaseStatus::Terminating => "TERMINATING",
            DatabaseStatus::Terminated => "TERMINATED",
            DatabaseStatus::Error => "ERROR",
            DatabaseStatus::Other(other) => other,
        }
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A database as described by the DevOps API.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseInfo {
    pub id: String,
    pub name: String,
    pub status: DatabaseStatus,
    pub cloud_provider: Option<String>,
    pub region: Option<String>,
    pub keyspaces: Vec<String>,
    /// The document as returned by the server
    pub raw: Value,
}

impl DatabaseInfo {
    /// Parse a DevOps database document.
    pub fn from_devops(raw: Value) -> Result<Self> {
        let text = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);

        let id = text(raw.get("id")).ok_or_else(|| {
            TransportError::InvalidResponse("database document has no id".to_string())
        })?;
        let info = raw.get("info");
        let status = text(raw.get("status")).unwrap_or_default();

        let mut keyspaces: Vec<String> = info
            .and_then(|info| info.get("keyspaces"))
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();
        if keyspaces.is_empty() {
            keyspaces.extend(text(info.and_then(|info| info.get("keyspace"))));
        }

        Ok(Self {
            id,
            name: text(info.and_then(|info| info.get("name"))).unwrap_or_default(),
            status: DatabaseStatus::parse(&status),
            cloud_provider: text(info.and_then(|info| info.get("cloudProvider"))),
            region: text(info.and_then(|info| info.get("region"))),
            keyspaces,
            raw,
        })
    }
}

/// Options of [`AstraAdmin::create_database`].
#[derive(Debug, Clone)]
pub struct CreateDatabaseOptions {
    pub name: String,
    pub cloud_provider: String,
    pub region: String,
    /// Initial keyspace (server default when `None`)
    pub keyspace: Option<String>,
    pub admin: AdminOptions,
}

impl CreateDatabaseOptions {
    pub fn new(
        name: impl Into<String>,
        cloud_provider: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            cloud_provider: cloud_provider.into(),
            region: region.into(),
            keyspace: None,
            admin: AdminOptions::default(),
        }
    }

    fn to_body(&self) -> Value {
        let mut body = json!({
            "name": self.name,
            "cloudProvider": self.cloud_provider,
            "region": self.region,
            "tier": "serverless",
            "capacityUnits": 1,
            "dbType": "vector"
        });
        if let Some(keyspace) = &self.keyspace {
            body["keyspace"] = json!(keyspace);
        }
        body
    }
}

/// Shared DevOps plumbing of both Astra admins.
#[derive(Clone)]
struct DevOps {
    transport: Arc<dyn DevOpsTransport>,
    settings: AdminSettings,
}

impl DevOps {
    /// Budget of a single request outside any polled operation.
    fn budget(&self) -> TimeoutBudget {
        TimeoutBudget::new(None, self.settings.request_timeout)
    }

    fn poll_options(
        &self,
        options: &AdminOptions,
        interval: Duration,
        timeout: Option<Duration>,
    ) -> PollOptions {
        options.poll_options(interval, timeout, self.settings.request_timeout)
    }

    async fn send(&self, request: DevOpsRequest, budget: &TimeoutBudget) -> Result<DevOpsResponse> {
        let timeout = budget.request_timeout()?;
        debug!("DevOps {} {} (timeout {:?})", request.method, request.path, timeout);
        self.transport.request(&request, timeout).await
    }

    async fn database(&self, id: &str, budget: &TimeoutBudget) -> Result<DatabaseInfo> {
        let response = self
            .send(DevOpsRequest::get(format!("/databases/{id}")), budget)
            .await?;
        let body = response.body.ok_or_else(|| {
            TransportError::InvalidResponse(format!("empty body for database {id}"))
        })?;
        DatabaseInfo::from_devops(body)
    }

    async fn check(
        &self,
        id: &str,
        expectation: StatusExpectation,
        budget: TimeoutBudget,
    ) -> Result<PollStatus> {
        let info = self.database(id, &budget).await?;
        Ok(expectation.classify(info.status.as_str(), info.raw))
    }
}

/// Database lifecycle management through the DevOps API.
#[derive(Clone)]
pub struct AstraAdmin {
    devops: DevOps,
    poller: OperationPoller,
}

impl AstraAdmin {
    pub fn new(
        transport: Arc<dyn DevOpsTransport>,
        settings: AdminSettings,
        poller: OperationPoller,
    ) -> Self {
        Self {
            devops: DevOps {
                transport,
                settings,
            },
            poller,
        }
    }

    pub async fn list_databases(&self) -> Result<Vec<DatabaseInfo>> {
        let response = self
            .devops
            .send(DevOpsRequest::get("/databases"), &self.devops.budget())
            .await?;
        match response.body {
            Some(Value::Array(databases)) => {
                databases.into_iter().map(DatabaseInfo::from_devops).collect()
            }
            Some(other) => Err(TransportError::InvalidResponse(format!(
                "expected a database list, found {other}"
            ))
            .into()),
            None => Ok(Vec::new()),
        }
    }

    pub async fn database_info(&self, id: &str) -> Result<DatabaseInfo> {
        self.devops.database(id, &self.devops.budget()).await
    }

    /// Create a database, waiting until it is `ACTIVE` when blocking.
    ///
    /// # Returns
    /// * `Ok(id)` - Id of the new database
    pub async fn create_database(&self, options: &CreateDatabaseOptions) -> Result<String> {
        let devops = &self.devops;
        let created = OnceLock::new();
        let created = &created;

        let start = move |budget: TimeoutBudget| async move {
            let response = devops
                .send(DevOpsRequest::post("/databases", Some(options.to_body())), &budget)
                .await?;
            let id = new_database_id(&response)?;
            let _ = created.set(id.clone());
            Ok(id)
        };
        let status_check = move |budget: TimeoutBudget| async move {
            match created.get() {
                Some(id) => devops.check(id, DATABASE_CREATED, budget).await,
                None => Err(AdminError::MissingDatabaseId(
                    "database id unknown while polling".to_string(),
                )
                .into()),
            }
        };

        let poll = devops.poll_options(
            &options.admin,
            devops.settings.database_poll_interval,
            devops.settings.database_timeout,
        );
        self.poller
            .poll_until_complete("createDatabase", start, status_check, &poll)
            .await
    }

    /// Terminate a database, waiting until it is `TERMINATED` when blocking.
    pub async fn drop_database(&self, id: &str, options: &AdminOptions) -> Result<()> {
        let devops = &self.devops;
        let start = move |budget: TimeoutBudget| async move {
            devops
                .send(DevOpsRequest::post(format!("/databases/{id}/terminate"), None), &budget)
                .await
                .map(|_| ())
        };
        let poll = devops.poll_options(
            options,
            devops.settings.database_poll_interval,
            devops.settings.database_timeout,
        );
        self.poller
            .poll_until_complete(
                "dropDatabase",
                start,
                move |budget| devops.check(id, DATABASE_TERMINATED, budget),
                &poll,
            )
            .await
    }

    /// Keyspace admin of one database.
    pub fn db_admin(&self, database_id: impl Into<String>, client: CommandClient) -> AstraDbAdmin {
        AstraDbAdmin {
            database_id: database_id.into(),
            devops: self.devops.clone(),
            poller: self.poller.clone(),
            client,
        }
    }
}

fn new_database_id(response: &DevOpsResponse) -> Result<String> {
    let from_location = response
        .location
        .as_deref()
        .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let from_body = || {
        response
            .body
            .as_ref()
            .and_then(|body| body.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    from_location.or_else(from_body).ok_or_else(|| {
        AdminError::MissingDatabaseId(format!(
            "create returned status {} without a location or id",
            response.status
        ))
        .into()
    })
}

/// Keyspace administration of one Astra database.
#[derive(Clone)]
pub struct AstraDbAdmin {
    database_id: String,
    devops: DevOps,
    poller: OperationPoller,
    client: CommandClient,
}

impl AstraDbAdmin {
    pub fn database_id(&self) -> &str {
        &self.database_id
    }

    pub async fn info(&self) -> Result<DatabaseInfo> {
        self.devops
            .database(&self.database_id, &self.devops.budget())
            .await
    }

    async fn change_keyspace(
        &self,
        operation: &str,
        request: DevOpsRequest,
        options: &AdminOptions,
    ) -> Result<()> {
        let devops = &self.devops;
        let id = self.database_id.as_str();
        let poll = devops.poll_options(
            options,
            devops.settings.keyspace_poll_interval,
            devops.settings.keyspace_timeout,
        );
        self.poller
            .poll_until_complete(
                operation,
                move |budget: TimeoutBudget| async move {
                    devops.send(request, &budget).await.map(|_| ())
                },
                move |budget| devops.check(id, KEYSPACE_CHANGED, budget),
                &poll,
            )
            .await
    }
}

#[async_trait]
impl DbAdmin for AstraDbAdmin {
    fn backend(&self) -> BackendKind {
        BackendKind::Astra
    }

    async fn list_keyspaces(&self) -> Result<Vec<String>> {
        Ok(self.info().await?.keyspaces)
    }

    async fn create_keyspace(&self, name: &str, options: &KeyspaceOptions) -> Result<()> {
        let path = format!("/databases/{}/keyspaces/{}", self.database_id, name);
        self.change_keyspace("createKeyspace", DevOpsRequest::post(path, None), &options.admin)
            .await
    }

    async fn drop_keyspace(&self, name: &str, options: &AdminOptions) -> Result<()> {
        let path = format!("/databases/{}/keyspaces/{}", self.database_id, name);
        self.change_keyspace("dropKeyspace", DevOpsRequest::delete(path), options)
            .await
    }

    async fn find_embedding_providers(&self) -> Result<Value> {
        let budget = self.client.budget(None);
        let response = self
            .client
            .run(
                &CommandTarget::Database,
                command("findEmbeddingProviders", json!({})),
                &budget,
            )
            .await?;
        Ok(response
            .status_field("embeddingProviders")
            .cloned()
            .unwrap_or_else(|| json!({})))
    }
}
