//! Keyspace administration through Data API commands

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::{CommandClient, command};
use crate::error::Result;
use crate::transport::{CommandTarget, DataApiResponse};

use super::poller::OperationPoller;
use super::{AdminOptions, BackendKind, DbAdmin, KeyspaceOptions};

/// Keyspace admin for self-managed backends (DSE, HCD, Cassandra).
///
/// Keyspace commands complete before the server responds, so blocking and
/// non-blocking calls behave the same.
#[derive(Clone)]
pub struct DataApiDbAdmin {
    client: CommandClient,
    poller: OperationPoller,
    backend: BackendKind,
}

impl DataApiDbAdmin {
    pub fn new(client: CommandClient, backend: BackendKind) -> Self {
        let poller = OperationPoller::new(client.events().clone());
        Self {
            client,
            poller,
            backend,
        }
    }

    async fn database_command(&self, name: &str, body: Value) -> Result<DataApiResponse> {
        let budget = self.client.budget(None);
        self.client
            .run(&CommandTarget::Database, command(name, body), &budget)
            .await
    }
}

#[async_trait]
impl DbAdmin for DataApiDbAdmin {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn list_keyspaces(&self) -> Result<Vec<String>> {
        let response = self.database_command("findKeyspaces", json!({})).await?;
        Ok(response
            .status_field("keyspaces")
            .and_then(Value::as_array)
            .map(|names| names.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn create_keyspace(&self, name: &str, options: &KeyspaceOptions) -> Result<()> {
        let body = json!({
            "name": name,
            "options": { "replication": options.replication.to_json() }
        });
        self.poller
            .run_once("createKeyspace", async {
                self.database_command("createKeyspace", body).await.map(|_| ())
            })
            .await
    }

    async fn drop_keyspace(&self, name: &str, _options: &AdminOptions) -> Result<()> {
        self.poller
            .run_once("dropKeyspace", async {
                self.database_command("dropKeyspace", json!({ "name": name }))
                    .await
                    .map(|_| ())
            })
            .await
    }

    async fn find_embedding_providers(&self) -> Result<Value> {
        let response = self
            .database_command("findEmbeddingProviders", json!({}))
            .await?;
        Ok(response
            .status_field("embeddingProviders")
            .cloned()
            .unwrap_or_else(|| json!({})))
    }
}
