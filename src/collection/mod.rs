//! Collection handle
//!
//! A [`Collection`] binds a [`CommandClient`] to one `keyspace.collection`
//! target. Reads go through [`FindCursor`] or single commands; multi-request
//! writes go through the batch executor (see [`write`]).

pub mod write;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::Document;
use crate::client::{CommandClient, command};
use crate::cursor::{FindCursor, FindOptions, FindQuery};
use crate::error::{DataApiError, Result};
use crate::transport::CommandTarget;

pub use write::{DeleteOptions, UpdateOptions};

/// Handle on one collection. Cheap to clone.
#[derive(Clone)]
pub struct Collection {
    client: CommandClient,
    target: CommandTarget,
}

impl Collection {
    /// # Arguments
    /// * `client` - Shared command client
    /// * `keyspace` - Keyspace holding the collection
    /// * `name` - Collection name
    pub fn new(client: CommandClient, keyspace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            client,
            target: CommandTarget::Collection {
                keyspace: keyspace.into(),
                collection: name.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match &self.target {
            CommandTarget::Collection { collection, .. } => collection,
            _ => "",
        }
    }

    pub fn keyspace(&self) -> &str {
        match &self.target {
            CommandTarget::Collection { keyspace, .. } => keyspace,
            _ => "",
        }
    }

    pub fn target(&self) -> &CommandTarget {
        &self.target
    }

    pub(crate) fn client(&self) -> &CommandClient {
        &self.client
    }

    /* ============================== Reads ============================== */

    /// Lazy cursor over the documents matching `filter`. No I/O until iterated.
    pub fn find(&self, filter: Document, options: FindOptions) -> FindCursor<Document> {
        FindCursor::new(
            self.client.clone(),
            self.target.clone(),
            FindQuery::new(filter, options),
        )
    }

    /// First document matching `filter`.
    ///
    /// Honours `sort`, `projection` and `include_similarity` of `options`;
    /// `limit` and `skip` are ignored.
    pub async fn find_one(&self, filter: Document, options: FindOptions) -> Result<Option<Document>> {
        let mut body = Map::new();
        body.insert("filter".to_string(), Value::Object(filter));
        if let Some(sort) = options.sort {
            body.insert("sort".to_string(), Value::Object(sort));
        }
        if let Some(projection) = options.projection {
            body.insert("projection".to_string(), Value::Object(projection));
        }
        if options.include_similarity {
            body.insert(
                "options".to_string(),
                json!({ "includeSimilarity": true }),
            );
        }

        let budget = self.client.budget(None);
        let response = self
            .client
            .run(&self.target, command("findOne", Value::Object(body)), &budget)
            .await?;
        Ok(response.document())
    }

    /// Exact count of matching documents, bounded by `upper_bound`.
    ///
    /// # Returns
    /// * `Ok(count)` - At most `upper_bound` documents match
    /// * `Err(DataApiError::TooManyDocumentsToCount)` - More than `upper_bound`
    ///   match, or the server's own count limit was reached
    pub async fn count_documents(&self, filter: Document, upper_bound: u64) -> Result<u64> {
        let budget = self.client.budget(None);
        let response = self
            .client
            .run(
                &self.target,
                command("countDocuments", json!({ "filter": filter })),
                &budget,
            )
            .await?;

        let count = response.status_count("count");
        if response.more_data() {
            return Err(DataApiError::TooManyDocumentsToCount {
                limit: count,
                hit_server_limit: true,
            });
        }
        if count > upper_bound {
            return Err(DataApiError::TooManyDocumentsToCount {
                limit: upper_bound,
                hit_server_limit: false,
            });
        }
        debug!("{} documents match in {}", count, self.target);
        Ok(count)
    }

    /// Server-side estimate of the collection size.
    pub async fn estimated_document_count(&self) -> Result<u64> {
        let budget = self.client.budget(None);
        let response = self
            .client
            .run(
                &self.target,
                command("estimatedDocumentCount", json!({})),
                &budget,
            )
            .await?;
        Ok(response.status_count("count"))
    }

    /// Unique values of `key` (dot path) across matching documents.
    pub async fn distinct(&self, key: &str, filter: Document) -> Result<Vec<Value>> {
        let root = key.split('.').next().unwrap_or(key);
        let mut projection = Map::new();
        projection.insert(root.to_string(), json!(1));

        let options = FindOptions {
            projection: Some(projection),
            ..FindOptions::default()
        };
        self.find(filter, options).distinct(key).await
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("target", &self.target)
            .finish()
    }
}
