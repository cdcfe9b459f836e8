//! Collection writes
//!
//! Single-document writes are one command each and raise soft failures as
//! [`crate::error::ResponseError`]. Multi-request writes (`insertMany`,
//! `bulkWrite`, and the server-paginated `updateMany`/`deleteMany`) aggregate
//! their requests and raise a cumulative error carrying the partial result.

use std::time::Duration;

use serde_json::{Map, Value, json};
use tracing::debug;

use crate::Document;
use crate::batch::{
    BatchAggregate, BatchExecutor, BatchOptions, BulkWriteResult, DeleteResult, DispatchUnit,
    FailedRequest, InsertManyResult, UpdateResult, WriteOperation,
};
use crate::client::command;
use crate::error::{CumulativeOperationError, Result, TransportError};
use crate::transport::PageState;

use super::Collection;

/// Options of `update_one`, `replace_one` and `update_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    pub upsert: bool,

    /// Budget of the whole operation, all pages included
    pub max_time: Option<Duration>,
}

impl UpdateOptions {
    pub fn upsert() -> Self {
        Self {
            upsert: true,
            ..Self::default()
        }
    }
}

/// Options of `delete_one` and `delete_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOptions {
    /// Budget of the whole operation, all pages included
    pub max_time: Option<Duration>,
}

impl Collection {
    /// Insert one document.
    ///
    /// # Returns
    /// * `Ok(id)` - The `_id` of the new document (server-generated when absent)
    pub async fn insert_one(&self, document: Document) -> Result<Value> {
        let budget = self.client().budget(None);
        let response = self
            .client()
            .run(
                self.target(),
                WriteOperation::insert_one(document).to_command(),
                &budget,
            )
            .await?;

        response
            .status_field("insertedIds")
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .cloned()
            .ok_or_else(|| {
                TransportError::InvalidResponse("insertOne returned no insertedIds".to_string())
                    .into()
            })
    }

    /// Insert documents in chunks of `options.chunk_size`.
    pub async fn insert_many(
        &self,
        documents: Vec<Document>,
        options: &BatchOptions,
    ) -> Result<InsertManyResult> {
        let units =
            DispatchUnit::insert_chunks(documents, options.effective_chunk_size(), options.ordered);
        self.executor().execute("insertMany", units, options).await
    }

    /// Run heterogeneous write operations, one request each.
    pub async fn bulk_write(
        &self,
        operations: Vec<WriteOperation>,
        options: &BatchOptions,
    ) -> Result<BulkWriteResult> {
        let units = DispatchUnit::per_operation(&operations);
        self.executor().execute("bulkWrite", units, options).await
    }

    pub async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: &UpdateOptions,
    ) -> Result<UpdateResult> {
        let operation = WriteOperation::update_one(filter, update).with_upsert(options.upsert);
        self.single_write(operation, options.max_time)
            .await
            .map(|response| UpdateResult::from_response(&response))
    }

    pub async fn replace_one(
        &self,
        filter: Document,
        replacement: Document,
        options: &UpdateOptions,
    ) -> Result<UpdateResult> {
        let operation =
            WriteOperation::replace_one(filter, replacement).with_upsert(options.upsert);
        self.single_write(operation, options.max_time)
            .await
            .map(|response| UpdateResult::from_response(&response))
    }

    pub async fn delete_one(&self, filter: Document, options: &DeleteOptions) -> Result<DeleteResult> {
        self.single_write(WriteOperation::delete_one(filter), options.max_time)
            .await
            .map(|response| DeleteResult::from_response(&response))
    }

    /// Update every matching document.
    ///
    /// The server updates a bounded number of documents per request and
    /// reports `moreData` with a `nextPageState`; requests are repeated with
    /// that token until it stops.
    pub async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: &UpdateOptions,
    ) -> Result<UpdateResult> {
        let upsert = options.upsert;
        self.paginate_write("updateMany", options.max_time, |page_state| {
            let mut write_options = Map::new();
            write_options.insert("upsert".to_string(), Value::Bool(upsert));
            if let Some(page_state) = page_state {
                write_options.insert(
                    "pageState".to_string(),
                    Value::String(page_state.as_str().to_string()),
                );
            }
            command(
                "updateMany",
                json!({ "filter": filter, "update": update, "options": write_options }),
            )
        })
        .await
    }

    /// Delete every matching document.
    ///
    /// Repeated while the server reports `moreData`. An empty filter deletes
    /// everything in one request and yields `deleted_all`.
    pub async fn delete_many(&self, filter: Document, options: &DeleteOptions) -> Result<DeleteResult> {
        self.paginate_write("deleteMany", options.max_time, |_| {
            command("deleteMany", json!({ "filter": filter }))
        })
        .await
    }

    /* ============================== Internals ============================== */

    fn executor(&self) -> BatchExecutor {
        BatchExecutor::new(self.client().clone(), self.target().clone())
    }

    async fn single_write(
        &self,
        operation: WriteOperation,
        max_time: Option<Duration>,
    ) -> Result<crate::transport::DataApiResponse> {
        let budget = self.client().budget(max_time);
        self.client()
            .run(self.target(), operation.to_command(), &budget)
            .await
    }

    /// Repeat a server-paginated write under one budget, folding every page.
    async fn paginate_write<R, F>(
        &self,
        operation: &str,
        max_time: Option<Duration>,
        build: F,
    ) -> Result<R>
    where
        R: BatchAggregate,
        F: Fn(Option<&PageState>) -> Value,
    {
        let budget = self.client().budget(max_time);
        let mut result = R::default();
        let mut page_state: Option<PageState> = None;
        let mut page = 0;

        loop {
            let unit = DispatchUnit {
                index: page,
                len: 1,
                command: build(page_state.as_ref()),
                provided_ids: Vec::new(),
            };
            let response = self
                .client()
                .dispatch(self.target(), &unit.command, &budget)
                .await?;
            result.absorb(&unit, &response);

            if response.is_soft_failure() {
                let failed = FailedRequest::new(unit.index, unit.command, response);
                return Err(CumulativeOperationError::new(result.into_partial(), vec![failed]).into());
            }
            if !response.more_data() {
                debug!("{} on {} finished after {} request(s)", operation, self.target(), page + 1);
                return Ok(result);
            }

            page_state = response.status_page_state();
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::PartialResult;
    use crate::error::DataApiError;
    use crate::testing::{MockTransport, doc, mock_client};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn collection(transport: &Arc<MockTransport>) -> Collection {
        Collection::new(mock_client(transport), "default_keyspace", "items")
    }

    #[tokio::test]
    async fn test_insert_one_returns_id() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Ok(json!({"status": {"insertedIds": ["generated-1"]}}))
        }));
        let id = collection(&transport)
            .insert_one(doc(json!({"name": "a"})))
            .await
            .unwrap();
        assert_eq!(id, json!("generated-1"));
        assert_eq!(transport.calls()[0], json!({"insertOne": {"document": {"name": "a"}}}));
    }

    #[tokio::test]
    async fn test_insert_one_soft_failure_raised() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Ok(json!({"errors": [{"errorCode": "DOCUMENT_ALREADY_EXISTS", "message": "dup"}]}))
        }));
        let err = collection(&transport)
            .insert_one(doc(json!({"_id": 1})))
            .await
            .unwrap_err();
        assert!(matches!(err, DataApiError::Response(_)));
    }

    #[tokio::test]
    async fn test_insert_many_chunks() {
        let transport = Arc::new(MockTransport::new(|_, command| {
            let ids: Vec<Value> = command["insertMany"]["documents"]
                .as_array()
                .map(|docs| docs.iter().map(|d| d["_id"].clone()).collect())
                .unwrap_or_default();
            Ok(json!({"status": {"insertedIds": ids}}))
        }));
        let documents = (0..45).map(|i| doc(json!({"_id": i}))).collect();

        let result = collection(&transport)
            .insert_many(documents, &BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(result.inserted_count, 45);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(result.inserted_ids.get(&44), Some(&json!(44)));
    }

    #[tokio::test]
    async fn test_unordered_bulk_write_partial_result() {
        let transport = Arc::new(MockTransport::new(|_, command| {
            if command.get("insertOne").is_some() {
                return Ok(json!({"errors": [{"errorCode": "DOCUMENT_ALREADY_EXISTS", "message": "dup"}]}));
            }
            Ok(json!({"status": {"deletedCount": 1}}))
        }));

        let err = collection(&transport)
            .bulk_write(
                vec![
                    WriteOperation::insert_one(doc(json!({"_id": 1}))),
                    WriteOperation::delete_one(doc(json!({"_id": 2}))),
                ],
                &BatchOptions::default(),
            )
            .await
            .unwrap_err();

        let Some(PartialResult::BulkWrite(partial)) = err.partial_result() else {
            panic!("expected a bulk write partial result");
        };
        assert_eq!(partial.deleted_count, 1);
        assert_eq!(partial.inserted_count, 0);
    }

    #[tokio::test]
    async fn test_update_one_options() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Ok(json!({"status": {"matchedCount": 0, "modifiedCount": 0, "upsertedId": "new"}}))
        }));
        let result = collection(&transport)
            .update_one(
                doc(json!({"a": 1})),
                doc(json!({"$set": {"b": 1}})),
                &UpdateOptions::upsert(),
            )
            .await
            .unwrap();

        assert_eq!(result.upserted_id, Some(json!("new")));
        assert_eq!(result.upserted_count, 1);
        assert_eq!(transport.calls()[0]["updateOne"]["options"]["upsert"], json!(true));
    }

    #[tokio::test]
    async fn test_replace_one_command() {
        let transport = Arc::new(MockTransport::new(|_, _| {
            Ok(json!({"status": {"matchedCount": 1, "modifiedCount": 1}}))
        }));
        let result = collection(&transport)
            .replace_one(doc(json!({"a": 1})), doc(json!({"a": 2})), &UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.modified_count, 1);
        assert_eq!(transport.call_names(), vec!["replaceOne"]);
        assert_eq!(transport.calls()[0]["replaceOne"]["replacement"], json!({"a": 2}));
    }

    #[tokio::test]
    async fn test_update_many_follows_page_state() {
        let transport = Arc::new(MockTransport::new(|_, command| {
            let page = command["updateMany"]["options"]["pageState"].as_str().unwrap_or("");
            Ok(match page {
                "" => json!({"status": {"matchedCount": 20, "modifiedCount": 20, "moreData": true, "nextPageState": "p1"}}),
                "p1" => json!({"status": {"matchedCount": 20, "modifiedCount": 19, "moreData": true, "nextPageState": "p2"}}),
                _ => json!({"status": {"matchedCount": 5, "modifiedCount": 5}}),
            })
        }));

        let result = collection(&transport)
            .update_many(Document::new(), doc(json!({"$set": {"x": 1}})), &UpdateOptions::default())
            .await
            .unwrap();

        assert_eq!(result.matched_count, 45);
        assert_eq!(result.modified_count, 44);
        let tokens: Vec<Value> = transport
            .calls()
            .iter()
            .map(|c| c["updateMany"]["options"]["pageState"].clone())
            .collect();
        assert_eq!(tokens, vec![Value::Null, json!("p1"), json!("p2")]);
    }

    #[tokio::test]
    async fn test_update_many_failure_carries_partial_result() {
        let transport = Arc::new(MockTransport::new(|_, command| {
            if command["updateMany"]["options"]["pageState"].is_null() {
                return Ok(json!({"status": {"matchedCount": 20, "modifiedCount": 20, "moreData": true, "nextPageState": "p1"}}));
            }
            Ok(json!({"errors": [{"errorCode": "SERVER_FAILURE", "message": "boom"}]}))
        }));

        let err = collection(&transport)
            .update_many(Document::new(), doc(json!({"$set": {"x": 1}})), &UpdateOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "updateMany failed: boom");
        let Some(PartialResult::UpdateMany(partial)) = err.partial_result() else {
            panic!("expected an update partial result");
        };
        assert_eq!(partial.modified_count, 20);
    }

    #[tokio::test]
    async fn test_delete_many_repeats_while_more_data() {
        let remaining = Arc::new(AtomicU64::new(45));
        let counter = remaining.clone();
        let transport = Arc::new(MockTransport::new(move |_, _| {
            let left = counter.load(Ordering::SeqCst);
            let deleted = left.min(20);
            counter.store(left - deleted, Ordering::SeqCst);
            Ok(json!({"status": {"deletedCount": deleted, "moreData": left > deleted}}))
        }));

        let result = collection(&transport)
            .delete_many(doc(json!({"kind": "old"})), &DeleteOptions::default())
            .await
            .unwrap();

        assert_eq!(result.deleted_count, 45);
        assert!(!result.deleted_all);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(remaining.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_delete_all() {
        let transport = Arc::new(MockTransport::new(|_, _| Ok(json!({"status": {"deletedCount": -1}}))));
        let result = collection(&transport)
            .delete_many(Document::new(), &DeleteOptions::default())
            .await
            .unwrap();
        assert!(result.deleted_all);
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_one() {
        let transport = Arc::new(MockTransport::new(|_, _| Ok(json!({"status": {"deletedCount": 1}}))));
        let result = collection(&transport)
            .delete_one(doc(json!({"_id": 3})), &DeleteOptions::default())
            .await
            .unwrap();
        assert_eq!(result.deleted_count, 1);
        assert_eq!(transport.calls()[0], json!({"deleteOne": {"filter": {"_id": 3}}}));
    }
}
