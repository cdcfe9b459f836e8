//! Aggregate results of multi-request write operations
//!
//! Each result type absorbs the responses of its units one by one. Absorbing
//! is commutative: counters add up and identifiers are keyed by the original
//! index, so unordered completion order never changes the outcome.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::ErrorDescriptor;
use crate::transport::DataApiResponse;

use super::operation::DispatchUnit;

/// Folds unit responses into one result.
pub trait BatchAggregate: Default {
    fn absorb(&mut self, unit: &DispatchUnit, response: &DataApiResponse);

    fn into_partial(self) -> PartialResult;
}

/// Result of a chunked `insertMany`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyResult {
    pub inserted_count: u64,
    /// Original document index → `_id`.
    pub inserted_ids: BTreeMap<usize, Value>,
}

impl InsertManyResult {
    /// Inserted ids in input order.
    pub fn ids(&self) -> Vec<Value> {
        self.inserted_ids.values().cloned().collect()
    }
}

impl BatchAggregate for InsertManyResult {
    fn absorb(&mut self, unit: &DispatchUnit, response: &DataApiResponse) {
        if let Some(responses) = response
            .status_field("documentResponses")
            .and_then(Value::as_array)
        {
            for (offset, doc_response) in responses.iter().enumerate() {
                if doc_response.get("status").and_then(Value::as_str) == Some("OK") {
                    self.inserted_count += 1;
                    if let Some(id) = doc_response.get("_id") {
                        self.inserted_ids.insert(unit.index + offset, id.clone());
                    }
                }
            }
            return;
        }

        let ids = response
            .status_field("insertedIds")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        self.inserted_count += ids.len() as u64;

        if ids.len() == unit.len {
            for (offset, id) in ids.into_iter().enumerate() {
                self.inserted_ids.insert(unit.index + offset, id);
            }
            return;
        }

        // Partial chunk: only caller-supplied ids can be placed.
        for id in ids {
            if let Some(offset) = unit
                .provided_ids
                .iter()
                .position(|provided| provided.as_ref() == Some(&id))
            {
                self.inserted_ids.insert(unit.index + offset, id);
            }
        }
    }

    fn into_partial(self) -> PartialResult {
        PartialResult::InsertMany(self)
    }
}

/// Result of a mixed bulk write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkWriteResult {
    pub inserted_count: u64,
    pub matched_count: u64,
    pub modified_count: u64,
    pub deleted_count: u64,
    pub upserted_count: u64,
    /// Operation index → inserted `_id`.
    pub inserted_ids: BTreeMap<usize, Value>,
    /// Operation index → upserted `_id`.
    pub upserted_ids: BTreeMap<usize, Value>,
}

impl BatchAggregate for BulkWriteResult {
    fn absorb(&mut self, unit: &DispatchUnit, response: &DataApiResponse) {
        if let Some(ids) = response
            .status_field("insertedIds")
            .and_then(Value::as_array)
        {
            self.inserted_count += ids.len() as u64;
            if let Some(id) = ids.first() {
                self.inserted_ids.insert(unit.index, id.clone());
            }
        }

        self.matched_count += response.status_count("matchedCount");
        self.modified_count += response.status_count("modifiedCount");
        self.deleted_count += response.status_count("deletedCount");

        if let Some(id) = response.status_field("upsertedId") {
            self.upserted_count += 1;
            self.upserted_ids.insert(unit.index, id.clone());
        }
    }

    fn into_partial(self) -> PartialResult {
        PartialResult::BulkWrite(self)
    }
}

/// Result of `updateOne`, `replaceOne` and the paginated `updateMany`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateResult {
    pub matched_count: u64,
    pub modified_count: u64,
    pub upserted_count: u64,
    pub upserted_id: Option<Value>,
}

impl UpdateResult {
    pub fn from_response(response: &DataApiResponse) -> Self {
        let mut result = Self::default();
        result.merge(response);
        result
    }

    fn merge(&mut self, response: &DataApiResponse) {
        self.matched_count += response.status_count("matchedCount");
        self.modified_count += response.status_count("modifiedCount");
        if let Some(id) = response.status_field("upsertedId") {
            self.upserted_count += 1;
            self.upserted_id = Some(id.clone());
        }
    }
}

impl BatchAggregate for UpdateResult {
    fn absorb(&mut self, _unit: &DispatchUnit, response: &DataApiResponse) {
        self.merge(response);
    }

    fn into_partial(self) -> PartialResult {
        PartialResult::UpdateMany(self)
    }
}

/// Result of `deleteOne` and the paginated `deleteMany`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteResult {
    pub deleted_count: u64,
    /// The server truncated the collection and did not report a count.
    pub deleted_all: bool,
}

impl DeleteResult {
    pub fn from_response(response: &DataApiResponse) -> Self {
        let mut result = Self::default();
        result.merge(response);
        result
    }

    fn merge(&mut self, response: &DataApiResponse) {
        match response.status_field("deletedCount").and_then(Value::as_i64) {
            Some(count) if count < 0 => self.deleted_all = true,
            Some(count) => self.deleted_count += count as u64,
            None => {}
        }
    }
}

impl BatchAggregate for DeleteResult {
    fn absorb(&mut self, _unit: &DispatchUnit, response: &DataApiResponse) {
        self.merge(response);
    }

    fn into_partial(self) -> PartialResult {
        PartialResult::DeleteMany(self)
    }
}

/// Partial result attached to a cumulative error, tagged by operation.
#[derive(Debug, Clone, PartialEq)]
pub enum PartialResult {
    InsertMany(InsertManyResult),
    BulkWrite(BulkWriteResult),
    UpdateMany(UpdateResult),
    DeleteMany(DeleteResult),
}

impl PartialResult {
    pub fn operation_name(&self) -> &'static str {
        match self {
            PartialResult::InsertMany(_) => "insertMany",
            PartialResult::BulkWrite(_) => "bulkWrite",
            PartialResult::UpdateMany(_) => "updateMany",
            PartialResult::DeleteMany(_) => "deleteMany",
        }
    }
}

/// One network request that came back with error descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRequest {
    /// Original index of the unit's first element.
    pub index: usize,
    pub command: Value,
    pub raw_response: DataApiResponse,
    pub errors: Vec<ErrorDescriptor>,
}

impl FailedRequest {
    pub fn new(index: usize, command: Value, raw_response: DataApiResponse) -> Self {
        let errors = raw_response.errors.clone();
        Self {
            index,
            command,
            raw_response,
            errors,
        }
    }
}
