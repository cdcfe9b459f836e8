use serde_json::{Map, Value, json};

use crate::Document;
use crate::client::command;

/// One logical write intent inside a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOperation {
    InsertOne {
        document: Document,
    },
    ReplaceOne {
        filter: Document,
        replacement: Document,
        upsert: bool,
    },
    UpdateOne {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    UpdateMany {
        filter: Document,
        update: Document,
        upsert: bool,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
}

impl WriteOperation {
    pub fn insert_one(document: Document) -> Self {
        WriteOperation::InsertOne { document }
    }

    pub fn replace_one(filter: Document, replacement: Document) -> Self {
        WriteOperation::ReplaceOne {
            filter,
            replacement,
            upsert: false,
        }
    }

    pub fn update_one(filter: Document, update: Document) -> Self {
        WriteOperation::UpdateOne {
            filter,
            update,
            upsert: false,
        }
    }

    pub fn update_many(filter: Document, update: Document) -> Self {
        WriteOperation::UpdateMany {
            filter,
            update,
            upsert: false,
        }
    }

    pub fn delete_one(filter: Document) -> Self {
        WriteOperation::DeleteOne { filter }
    }

    pub fn delete_many(filter: Document) -> Self {
        WriteOperation::DeleteMany { filter }
    }

    /// Turn on upsert for replace/update operations; no-op for the rest.
    pub fn with_upsert(mut self, enabled: bool) -> Self {
        match &mut self {
            WriteOperation::ReplaceOne { upsert, .. }
            | WriteOperation::UpdateOne { upsert, .. }
            | WriteOperation::UpdateMany { upsert, .. } => *upsert = enabled,
            _ => {}
        }
        self
    }

    /// Wire command name.
    pub fn command_name(&self) -> &'static str {
        match self {
            WriteOperation::InsertOne { .. } => "insertOne",
            WriteOperation::ReplaceOne { .. } => "replaceOne",
            WriteOperation::UpdateOne { .. } => "updateOne",
            WriteOperation::UpdateMany { .. } => "updateMany",
            WriteOperation::DeleteOne { .. } => "deleteOne",
            WriteOperation::DeleteMany { .. } => "deleteMany",
        }
    }

    /// Build the command envelope sent for this operation.
    pub(crate) fn to_command(&self) -> Value {
        let body = match self {
            WriteOperation::InsertOne { document } => json!({ "document": document }),
            WriteOperation::ReplaceOne {
                filter,
                replacement,
                upsert,
            } => json!({
                "filter": filter,
                "replacement": replacement,
                "options": { "upsert": upsert }
            }),
            WriteOperation::UpdateOne {
                filter,
                update,
                upsert,
            }
            | WriteOperation::UpdateMany {
                filter,
                update,
                upsert,
            } => json!({
                "filter": filter,
                "update": update,
                "options": { "upsert": upsert }
            }),
            WriteOperation::DeleteOne { filter } | WriteOperation::DeleteMany { filter } => {
                json!({ "filter": filter })
            }
        };
        command(self.command_name(), body)
    }
}

/// One network request of a batch, tagged with its position in the caller's list.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchUnit {
    /// Original index of the unit's first element.
    pub index: usize,
    /// Number of logical elements (documents or operations) it covers.
    pub len: usize,
    pub command: Value,
    /// Caller-supplied `_id` of each covered document, when present.
    pub provided_ids: Vec<Option<Value>>,
}

impl DispatchUnit {
    /// Split documents into `insertMany` chunks of at most `chunk_size`.
    pub fn insert_chunks(documents: Vec<Document>, chunk_size: usize, ordered: bool) -> Vec<Self> {
        let chunk_size = chunk_size.max(1);
        let mut units = Vec::with_capacity(documents.len().div_ceil(chunk_size));
        let mut documents = documents.into_iter().peekable();
        let mut index = 0;

        while documents.peek().is_some() {
            let chunk: Vec<Document> = documents.by_ref().take(chunk_size).collect();
            let provided_ids = chunk.iter().map(|doc| doc.get("_id").cloned()).collect();
            let len = chunk.len();

            let mut options = Map::new();
            options.insert("ordered".to_string(), Value::Bool(ordered));
            options.insert("returnDocumentResponses".to_string(), Value::Bool(true));

            units.push(DispatchUnit {
                index,
                len,
                command: command(
                    "insertMany",
                    json!({ "documents": chunk, "options": options }),
                ),
                provided_ids,
            });
            index += len;
        }
        units
    }

    /// One unit per bulk-write operation.
    pub fn per_operation(operations: &[WriteOperation]) -> Vec<Self> {
        operations
            .iter()
            .enumerate()
            .map(|(index, operation)| DispatchUnit {
                index,
                len: 1,
                command: operation.to_command(),
                provided_ids: match operation {
                    WriteOperation::InsertOne { document } => vec![document.get("_id").cloned()],
                    _ => vec![None],
                },
            })
            .collect()
    }

    pub fn command_name(&self) -> &str {
        crate::client::command_name(&self.command)
    }
}
