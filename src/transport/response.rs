use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::Document;
use crate::error::{ErrorDescriptor, Result, TransportError};

/// Opaque server-issued continuation token.
///
/// Never parsed or built client-side; passed back verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageState(String);

impl PageState {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parsed Data API response envelope: `{ status?, data?, errors? }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataApiResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Map<String, Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub errors: Vec<ErrorDescriptor>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<ErrorDescriptor>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ErrorDescriptor>>::deserialize(deserializer)?.unwrap_or_default())
}

impl DataApiResponse {
    /// Parse an envelope from a JSON value.
    pub fn from_value(value: Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()).into())
    }

    /// A 2xx response carrying document-level errors.
    pub fn is_soft_failure(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn status_field(&self, name: &str) -> Option<&Value> {
        self.status.as_ref().and_then(|status| status.get(name))
    }

    pub fn data_field(&self, name: &str) -> Option<&Value> {
        self.data.as_ref().and_then(|data| data.get(name))
    }

    /// Numeric status counter, `0` when absent.
    pub fn status_count(&self, name: &str) -> u64 {
        self.status_field(name).and_then(Value::as_u64).unwrap_or(0)
    }

    /// `status.moreData`, set by paginated `updateMany`/`deleteMany`/`countDocuments`.
    pub fn more_data(&self) -> bool {
        self.status_field("moreData")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Continuation token of a `find` page (`data.nextPageState`).
    pub fn next_page_state(&self) -> Option<PageState> {
        page_state_of(self.data_field("nextPageState"))
    }

    /// Continuation token of a paginated write (`status.nextPageState`).
    pub fn status_page_state(&self) -> Option<PageState> {
        page_state_of(self.status_field("nextPageState"))
    }

    /// `data.documents`; non-object entries are rejected.
    pub fn documents(&self) -> Result<Vec<Document>> {
        let Some(documents) = self.data_field("documents") else {
            return Ok(Vec::new());
        };
        let Value::Array(documents) = documents else {
            return Err(TransportError::InvalidResponse(
                "data.documents is not an array".to_string(),
            )
            .into());
        };
        documents
            .iter()
            .map(|doc| match doc {
                Value::Object(map) => Ok(map.clone()),
                other => Err(TransportError::InvalidResponse(format!(
                    "expected a document, found {other}"
                ))
                .into()),
            })
            .collect()
    }

    /// `data.document` of a `findOne`-style response.
    pub fn document(&self) -> Option<Document> {
        self.data_field("document")
            .and_then(Value::as_object)
            .cloned()
    }

    /// `status.warnings`, normalised to their messages.
    pub fn warnings(&self) -> Vec<String> {
        self.status_field("warnings")
            .and_then(Value::as_array)
            .map(|warnings| {
                warnings
                    .iter()
                    .map(|w| match w {
                        Value::String(s) => s.clone(),
                        Value::Object(obj) => obj
                            .get("message")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| w.to_string()),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn page_state_of(value: Option<&Value>) -> Option<PageState> {
    match value {
        Some(Value::String(token)) if !token.is_empty() => Some(PageState::new(token.clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_find_page() {
        let response = DataApiResponse::from_value(json!({
            "data": {
                "documents": [{"_id": 1}, {"_id": 2}],
                "nextPageState": "abc=="
            },
            "status": {"sortVector": [0.1, 0.2]}
        }))
        .unwrap();

        assert_eq!(response.documents().unwrap().len(), 2);
        assert_eq!(response.next_page_state(), Some(PageState::new("abc==")));
        assert_eq!(response.status_field("sortVector"), Some(&json!([0.1, 0.2])));
        assert!(!response.is_soft_failure());
    }

    #[test]
    fn test_null_page_state_means_exhausted() {
        let response = DataApiResponse::from_value(json!({
            "data": {"documents": [], "nextPageState": null}
        }))
        .unwrap();
        assert_eq!(response.next_page_state(), None);
    }

    #[test]
    fn test_null_errors_are_empty() {
        let response = DataApiResponse::from_value(json!({"errors": null})).unwrap();
        assert!(!response.is_soft_failure());
    }

    #[test]
    fn test_soft_failure_and_counts() {
        let response = DataApiResponse::from_value(json!({
            "status": {"deletedCount": 3, "moreData": true},
            "errors": [{"errorCode": "X", "message": "m"}]
        }))
        .unwrap();
        assert!(response.is_soft_failure());
        assert_eq!(response.status_count("deletedCount"), 3);
        assert_eq!(response.status_count("missing"), 0);
        assert!(response.more_data());
    }

    #[test]
    fn test_non_document_entries_rejected() {
        let response = DataApiResponse::from_value(json!({
            "data": {"documents": [1, 2]}
        }))
        .unwrap();
        assert!(response.documents().is_err());
    }

    #[test]
    fn test_warnings_normalised() {
        let response = DataApiResponse::from_value(json!({
            "status": {"warnings": ["plain", {"message": "structured"}]}
        }))
        .unwrap();
        assert_eq!(response.warnings(), vec!["plain", "structured"]);
    }
}
