use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Document;
use crate::client::command;
use crate::transport::PageState;

/// Options for [`crate::collection::Collection::find`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FindOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<Document>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<Document>,

    /// Maximum number of documents; `0` or `None` means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,

    #[serde(default)]
    pub include_similarity: bool,

    #[serde(default)]
    pub include_sort_vector: bool,
}

/// Immutable description of one `find` iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub options: FindOptions,
}

impl FindQuery {
    pub fn new(filter: Document, options: FindOptions) -> Self {
        let mut query = Self { filter, options };
        query.set_limit(query.options.limit.unwrap_or(0));
        query
    }

    /// `0` clears the limit.
    pub(crate) fn set_limit(&mut self, limit: u64) {
        self.options.limit = (limit > 0).then_some(limit);
    }

    pub fn limit(&self) -> Option<u64> {
        self.options.limit
    }

    /// Build the `find` command for one page.
    ///
    /// The sort-vector flag is only sent with the first page: the vector is
    /// reported once per iteration.
    pub(crate) fn to_command(&self, page_state: Option<&PageState>, first_page: bool) -> Value {
        let mut body = Map::new();
        body.insert("filter".to_string(), Value::Object(self.filter.clone()));
        if let Some(sort) = &self.options.sort {
            body.insert("sort".to_string(), Value::Object(sort.clone()));
        }
        if let Some(projection) = &self.options.projection {
            body.insert("projection".to_string(), Value::Object(projection.clone()));
        }

        let mut options = Map::new();
        if let Some(limit) = self.options.limit {
            options.insert("limit".to_string(), Value::from(limit));
        }
        if let Some(skip) = self.options.skip {
            options.insert("skip".to_string(), Value::from(skip));
        }
        if self.options.include_similarity {
            options.insert("includeSimilarity".to_string(), Value::Bool(true));
        }
        if self.options.include_sort_vector && first_page {
            options.insert("includeSortVector".to_string(), Value::Bool(true));
        }
        if let Some(page_state) = page_state {
            options.insert(
                "pageState".to_string(),
                Value::String(page_state.as_str().to_string()),
            );
        }
        if !options.is_empty() {
            body.insert("options".to_string(), Value::Object(options));
        }

        command("find", Value::Object(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::doc;
    use serde_json::json;

    #[test]
    fn test_first_page_command() {
        let query = FindQuery::new(
            doc(json!({"status": "active"})),
            FindOptions {
                sort: Some(doc(json!({"$vector": [0.1, 0.2]}))),
                limit: Some(10),
                include_sort_vector: true,
                ..Default::default()
            },
        );

        assert_eq!(
            query.to_command(None, true),
            json!({"find": {
                "filter": {"status": "active"},
                "sort": {"$vector": [0.1, 0.2]},
                "options": {"limit": 10, "includeSortVector": true}
            }})
        );
    }

    #[test]
    fn test_next_page_passes_token_verbatim() {
        let query = FindQuery::new(Document::new(), FindOptions::default());
        let command = query.to_command(Some(&PageState::new("opaque==")), false);
        assert_eq!(command["find"]["options"], json!({"pageState": "opaque=="}));
    }

    #[test]
    fn test_zero_limit_means_unlimited() {
        let query = FindQuery::new(
            Document::new(),
            FindOptions {
                limit: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(query.limit(), None);
        assert!(query.to_command(None, true)["find"].get("options").is_none());
    }
}
