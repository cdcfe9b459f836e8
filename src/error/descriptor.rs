use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One entry of a response envelope's `errors` array.
///
/// The server attaches a varying set of extra fields (`id`, `family`, `scope`,
/// `title`, ...); everything besides `errorCode` and `message` is kept verbatim
/// in `attributes`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl ErrorDescriptor {
    /// Build a descriptor from a code and message.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code.into()),
            message: Some(message.into()),
            attributes: Map::new(),
        }
    }

    /// Human-readable one-line summary, falling back to the error code.
    pub fn summary(&self) -> String {
        match (&self.message, &self.error_code) {
            (Some(message), _) => message.clone(),
            (None, Some(code)) => code.clone(),
            (None, None) => "Unknown Data API error".to_string(),
        }
    }
}
