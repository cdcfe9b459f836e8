//! Transport collaborators
//!
//! The core never talks HTTP directly. It drives two narrow seams:
//! - [`CommandTransport`]: posts a JSON command envelope to a Data API target
//!   and returns the parsed response envelope
//! - [`DevOpsTransport`]: issues REST calls against the DevOps API used for
//!   database and Astra keyspace lifecycle operations
//!
//! Both must be safe for concurrent dispatch: the batch executor issues
//! overlapping calls through one shared transport.

pub mod http;
pub mod response;
pub mod token;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use http::HttpTransport;
pub use response::{DataApiResponse, PageState};
pub use token::{EnvTokenProvider, StaticTokenProvider, TokenProvider};

/// Addressee of a Data API command.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandTarget {
    /// Database-level commands (`findKeyspaces`, `findEmbeddingProviders`, ...)
    Database,

    /// Keyspace-level commands (`findCollections`, `createCollection`, ...)
    Keyspace(String),

    /// Collection-level commands (`find`, `insertMany`, ...)
    Collection { keyspace: String, collection: String },
}

impl CommandTarget {
    /// URL path segments appended to the API base path.
    pub fn path_segments(&self) -> Vec<&str> {
        match self {
            CommandTarget::Database => Vec::new(),
            CommandTarget::Keyspace(keyspace) => vec![keyspace.as_str()],
            CommandTarget::Collection {
                keyspace,
                collection,
            } => vec![keyspace.as_str(), collection.as_str()],
        }
    }
}

impl fmt::Display for CommandTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandTarget::Database => write!(f, "<database>"),
            CommandTarget::Keyspace(keyspace) => write!(f, "{keyspace}"),
            CommandTarget::Collection {
                keyspace,
                collection,
            } => write!(f, "{keyspace}.{collection}"),
        }
    }
}

/// Sends Data API command envelopes.
///
/// Non-2xx statuses, connection failures and timeouts must be returned as
/// [`crate::error::TransportError`]; a 2xx response is returned as parsed,
/// even when its `errors` array is non-empty.
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn execute(
        &self,
        target: &CommandTarget,
        command: &Value,
        timeout: Duration,
    ) -> Result<DataApiResponse>;
}

/// HTTP verbs used by the DevOps API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// A DevOps API call, relative to the DevOps base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DevOpsRequest {
    pub method: HttpMethod,
    pub path: String,
    pub body: Option<Value>,
}

impl DevOpsRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Get,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: HttpMethod::Post,
            path: path.into(),
            body,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: HttpMethod::Delete,
            path: path.into(),
            body: None,
        }
    }
}

/// A successful DevOps API response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevOpsResponse {
    pub status: u16,
    /// `Location` header, used by create calls to report the new resource.
    pub location: Option<String>,
    pub body: Option<Value>,
}

/// Sends DevOps API requests. Non-2xx statuses are hard failures.
#[async_trait]
pub trait DevOpsTransport: Send + Sync {
    async fn request(&self, request: &DevOpsRequest, timeout: Duration) -> Result<DevOpsResponse>;
}
