//! Astra Data API Client Library
//!
//! Async client core for document databases exposed through the Data API:
//! lazily paginated cursors, batched multi-request writes with partial
//! results, and polling of long-running admin operations.
//!
//! # Modules
//!
//! - `admin`: Database and keyspace administration, operation poller
//! - `batch`: Batch executor for multi-request writes
//! - `client`: Command dispatch with timeouts and lifecycle events
//! - `collection`: Collection handle with read and write operations
//! - `config`: Configuration management
//! - `cursor`: Lazy, restartable `find` cursors
//! - `db`: Client and database entry points
//! - `error`: Error types and handling
//! - `events`: Command lifecycle events
//! - `logging`: Tracing subscriber setup
//! - `timeout`: Per-request and per-operation time budgets
//! - `transport`: Wire envelopes, HTTP transport and credentials
//!
//! # Example
//!
//! ```no_run
//! use astra_data_api::{ClientConfig, DataApiClient, Document};
//! use astra_data_api::batch::BatchOptions;
//! use astra_data_api::cursor::FindOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::load()?;
//!     let client = DataApiClient::new(config)?;
//!     let db = client.db("https://<id>-<region>.apps.astra.datastax.com")?;
//!     let people = db.collection("people");
//!
//!     let docs: Vec<Document> = (0..100)
//!         .filter_map(|i| serde_json::json!({ "_id": i }).as_object().cloned())
//!         .collect();
//!     let inserted = people.insert_many(docs, &BatchOptions::default()).await?;
//!     println!("Inserted {} documents", inserted.inserted_count);
//!
//!     let mut cursor = people.find(Document::new(), FindOptions::default());
//!     while let Some(doc) = cursor.next().await? {
//!         println!("{}", serde_json::Value::Object(doc));
//!     }
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod batch;
pub mod client;
pub mod collection;
pub mod config;
pub mod cursor;
pub mod db;
pub mod error;
pub mod events;
pub mod logging;
pub mod timeout;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use admin::{AstraAdmin, BackendKind, DbAdmin};
pub use collection::Collection;
pub use config::ClientConfig;
pub use cursor::FindCursor;
pub use db::{DataApiClient, Db, DbOptions};
pub use error::{DataApiError, Result};
pub use events::CommandEvent;

/// A JSON document as sent to and returned by the Data API.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library version string
///
/// # Returns
/// * `&str` - Version string
pub fn version() -> &'static str {
    VERSION
}
