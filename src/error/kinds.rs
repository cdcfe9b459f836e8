use std::{fmt, io};

use serde_json::Value;

use crate::batch::{FailedRequest, PartialResult};
use crate::error::ErrorDescriptor;
use crate::transport::DataApiResponse;

/// Crate-wide `Result` type using [`DataApiError`] as the error.
pub type Result<T> = std::result::Result<T, DataApiError>;

/// Top-level error type for Data API operations.
#[derive(Debug)]
pub enum DataApiError {
    /// Hard failure raised by the transport. Never aggregated.
    Transport(TransportError),

    /// Soft failure of a single command.
    Response(ResponseError),

    /// Soft failures accumulated over a multi-request operation.
    Cumulative(Box<CumulativeOperationError>),

    /// Cursor misuse.
    Cursor(CursorError),

    /// `countDocuments` matched more documents than the caller or the server allows.
    TooManyDocumentsToCount { limit: u64, hit_server_limit: bool },

    /// Long-running admin operation errors.
    Admin(AdminError),

    /// Configuration errors.
    Config(ConfigError),

    /// JSON (de)serialization errors.
    Serialization(serde_json::Error),

    /// I/O errors.
    Io(io::Error),
}

/// Hard failures delivered by the transport before any envelope is parsed.
#[derive(Debug)]
pub enum TransportError {
    /// Non-2xx HTTP status.
    Http { status: u16, body: String },

    /// Connection or protocol failure.
    Network(String),

    /// The client-side timeout budget ran out.
    Timeout { elapsed_ms: u64, budget_ms: u64 },

    /// The body could not be parsed as a response envelope.
    InvalidResponse(String),
}

/// A single command answered with a non-empty `errors` array.
#[derive(Debug, Clone)]
pub struct ResponseError {
    pub command_name: String,
    pub command: Value,
    pub raw_response: DataApiResponse,
    pub errors: Vec<ErrorDescriptor>,
}

/// Soft failures collected across every request of one logical operation.
///
/// Carries whatever was committed before (ordered) or around (unordered) the
/// failures, so callers can recover already-applied work.
#[derive(Debug, Clone)]
pub struct CumulativeOperationError {
    pub partial_result: PartialResult,
    pub errors: Vec<ErrorDescriptor>,
    pub failed_requests: Vec<FailedRequest>,
}

/// Cursor-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorError {
    /// A configuration method was called after iteration began.
    AlreadyStarted { operation: &'static str },
}

/// Long-running admin operation errors.
#[derive(Debug, Clone)]
pub enum AdminError {
    /// The blocking wait exceeded its budget. The server-side operation may still run.
    Timeout {
        operation: String,
        elapsed_ms: u64,
        budget_ms: u64,
    },

    /// A status outside the expected set was observed while polling.
    UnexpectedState {
        operation: String,
        expected: Vec<String>,
        observed: String,
        payload: Value,
    },

    /// The server accepted a create request but did not report the new id.
    MissingDatabaseId(String),

    /// Astra-only admin capability requested without a database id.
    NotAnAstraDatabase(String),

    /// The wait was abandoned through a cancellation token.
    Cancelled(String),
}

/// Configuration-specific errors.
#[derive(Debug)]
pub enum ConfigError {
    /// Config file not found.
    FileNotFound(String),

    /// Invalid config format.
    InvalidFormat(String),

    /// Missing required field.
    MissingField(String),

    /// Invalid field value.
    InvalidValue { field: String, value: String },
}

impl DataApiError {
    /// Whether this is a hard (transport-level) failure.
    pub fn is_hard_failure(&self) -> bool {
        matches!(self, DataApiError::Transport(_))
    }

    /// The partial result attached to a cumulative error, if any.
    pub fn partial_result(&self) -> Option<&PartialResult> {
        match self {
            DataApiError::Cumulative(err) => Some(&err.partial_result),
            _ => None,
        }
    }

    /// Every error descriptor carried by this error.
    pub fn descriptors(&self) -> &[ErrorDescriptor] {
        match self {
            DataApiError::Response(err) => &err.errors,
            DataApiError::Cumulative(err) => &err.errors,
            _ => &[],
        }
    }
}

impl ResponseError {
    pub fn new(command: Value, raw_response: DataApiResponse) -> Self {
        let command_name = command
            .as_object()
            .and_then(|obj| obj.keys().next().cloned())
            .unwrap_or_default();
        let errors = raw_response.errors.clone();
        Self {
            command_name,
            command,
            raw_response,
            errors,
        }
    }
}

impl CumulativeOperationError {
    /// Build from the failed requests of one operation, flattening their descriptors.
    pub fn new(partial_result: PartialResult, failed_requests: Vec<FailedRequest>) -> Self {
        let errors = failed_requests
            .iter()
            .flat_map(|request| request.errors.iter().cloned())
            .collect();
        Self {
            partial_result,
            errors,
            failed_requests,
        }
    }
}

/* ========================= Display implementations ========================= */

impl fmt::Display for DataApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataApiError::Transport(err) => write!(f, "Transport error: {err}"),
            DataApiError::Response(err) => write!(f, "{err}"),
            DataApiError::Cumulative(err) => write!(f, "{err}"),
            DataApiError::Cursor(err) => write!(f, "Cursor error: {err}"),
            DataApiError::TooManyDocumentsToCount {
                limit,
                hit_server_limit,
            } => {
                if *hit_server_limit {
                    write!(f, "Too many documents to count (server limit of {limit} reached)")
                } else {
                    write!(f, "Too many documents to count (provided limit is {limit})")
                }
            }
            DataApiError::Admin(err) => write!(f, "Admin error: {err}"),
            DataApiError::Config(err) => write!(f, "Configuration error: {err}"),
            DataApiError::Serialization(err) => write!(f, "Serialization error: {err}"),
            DataApiError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Http { status, body } => write!(f, "HTTP {status}: {body}"),
            TransportError::Network(msg) => write!(f, "Network failure: {msg}"),
            TransportError::Timeout {
                elapsed_ms,
                budget_ms,
            } => write!(f, "Command timed out after {elapsed_ms}ms (budget {budget_ms}ms)"),
            TransportError::InvalidResponse(msg) => write!(f, "Invalid response: {msg}"),
        }
    }
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self
            .errors
            .first()
            .map(ErrorDescriptor::summary)
            .unwrap_or_else(|| "Unknown Data API error".to_string());
        write!(f, "Command '{}' failed: {first}", self.command_name)?;
        if self.errors.len() > 1 {
            write!(f, " (+ {} more errors)", self.errors.len() - 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for CumulativeOperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let first = self
            .errors
            .first()
            .map(ErrorDescriptor::summary)
            .unwrap_or_else(|| "Unknown Data API error".to_string());
        write!(f, "{} failed: {first}", self.partial_result.operation_name())?;
        if self.errors.len() > 1 {
            write!(f, " (+ {} more errors)", self.errors.len() - 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for CursorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CursorError::AlreadyStarted { operation } => {
                write!(f, "Cannot call {operation}() on a cursor that has already started")
            }
        }
    }
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdminError::Timeout {
                operation,
                elapsed_ms,
                budget_ms,
            } => write!(
                f,
                "{operation} did not complete within {budget_ms}ms (waited {elapsed_ms}ms); it may still be running server-side"
            ),
            AdminError::UnexpectedState {
                operation,
                expected,
                observed,
                ..
            } => write!(
                f,
                "{operation} observed unexpected status '{observed}' (expected one of: {})",
                expected.join(", ")
            ),
            AdminError::MissingDatabaseId(msg) => write!(f, "Missing database id: {msg}"),
            AdminError::NotAnAstraDatabase(endpoint) => {
                write!(f, "Could not derive an Astra database id from endpoint '{endpoint}'")
            }
            AdminError::Cancelled(operation) => write!(f, "Stopped waiting for {operation}"),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileNotFound(path) => write!(f, "Config file not found: {path}"),
            ConfigError::InvalidFormat(msg) => write!(f, "Invalid config format: {msg}"),
            ConfigError::MissingField(field) => write!(f, "Missing required field: {field}"),
            ConfigError::InvalidValue { field, value } => {
                write!(f, "Invalid value '{value}' for field '{field}'")
            }
        }
    }
}

impl std::error::Error for DataApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DataApiError::Serialization(err) => Some(err),
            DataApiError::Io(err) => Some(err),
            _ => None,
        }
    }
}
impl std::error::Error for TransportError {}
impl std::error::Error for ResponseError {}
impl std::error::Error for CumulativeOperationError {}
impl std::error::Error for CursorError {}
impl std::error::Error for AdminError {}
impl std::error::Error for ConfigError {}

/* ========================= Conversions to DataApiError ========================= */

impl From<io::Error> for DataApiError {
    fn from(err: io::Error) -> Self {
        DataApiError::Io(err)
    }
}

impl From<serde_json::Error> for DataApiError {
    fn from(err: serde_json::Error) -> Self {
        DataApiError::Serialization(err)
    }
}

impl From<TransportError> for DataApiError {
    fn from(err: TransportError) -> Self {
        DataApiError::Transport(err)
    }
}

impl From<ResponseError> for DataApiError {
    fn from(err: ResponseError) -> Self {
        DataApiError::Response(err)
    }
}

impl From<CumulativeOperationError> for DataApiError {
    fn from(err: CumulativeOperationError) -> Self {
        DataApiError::Cumulative(Box::new(err))
    }
}

impl From<CursorError> for DataApiError {
    fn from(err: CursorError) -> Self {
        DataApiError::Cursor(err)
    }
}

impl From<AdminError> for DataApiError {
    fn from(err: AdminError) -> Self {
        DataApiError::Admin(err)
    }
}

impl From<ConfigError> for DataApiError {
    fn from(err: ConfigError) -> Self {
        DataApiError::Config(err)
    }
}

impl From<toml::de::Error> for DataApiError {
    fn from(err: toml::de::Error) -> Self {
        DataApiError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}

impl From<toml::ser::Error> for DataApiError {
    fn from(err: toml::ser::Error) -> Self {
        DataApiError::Config(ConfigError::InvalidFormat(err.to_string()))
    }
}
