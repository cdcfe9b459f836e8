//! Batch execution of multi-request writes
//!
//! `insertMany` is split into chunks and `bulkWrite` into one request per
//! operation. Units are dispatched either strictly in sequence (ordered) or
//! through a bounded pool of in-flight requests (unordered), and their
//! responses are folded into one result:
//!
//! - Soft failures (error descriptors in a response) are collected and
//!   surfaced together as a cumulative error carrying the partial result
//! - Hard failures (transport errors, timeouts) abort the batch and are
//!   returned unwrapped

pub mod executor;
pub mod operation;
pub mod result;

pub use executor::{BatchExecutor, BatchOptions, DEFAULT_CHUNK_SIZE, DEFAULT_CONCURRENCY};
pub use operation::{DispatchUnit, WriteOperation};
pub use result::{
    BatchAggregate, BulkWriteResult, DeleteResult, FailedRequest, InsertManyResult, PartialResult,
    UpdateResult,
};
