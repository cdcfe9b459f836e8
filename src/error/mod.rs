//! Error handling for Data API operations.
//!
//! Errors fall into four families:
//! - hard transport failures (non-2xx status, network errors, client-side timeouts),
//!   which always propagate unwrapped
//! - soft failures: a successful HTTP exchange whose envelope carries `errors`
//! - protocol misuse detected before any I/O (e.g. reconfiguring a started cursor)
//! - admin polling failures (timeouts, unexpected server-side status)
//!
//! # Example
//!
//! ```rust,no_run
//! use astra_data_api::error::{DataApiError, Result};
//!
//! fn recover(err: DataApiError) -> Result<()> {
//!     if let Some(partial) = err.partial_result() {
//!         println!("committed before failure: {partial:?}");
//!     }
//!     Err(err)
//! }
//! ```

pub mod descriptor;
pub mod kinds;

pub use descriptor::ErrorDescriptor;
pub use kinds::{
    AdminError, ConfigError, CumulativeOperationError, CursorError, DataApiError, ResponseError,
    Result, TransportError,
};
