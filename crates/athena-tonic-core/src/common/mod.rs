//! Types shared between the wire schema and the client runtime.
//!
//! - [`error`] - the unified `Error` / `OAuthError` types.
//! - [`types`] - `Batch`, `ClassificationItem` and batch defaults.

pub mod error;
pub mod types;

pub use error::{BoxError, Error, OAuthError, Result};
pub use types::{Batch, ClassificationItem};
