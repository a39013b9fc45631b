//! Error types for the sync server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors returned by the sync handlers.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The request violates the contract (oversized batch, bad query).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
