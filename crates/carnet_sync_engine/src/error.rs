//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors raised by the local store capability.
///
/// These are fatal for the current cycle: the pipelines abort without
/// advancing the cursor and the error is surfaced to the caller as-is.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Underlying I/O failure (disk full, driver failure).
    #[error("store i/o failure: {0}")]
    Io(String),

    /// The store's contents are inconsistent.
    #[error("store corrupted: {0}")]
    Corruption(String),
}

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The server rejected the request (non-conflict 4xx).
    #[error("server rejected request: {0}")]
    ServerRejection(String),

    /// Malformed wire payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Local store failure during sync.
    #[error("local store error: {0}")]
    Store(#[from] StoreError),

    /// The store lock could not be acquired in time.
    ///
    /// Indicates a stuck prior operation; the cycle is aborted and retried
    /// later.
    #[error("timed out waiting for the store lock")]
    LockTimeout,

    /// Sync was cancelled (engine shutdown).
    #[error("sync cancelled")]
    Cancelled,

    /// The device is offline; no cycle was attempted.
    #[error("device is offline")]
    Offline,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if the failed cycle can be retried automatically.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::LockTimeout => true,
            _ => false,
        }
    }
}
