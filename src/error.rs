//! Error types for fileferry
//!
//! The taxonomy mirrors how failures propagate through the engine:
//! - Configuration and directory-creation errors are fatal at startup for
//!   the whole engine or for one pipeline respectively.
//! - Transfer errors propagate immediately from the transfer step and are
//!   never retried at this layer.
//! - Hook errors are retried per [`crate::config::RetryConfig`] and surface
//!   as [`Error::RetryExhausted`] once attempts run out.
//! - Candidate-scoped errors are isolated and logged; the owning tick
//!   continues with its remaining candidates.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::Violation;

/// Result type alias for fileferry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fileferry
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "poller.fixed_interval")
        key: Option<String>,
    },

    /// Configuration validation produced one or more violations; nothing registers
    #[error("configuration validation failed: [{}]",
        .violations.iter().map(|v| v.to_string()).collect::<Vec<_>>().join("; "))]
    Validation {
        /// Every violation found during the single load-time validation pass
        violations: Vec<Violation>,
    },

    /// A local staging/trigger directory could not be created; the owning
    /// pipeline never runs a tick
    #[error("failed to create local directory {path}: {source}")]
    DirectoryCreation {
        /// The directory that could not be created
        path: PathBuf,
        /// The underlying I/O failure
        source: std::io::Error,
    },

    /// Remote transfer operation failed
    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// A processing hook kept failing until the retry policy ran out
    #[error("[{server}] operation {operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        /// Number of attempts performed (equals the policy's max)
        attempts: u32,
        /// Owning server name
        server: String,
        /// Operation label (e.g., "after_download")
        operation: String,
        /// The last underlying failure
        source: Box<Error>,
    },

    /// The backoff wait was cancelled; remaining retry attempts are abandoned
    #[error("[{server}] operation {operation} interrupted during backoff")]
    InterruptedDuringBackoff {
        /// Owning server name
        server: String,
        /// Operation label
        operation: String,
    },

    /// The worker pool queue is full and the overflow policy is `reject`;
    /// fails this candidate for this tick only
    #[error("worker pool saturated, rejecting candidate for flow {flow_id}")]
    PoolSaturated {
        /// Flow whose candidate was rejected
        flow_id: String,
    },

    /// A user-supplied processing hook failed
    #[error("hook error: {0}")]
    Hook(String),

    /// Metadata store operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Remote transfer errors, raised by [`crate::session::RemoteSession`] implementations
#[derive(Debug, Error)]
pub enum TransferError {
    /// Directory listing failed
    #[error("failed to list {dir}: {reason}")]
    ListFailed {
        /// Remote directory being listed
        dir: String,
        /// Transport-level reason
        reason: String,
    },

    /// Fetching a remote file failed
    #[error("failed to download {path}: {reason}")]
    DownloadFailed {
        /// Remote source path
        path: String,
        /// Transport-level reason
        reason: String,
    },

    /// Writing a remote file failed
    #[error("failed to upload to {path}: {reason}")]
    UploadFailed {
        /// Remote target path
        path: String,
        /// Transport-level reason
        reason: String,
    },

    /// Deleting a remote file failed
    #[error("failed to delete {path}: {reason}")]
    DeleteFailed {
        /// Remote path
        path: String,
        /// Transport-level reason
        reason: String,
    },

    /// Renaming/moving a remote file failed
    #[error("failed to rename {from} to {to}: {reason}")]
    RenameFailed {
        /// Current remote path
        from: String,
        /// Destination remote path
        to: String,
        /// Transport-level reason
        reason: String,
    },

    /// Creating a remote directory failed
    #[error("failed to create remote directory {dir}: {reason}")]
    MkdirFailed {
        /// Remote directory
        dir: String,
        /// Transport-level reason
        reason: String,
    },

    /// No session could be produced for the server
    #[error("no session available for server {server}: {reason}")]
    SessionUnavailable {
        /// Server name
        server: String,
        /// Why the pool or factory could not produce a session
        reason: String,
    },
}

/// Metadata-store errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to open the store
    #[error("failed to connect to metadata store: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}
