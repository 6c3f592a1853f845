//! Error types for the decompilation engine.

use std::path::PathBuf;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),

    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Task-store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Unknown task id {0}")]
    UnknownTask(i64),
}

/// Transport-class failures of the model round-trip.
///
/// The worker treats every variant the same way: the whole claimed batch is
/// marked failed with a bumped retry count. A model-reported per-symbol
/// failure is not a `ModelError`.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model call timed out")]
    Timeout,

    #[error("Model endpoint returned status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("No choices returned from model")]
    Empty,

    #[error("Malformed model reply: {0}")]
    Malformed(String),

    #[error("Model call cancelled by shutdown")]
    Cancelled,

    #[error("Request to model endpoint failed: {0}")]
    Request(String),
}

/// Input-scan errors.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No assembly tasks found under {0}")]
    NoTasks(PathBuf),
}

/// Output-assembly errors.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
