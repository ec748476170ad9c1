use std::io;

use tracelog_store::StoreError;

/// Errors produced by durable log operations.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias used throughout the log crate.
pub type LogResult<T> = Result<T, LogError>;
