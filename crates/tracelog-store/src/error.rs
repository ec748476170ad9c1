use tracelog_types::TraceTime;

/// Errors from trace store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record or document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The store refused to open a tailing cursor because nothing matches
    /// the query yet.
    #[error("no document at or after {from}; tailing cursor would be dead")]
    DeadCursor { from: TraceTime },

    /// The data under an open cursor was evicted or compacted away.
    #[error("cursor invalidated at position {position}")]
    CursorInvalidated { position: u64 },

    /// The backend cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
