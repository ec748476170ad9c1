use std::io;

/// Failure reported by a [`TraceHandler`](crate::TraceHandler).
///
/// The dispatcher logs these and moves on; they never reach the code that
/// emitted the record.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler could not process the record.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler panicked while processing the record.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from any displayable reason.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

/// Errors produced by the pipeline control surface.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The dispatcher thread could not be spawned.
    #[error("failed to spawn dispatcher: {0}")]
    Spawn(#[from] io::Error),
}

/// Convenience alias used throughout the pipeline crate.
pub type Result<T> = std::result::Result<T, PipelineError>;
