//! Durable trace log for tracelog.
//!
//! Records delivered by the pipeline are persisted by
//! [`DurableLogWriter`] (a [`TraceHandler`](tracelog_pipeline::TraceHandler))
//! into a size-bounded [`TraceStore`](tracelog_store::TraceStore), and read
//! back in near real time by [`TraceReader`].
//!
//! # Reading
//!
//! A reader is positioned with [`TraceReader::move_to`]: at an explicit
//! time, or just after "now". It then tails the store on a background
//! thread and buffers records for [`TraceReader::get_traces`]. Stores that
//! cannot keep an empty cursor open are anchored with a sentinel record
//! that readers never return.
//!
//! Cursor failures are not retried in place. The reader logs the last
//! record it saw, backs off, and resyncs just after the current instant.
//!
//! # Configuration
//!
//! [`TraceLogConfig`] gathers store, reader, and pipeline settings and
//! loads from TOML.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod reader;
pub mod writer;

pub use checkpoint::Checkpoint;
pub use config::{ReaderConfig, StoreConfig, TraceLogConfig};
pub use error::{LogError, LogResult};
pub use reader::{ReaderState, TraceReader};
pub use writer::DurableLogWriter;
