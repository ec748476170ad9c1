//! Storage contracts and reference stores for the tracelog durable log.
//!
//! The durable log writes trace records into, and tails them back out of,
//! a size-bounded append-only store. This crate defines the narrow
//! interfaces the log consumes and ships two backends implementing them.
//!
//! # Contracts
//!
//! - [`DocumentMapper`] -- record ⇄ [`Document`] mapping ([`JsonMapper`])
//! - [`TraceStore`] -- insert, existence check, tailing cursor
//! - [`TailCursor`] -- non-terminating read position
//!
//! # Storage Backends
//!
//! - [`InMemoryTraceStore`] -- capped deque; refuses cursors with no match,
//!   so readers anchor it with a sentinel document
//! - [`SegmentTraceStore`] -- CRC-framed append-only file, compacted when it
//!   outgrows its size bound
//!
//! # Design Rules
//!
//! 1. Documents are immutable once written; only eviction removes them.
//! 2. Cursors return documents in insertion order and never end on their own.
//! 3. Losing a cursor's position is an error, never a silent skip.
//! 4. The store never interprets document bodies.

pub mod document;
pub mod error;
pub mod memory;
pub mod segment;
pub mod traits;

pub use document::{Document, DocumentMapper, JsonMapper};
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryTraceStore;
pub use segment::{SegmentConfig, SegmentTraceStore, SyncMode};
pub use traits::{TailCursor, TraceStore};
