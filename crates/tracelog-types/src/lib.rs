//! Foundation types for tracelog.
//!
//! Every other tracelog crate depends on `tracelog-types`. It defines the
//! immutable [`TraceRecord`] that flows from emitters through the pipeline
//! into the durable log and back out through readers.
//!
//! # Key Types
//!
//! - [`TraceRecord`] -- one captured event (time, origin, method, arguments)
//! - [`Position`] -- `(time, serial)` total order of persisted records
//! - [`TraceTime`] -- millisecond-resolution UTC timestamp

pub mod record;

pub use record::{
    now, time_from_millis, to_arg, Position, TraceRecord, TraceTime, SENTINEL_METHOD,
    SENTINEL_OWNER,
};
