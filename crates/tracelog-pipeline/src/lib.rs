//! In-process trace pipeline for tracelog.
//!
//! Application code emits events through tracers that never block; events
//! land in a bounded queue with an explicit drop policy and are fanned out
//! by a single dispatcher thread to the registered handlers.
//!
//! ```text
//! Tracer::emit ──offer──▶ BoundedQueue ──take──▶ Dispatcher ──▶ handler 1
//!   (any thread,            (drop + count                 ├──▶ handler 2
//!    never blocks)           when full)                   └──▶ ...
//! ```

mod dispatcher;
pub mod emitter;
pub mod error;
pub mod handler;
pub mod loss;
pub mod pipeline;
pub mod queue;
pub mod registry;

pub use emitter::{Tracer, TracerInterface};
pub use error::{HandlerError, PipelineError, Result};
pub use handler::{LoggingHandler, TraceHandler};
pub use loss::{LossMonitor, LossReport};
pub use pipeline::{Pipeline, PipelineConfig};
pub use queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
pub use registry::{HandlerRegistry, HandlerSnapshot};
pub use tracelog_types::{to_arg, TraceRecord};
