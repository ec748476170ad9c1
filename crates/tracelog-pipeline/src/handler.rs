use tracing::{debug, error, info, trace, warn, Level};

use tracelog_types::TraceRecord;

use crate::error::HandlerError;

/// Side-effect sink for trace records.
///
/// Handlers run on the dispatcher thread, one record at a time, in
/// registration order. They must be fast and must not block: a slow
/// handler delays delivery to every handler registered after it and to
/// every later record. Errors and panics are caught by the dispatcher and
/// logged.
pub trait TraceHandler: Send + Sync {
    /// Process one record.
    fn handle(&self, record: &TraceRecord) -> Result<(), HandlerError>;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<F> TraceHandler for F
where
    F: Fn(&TraceRecord) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, record: &TraceRecord) -> Result<(), HandlerError> {
        self(record)
    }
}

/// Re-emits every record as a `tracing` event under the
/// `tracelog::trace` target.
#[derive(Clone, Debug)]
pub struct LoggingHandler {
    level: Level,
}

impl LoggingHandler {
    pub fn new(level: Level) -> Self {
        Self { level }
    }
}

impl Default for LoggingHandler {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

impl TraceHandler for LoggingHandler {
    fn handle(&self, r: &TraceRecord) -> Result<(), HandlerError> {
        let args = serde_json::Value::Array(r.args.clone());
        if self.level == Level::ERROR {
            error!(target: "tracelog::trace", owner = %r.owner, interface = %r.interface, method = %r.method, %args, "trace");
        } else if self.level == Level::WARN {
            warn!(target: "tracelog::trace", owner = %r.owner, interface = %r.interface, method = %r.method, %args, "trace");
        } else if self.level == Level::INFO {
            info!(target: "tracelog::trace", owner = %r.owner, interface = %r.interface, method = %r.method, %args, "trace");
        } else if self.level == Level::DEBUG {
            debug!(target: "tracelog::trace", owner = %r.owner, interface = %r.interface, method = %r.method, %args, "trace");
        } else {
            trace!(target: "tracelog::trace", owner = %r.owner, interface = %r.interface, method = %r.method, %args, "trace");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "logging"
    }
}
