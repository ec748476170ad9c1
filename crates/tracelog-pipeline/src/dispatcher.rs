use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, info};

use tracelog_types::TraceRecord;

use crate::error::HandlerError;
use crate::pipeline::PipelineShared;
use crate::registry::HandlerSnapshot;

/// Handle on the single background delivery thread.
///
/// Dropping `cancel` wakes the worker out of its queue wait; the worker
/// finishes the record it is delivering (if any) and exits.
pub(crate) struct Dispatcher {
    cancel: Sender<()>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    pub(crate) fn spawn(shared: Arc<PipelineShared>) -> io::Result<Self> {
        let (cancel, cancelled) = bounded(0);
        let handle = thread::Builder::new()
            .name("tracelog-dispatch".into())
            .spawn(move || run(shared, cancelled))?;
        Ok(Self { cancel, handle })
    }

    /// Cancel the worker and wait for it to exit.
    ///
    /// When called from the worker itself (a handler disabling the
    /// pipeline) the join is skipped; the worker exits once that handler
    /// returns.
    pub(crate) fn stop(self) {
        drop(self.cancel);
        if thread::current().id() == self.handle.thread().id() {
            return;
        }
        if self.handle.join().is_err() {
            error!("dispatcher thread panicked");
        }
    }
}

fn run(shared: Arc<PipelineShared>, cancelled: Receiver<()>) {
    shared.live_dispatchers.fetch_add(1, Ordering::SeqCst);
    info!(capacity = shared.queue.capacity(), "dispatcher started");

    while let Some(record) = shared.queue.take(&cancelled) {
        let handlers = shared.registry.snapshot();
        let failures = deliver(&handlers, &record);
        if failures > 0 {
            shared
                .handler_failures
                .fetch_add(failures, Ordering::Relaxed);
        }
        shared.delivered.fetch_add(1, Ordering::Relaxed);
    }

    info!(pending = shared.queue.len(), "dispatcher stopped");
    shared.live_dispatchers.fetch_sub(1, Ordering::SeqCst);
}

/// Hand one record to every handler in the snapshot, in order.
///
/// A failing or panicking handler is logged and skipped; the remaining
/// handlers still see the record. Returns the number of failures.
pub(crate) fn deliver(handlers: &HandlerSnapshot, record: &TraceRecord) -> u64 {
    let mut failures = 0;
    for handler in handlers.iter() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(record)))
            .unwrap_or_else(|payload| Err(HandlerError::Panicked(panic_message(payload.as_ref()))));

        match outcome {
            Ok(()) => {}
            Err(e) => {
                failures += 1;
                error!(
                    handler = handler.name(),
                    interface = %record.interface,
                    method = %record.method,
                    error = %e,
                    "trace handler failed"
                );
            }
        }
    }
    debug!(method = %record.method, handlers = handlers.len(), "record dispatched");
    failures
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::TraceHandler;
    use std::sync::Mutex;

    #[test]
    fn deliver_isolates_failures() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tail = {
            let seen = seen.clone();
            move |r: &TraceRecord| -> Result<(), HandlerError> {
                seen.lock().unwrap().push(r.method.clone());
                Ok(())
            }
        };
        let handlers: HandlerSnapshot = Arc::new(vec![
            Arc::new(|_: &TraceRecord| -> Result<(), HandlerError> { Err(HandlerError::failed("boom")) })
                as Arc<dyn TraceHandler>,
            Arc::new(|_: &TraceRecord| -> Result<(), HandlerError> { panic!("handler bug") })
                as Arc<dyn TraceHandler>,
            Arc::new(tail) as Arc<dyn TraceHandler>,
        ]);

        let failures = deliver(&handlers, &TraceRecord::new("o", "I", "m", vec![]));
        assert_eq!(failures, 2);
        assert_eq!(*seen.lock().unwrap(), vec!["m".to_string()]);
    }

    #[test]
    fn panic_message_extracts_strings() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
