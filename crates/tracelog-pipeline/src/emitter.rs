use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::Value;

use tracelog_types::TraceRecord;

use crate::pipeline::PipelineShared;

/// Untyped emission capability bound to one owner and tracer interface.
///
/// Cheap to clone. Emitting never blocks and never fails: when the
/// pipeline is disabled the call returns immediately, and when the queue is
/// full the record is dropped and counted.
#[derive(Clone)]
pub struct Tracer {
    shared: Arc<PipelineShared>,
    owner: Arc<str>,
    interface: Arc<str>,
}

impl Tracer {
    pub(crate) fn new(shared: Arc<PipelineShared>, owner: &str, interface: &str) -> Self {
        Self {
            shared,
            owner: Arc::from(owner),
            interface: Arc::from(interface),
        }
    }

    /// Emit one event.
    pub fn emit(&self, method: &str, args: Vec<Value>) {
        if !self.is_enabled() {
            return;
        }
        let record = TraceRecord::new(&*self.owner, &*self.interface, method, args);
        if self.shared.queue.offer(record).is_err() {
            self.shared.loss.record();
        }
    }

    /// Returns `true` while the owning pipeline accepts events. Lets callers
    /// skip building expensive arguments.
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("owner", &self.owner)
            .field("interface", &self.interface)
            .finish()
    }
}

/// A typed set of event methods backed by a [`Tracer`].
///
/// Implemented by the structs that [`tracer_interface!`](crate::tracer_interface)
/// generates; obtain one with
/// [`Pipeline::create_tracer`](crate::Pipeline::create_tracer).
pub trait TracerInterface: Sized {
    /// Interface name recorded on every emitted record.
    const NAME: &'static str;

    fn from_tracer(tracer: Tracer) -> Self;
}

/// Declare a tracer interface: a struct whose every method emits a record
/// named after the method, carrying the method's arguments in order.
///
/// ```
/// use tracelog_pipeline::{tracer_interface, Pipeline, PipelineConfig};
///
/// tracer_interface! {
///     /// Events raised by the billing service.
///     pub struct BillingEvents {
///         fn charged(account: &str, cents: u64);
///         fn refunded(account: &str);
///     }
/// }
///
/// let pipeline = Pipeline::new(PipelineConfig::default());
/// let events: BillingEvents = pipeline.create_tracer("billing::Service");
/// events.charged("acct-1", 1250);
/// ```
#[macro_export]
macro_rules! tracer_interface {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                fn $method:ident ( $( $arg:ident : $ty:ty ),* $(,)? );
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug)]
        $vis struct $name {
            tracer: $crate::Tracer,
        }

        impl $crate::TracerInterface for $name {
            const NAME: &'static str = stringify!($name);

            fn from_tracer(tracer: $crate::Tracer) -> Self {
                Self { tracer }
            }
        }

        impl $name {
            $(
                $(#[$fmeta])*
                #[allow(clippy::too_many_arguments)]
                pub fn $method(&self, $( $arg : $ty ),*) {
                    if self.tracer.is_enabled() {
                        self.tracer
                            .emit(stringify!($method), vec![$( $crate::to_arg(&$arg) ),*]);
                    }
                }
            )*

            /// Underlying untyped tracer.
            pub fn tracer(&self) -> &$crate::Tracer {
                &self.tracer
            }
        }
    };
}
