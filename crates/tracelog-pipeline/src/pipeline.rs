use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use tracelog_types::TraceRecord;

use crate::dispatcher::Dispatcher;
use crate::emitter::{Tracer, TracerInterface};
use crate::error::Result;
use crate::handler::TraceHandler;
use crate::loss::LossMonitor;
use crate::queue::{BoundedQueue, DEFAULT_QUEUE_CAPACITY};
use crate::registry::HandlerRegistry;

/// Configuration for the [`Pipeline`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum number of records waiting for the dispatcher.
    pub queue_capacity: usize,
    /// Minimum time between two overflow warnings.
    pub lost_log_interval_ms: u64,
    /// Number of dropped records that forces an overflow warning early.
    pub lost_log_threshold: u64,
}

impl PipelineConfig {
    pub fn lost_log_interval(&self) -> Duration {
        Duration::from_millis(self.lost_log_interval_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            lost_log_interval_ms: 1_000,
            lost_log_threshold: 1_000,
        }
    }
}

/// State shared by the pipeline, its tracers, and the dispatcher thread.
pub(crate) struct PipelineShared {
    pub(crate) queue: BoundedQueue<TraceRecord>,
    pub(crate) registry: HandlerRegistry,
    pub(crate) enabled: AtomicBool,
    pub(crate) loss: LossMonitor,
    pub(crate) delivered: AtomicU64,
    pub(crate) handler_failures: AtomicU64,
    pub(crate) live_dispatchers: AtomicUsize,
}

/// In-process trace pipeline: emitters → bounded queue → dispatcher →
/// handlers.
///
/// Construct one per process and share it (typically behind an `Arc`).
/// A new pipeline starts disabled; [`enable`](Self::enable) starts the
/// single dispatcher thread. Dropping the pipeline disables it.
///
/// Handlers must not toggle the pipeline they are registered with.
pub struct Pipeline {
    pub(crate) shared: Arc<PipelineShared>,
    dispatcher: Mutex<Option<Dispatcher>>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let shared = PipelineShared {
            queue: BoundedQueue::new(config.queue_capacity),
            registry: HandlerRegistry::new(),
            enabled: AtomicBool::new(false),
            loss: LossMonitor::new(config.lost_log_interval(), config.lost_log_threshold),
            delivered: AtomicU64::new(0),
            handler_failures: AtomicU64::new(0),
            live_dispatchers: AtomicUsize::new(0),
        };
        Self {
            shared: Arc::new(shared),
            dispatcher: Mutex::new(None),
            config,
        }
    }

    /// Register a handler. Takes effect from the next delivered record.
    pub fn register_handler(&self, handler: Arc<dyn TraceHandler>) -> bool {
        self.shared.registry.register(handler)
    }

    /// Unregister a handler by identity.
    pub fn unregister_handler(&self, handler: &Arc<dyn TraceHandler>) -> bool {
        self.shared.registry.unregister(handler)
    }

    pub fn unregister_all(&self) {
        self.shared.registry.unregister_all();
    }

    /// Turn the pipeline on or off.
    ///
    /// Enabling starts exactly one dispatcher; enabling again is a no-op.
    /// Disabling makes emitters no-ops, cancels the dispatcher's wait, and
    /// joins it. Records still queued stay queued until the next enable.
    /// Calls are serialized, so concurrent toggles never leave more than
    /// one dispatcher running.
    pub fn enable(&self, enabled: bool) -> Result<()> {
        let mut slot = self.dispatcher.lock().expect("dispatcher lock poisoned");
        if enabled {
            if slot.is_some() {
                return Ok(());
            }
            *slot = Some(Dispatcher::spawn(Arc::clone(&self.shared))?);
            self.shared.enabled.store(true, Ordering::Release);
            info!(capacity = self.config.queue_capacity, "trace pipeline enabled");
        } else {
            self.shared.enabled.store(false, Ordering::Release);
            if let Some(dispatcher) = slot.take() {
                dispatcher.stop();
                info!(pending = self.pending(), "trace pipeline disabled");
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Untyped tracer for the given owner and interface name.
    pub fn tracer(&self, owner: &str, interface: &str) -> Tracer {
        Tracer::new(Arc::clone(&self.shared), owner, interface)
    }

    /// Typed tracer generated by [`tracer_interface!`](crate::tracer_interface).
    pub fn create_tracer<T: TracerInterface>(&self, owner: &str) -> T {
        T::from_tracer(self.tracer(owner, T::NAME))
    }

    /// Records dropped because the queue was full.
    pub fn lost_events(&self) -> u64 {
        self.shared.loss.total()
    }

    /// Records handed to the handler set by the dispatcher.
    pub fn delivered(&self) -> u64 {
        self.shared.delivered.load(Ordering::Relaxed)
    }

    /// Handler invocations that returned an error or panicked.
    pub fn handler_failures(&self) -> u64 {
        self.shared.handler_failures.load(Ordering::Relaxed)
    }

    /// Records waiting in the queue.
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Dispatcher threads currently running (0 or 1).
    pub fn live_dispatchers(&self) -> usize {
        self.shared.live_dispatchers.load(Ordering::SeqCst)
    }

    pub fn handler_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.shared.enabled.store(false, Ordering::Release);
        if let Ok(mut slot) = self.dispatcher.lock() {
            if let Some(dispatcher) = slot.take() {
                dispatcher.stop();
            }
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("enabled", &self.is_enabled())
            .field("pending", &self.pending())
            .field("delivered", &self.delivered())
            .field("lost", &self.lost_events())
            .field("handlers", &self.handler_count())
            .finish()
    }
}
