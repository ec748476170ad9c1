use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::handler::TraceHandler;

/// Point-in-time view of the registered handlers, in registration order.
pub type HandlerSnapshot = Arc<Vec<Arc<dyn TraceHandler>>>;

/// Thread-safe set of handlers with copy-on-write snapshots.
///
/// Every mutation builds a new list and swaps it in, so a snapshot taken by
/// the dispatcher at the start of a delivery cycle is never affected by
/// registrations made while the cycle runs. Changes show up in the next
/// snapshot.
pub struct HandlerRegistry {
    handlers: RwLock<HandlerSnapshot>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// Add a handler. Returns `false` if this exact handler is already
    /// registered.
    pub fn register(&self, handler: Arc<dyn TraceHandler>) -> bool {
        let mut guard = self.handlers.write().expect("registry lock poisoned");
        if guard.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        debug!(handler = handler.name(), "handler registered");
        next.push(handler);
        *guard = Arc::new(next);
        true
    }

    /// Remove a handler by identity. Returns `true` if it was registered.
    pub fn unregister(&self, handler: &Arc<dyn TraceHandler>) -> bool {
        let mut guard = self.handlers.write().expect("registry lock poisoned");
        let next: Vec<_> = guard
            .iter()
            .filter(|h| !same_handler(h, handler))
            .cloned()
            .collect();
        if next.len() == guard.len() {
            return false;
        }
        debug!(handler = handler.name(), "handler unregistered");
        *guard = Arc::new(next);
        true
    }

    /// Remove every handler.
    pub fn unregister_all(&self) {
        *self.handlers.write().expect("registry lock poisoned") = Arc::new(Vec::new());
    }

    /// Current handler list. Cheap: clones one `Arc`.
    pub fn snapshot(&self) -> HandlerSnapshot {
        Arc::clone(&self.handlers.read().expect("registry lock poisoned"))
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().expect("registry lock poisoned").len()
    }

    /// Returns `true` if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.len())
            .finish()
    }
}

/// Identity comparison on the data pointer only; vtable pointers for the
/// same type may differ across codegen units.
fn same_handler(a: &Arc<dyn TraceHandler>, b: &Arc<dyn TraceHandler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
