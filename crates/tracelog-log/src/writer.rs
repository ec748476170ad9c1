use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use tracelog_pipeline::{HandlerError, TraceHandler};
use tracelog_store::{DocumentMapper, JsonMapper, StoreResult, TraceStore};
use tracelog_types::{Position, TraceRecord};

use crate::error::LogResult;

/// Trace handler persisting every delivered record into a [`TraceStore`].
///
/// Each record is re-stamped with the next serial before being mapped and
/// inserted. Serials continue from the store's highest persisted serial,
/// read on the first write, so `(time, serial)` stays a total order across
/// restarts and across writers that start disabled.
///
/// Persistence is best effort: a failed write is logged and counted, and
/// [`handle`](TraceHandler::handle) still returns `Ok` so the dispatcher
/// moves on to the next record.
pub struct DurableLogWriter {
    store: Arc<dyn TraceStore>,
    mapper: Arc<dyn DocumentMapper>,
    enabled: AtomicBool,
    /// Last assigned serial; `None` until seeded from the store.
    serial: Mutex<Option<u64>>,
    written: AtomicU64,
    failed: AtomicU64,
}

impl DurableLogWriter {
    pub fn new(
        store: Arc<dyn TraceStore>,
        mapper: Arc<dyn DocumentMapper>,
        write_enabled: bool,
    ) -> Self {
        debug!(write_enabled, "durable log writer created");
        Self {
            store,
            mapper,
            enabled: AtomicBool::new(write_enabled),
            serial: Mutex::new(None),
            written: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Writer using the JSON document mapping.
    pub fn with_json(store: Arc<dyn TraceStore>, write_enabled: bool) -> Self {
        Self::new(store, Arc::new(JsonMapper), write_enabled)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Persist one record, returning its assigned position.
    ///
    /// Ignores the enabled flag; [`TraceHandler::handle`] is the gated entry.
    pub fn write(&self, record: &TraceRecord) -> LogResult<Position> {
        let serial = self.next_serial()?;
        let stamped = record.with_serial(serial);
        let document = self.mapper.serialize(&stamped)?;
        self.store.insert(document)?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(stamped.position())
    }

    /// Serials are seeded lazily; a failed lookup is retried on the next write.
    fn next_serial(&self) -> StoreResult<u64> {
        let mut last = self.serial.lock().expect("serial lock poisoned");
        let base = match *last {
            Some(serial) => serial,
            None => {
                let seeded = self.store.last_serial()?.unwrap_or(0);
                debug!(start_serial = seeded, "serials seeded from store");
                seeded
            }
        };
        *last = Some(base + 1);
        Ok(base + 1)
    }

    /// Records persisted successfully.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Records that could not be persisted.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl TraceHandler for DurableLogWriter {
    fn handle(&self, record: &TraceRecord) -> Result<(), HandlerError> {
        if !self.is_enabled() {
            return Ok(());
        }
        if let Err(e) = self.write(record) {
            self.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                owner = %record.owner,
                method = %record.method,
                time = %record.time,
                error = %e,
                "failed to persist trace record"
            );
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "durable-log"
    }
}

impl std::fmt::Debug for DurableLogWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLogWriter")
            .field("enabled", &self.is_enabled())
            .field("written", &self.written())
            .field("failed", &self.failed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracelog_store::{
        Document, InMemoryTraceStore, StoreError, StoreResult, TailCursor,
    };
    use tracelog_types::{time_from_millis, TraceTime};

    struct DownStore;

    impl TraceStore for DownStore {
        fn insert(&self, _document: Document) -> StoreResult<()> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn exists_from(&self, _from: TraceTime) -> StoreResult<bool> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn tail_from(&self, _from: TraceTime) -> StoreResult<Box<dyn TailCursor>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        fn last_serial(&self) -> StoreResult<Option<u64>> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn record(ms: i64, method: &str) -> TraceRecord {
        TraceRecord::at(time_from_millis(ms).unwrap(), "svc", "Billing", method, vec![])
    }

    #[test]
    fn serials_increase_per_write() {
        let store = Arc::new(InMemoryTraceStore::new());
        let writer = DurableLogWriter::with_json(store.clone(), true);

        writer.handle(&record(10, "a")).unwrap();
        writer.handle(&record(10, "b")).unwrap();
        writer.handle(&record(11, "c")).unwrap();

        let serials: Vec<u64> = store.documents().iter().map(|d| d.serial).collect();
        assert_eq!(serials, vec![1, 2, 3]);
        assert_eq!(writer.written(), 3);
        assert_eq!(writer.failed(), 0);
    }

    #[test]
    fn stored_document_decodes_back() {
        let store = Arc::new(InMemoryTraceStore::new());
        let writer = DurableLogWriter::with_json(store.clone(), true);
        let original = record(42, "charged");

        let position = writer.write(&original).unwrap();
        assert_eq!(position.serial, 1);

        let doc = &store.documents()[0];
        let decoded = JsonMapper.deserialize(doc).unwrap();
        assert_eq!(decoded, original.with_serial(1));
    }

    #[test]
    fn resumes_after_last_persisted_serial() {
        let store = Arc::new(InMemoryTraceStore::new());
        {
            let writer = DurableLogWriter::with_json(store.clone(), true);
            writer.write(&record(1, "a")).unwrap();
            writer.write(&record(2, "b")).unwrap();
        }
        let writer = DurableLogWriter::with_json(store.clone(), true);
        assert_eq!(writer.write(&record(3, "c")).unwrap().serial, 3);
    }

    #[test]
    fn writer_enabled_later_resumes_serials() {
        let store = Arc::new(InMemoryTraceStore::new());
        let first = DurableLogWriter::with_json(store.clone(), true);
        first.write(&record(500, "a")).unwrap();
        first.write(&record(500, "b")).unwrap();

        let second = DurableLogWriter::with_json(store.clone(), false);
        second.set_enabled(true);
        second.handle(&record(500, "c")).unwrap();

        let positions: Vec<_> = store.documents().iter().map(|d| d.position()).collect();
        assert_eq!(positions.last().unwrap().serial, 3);
        let mut unique = positions.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), positions.len());
    }

    #[test]
    fn disabled_writer_does_no_io() {
        let store = Arc::new(InMemoryTraceStore::new());
        let writer = DurableLogWriter::with_json(store.clone(), false);
        writer.handle(&record(1, "a")).unwrap();
        assert!(store.is_empty());
        assert_eq!(writer.written(), 0);

        writer.set_enabled(true);
        writer.handle(&record(2, "b")).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_failure_is_counted_not_propagated() {
        let writer = DurableLogWriter::with_json(Arc::new(DownStore), true);
        assert!(writer.handle(&record(1, "a")).is_ok());
        assert!(writer.handle(&record(2, "b")).is_ok());
        assert_eq!(writer.failed(), 2);
        assert_eq!(writer.written(), 0);
        assert!(writer.write(&record(3, "c")).is_err());
    }
}
