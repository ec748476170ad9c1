use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tracelog_store::{DocumentMapper, JsonMapper, StoreError, TailCursor, TraceStore};
use tracelog_types::{now, TraceRecord, TraceTime};

use crate::checkpoint::Checkpoint;
use crate::config::ReaderConfig;
use crate::error::LogResult;

/// Lifecycle of a [`TraceReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// No checkpoint yet; nothing is read.
    Unpositioned,
    /// A cursor is open at a fresh checkpoint.
    Positioned,
    /// The cursor has been polled successfully since positioning.
    Streaming,
    /// The cursor failed; waiting out the backoff before resyncing.
    Recovering,
}

struct CursorSlot {
    generation: u64,
    checkpoint: Checkpoint,
    cursor: Mutex<Box<dyn TailCursor>>,
}

/// Buffered records of the current generation.
///
/// Every reposition bumps `generation`; records read from an older cursor
/// are discarded on arrival.
struct Tail {
    generation: u64,
    state: ReaderState,
    records: VecDeque<TraceRecord>,
}

struct ReaderShared {
    id: Uuid,
    store: Arc<dyn TraceStore>,
    mapper: Arc<dyn DocumentMapper>,
    config: ReaderConfig,
    cursor: RwLock<Option<Arc<CursorSlot>>>,
    tail: Mutex<Tail>,
    positioning: Mutex<()>,
    stop: AtomicBool,
    recoveries: AtomicU64,
}

impl ReaderShared {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Open a cursor at `time` (or just after now) and drop everything
    /// buffered so far.
    fn position(&self, time: Option<TraceTime>) -> LogResult<Checkpoint> {
        let _serial = self.positioning.lock().expect("positioning lock poisoned");
        self.open_at(time)
    }

    /// Resync to just after now, unless the failed cursor was already
    /// replaced by an explicit reposition.
    fn resync(&self, failed_generation: u64) -> LogResult<Option<Checkpoint>> {
        let _serial = self.positioning.lock().expect("positioning lock poisoned");
        if self.tail.lock().expect("tail lock poisoned").generation != failed_generation {
            return Ok(None);
        }
        self.open_at(None).map(Some)
    }

    /// Caller holds `positioning`.
    fn open_at(&self, time: Option<TraceTime>) -> LogResult<Checkpoint> {
        let checkpoint = match time {
            Some(time) => Checkpoint::at(time),
            None => Checkpoint::after_now(),
        };

        if self.store.requires_anchor() && !self.store.exists_from(checkpoint.time())? {
            let sentinel = self.mapper.serialize(&TraceRecord::sentinel(checkpoint.time()))?;
            self.store.insert(sentinel)?;
            debug!(reader = %self.id, %checkpoint, "anchored cursor with sentinel");
        }
        let cursor = self.store.tail_from(checkpoint.time())?;

        let generation = {
            let mut tail = self.tail.lock().expect("tail lock poisoned");
            tail.generation += 1;
            tail.state = ReaderState::Positioned;
            tail.records.clear();
            tail.generation
        };
        *self.cursor.write().expect("cursor lock poisoned") = Some(Arc::new(CursorSlot {
            generation,
            checkpoint,
            cursor: Mutex::new(cursor),
        }));
        Ok(checkpoint)
    }

    fn current(&self) -> Option<Arc<CursorSlot>> {
        self.cursor.read().expect("cursor lock poisoned").clone()
    }

    fn is_full(&self) -> bool {
        self.tail.lock().expect("tail lock poisoned").records.len() >= self.config.max_buffered
    }

    fn push(&self, generation: u64, record: TraceRecord) {
        let mut tail = self.tail.lock().expect("tail lock poisoned");
        if tail.generation == generation {
            tail.records.push_back(record);
        }
    }

    fn mark(&self, generation: u64, state: ReaderState) {
        let mut tail = self.tail.lock().expect("tail lock poisoned");
        if tail.generation == generation {
            tail.state = state;
        }
    }

    /// Sleep on the worker thread until `duration` passes or the reader stops.
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.stopped() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            thread::park_timeout(remaining);
        }
    }

    fn recover(&self, slot: &CursorSlot, err: &StoreError, last_seen: Option<TraceTime>) {
        self.mark(slot.generation, ReaderState::Recovering);
        error!(
            reader = %self.id,
            checkpoint = %slot.checkpoint,
            last_seen = ?last_seen.map(|t| t.to_rfc3339()),
            backoff_ms = self.config.error_backoff_ms,
            error = %err,
            "trace cursor failed; resyncing to now"
        );
        self.pause(self.config.error_backoff());
        if self.stopped() {
            return;
        }
        match self.resync(slot.generation) {
            Ok(Some(checkpoint)) => {
                self.recoveries.fetch_add(1, Ordering::AcqRel);
                warn!(reader = %self.id, %checkpoint, "reader resynced; records before checkpoint skipped");
            }
            Ok(None) => debug!(reader = %self.id, "reader repositioned during backoff; resync skipped"),
            Err(e) => error!(reader = %self.id, error = %e, "reader resync failed"),
        }
    }
}

fn run(shared: Arc<ReaderShared>) {
    debug!(reader = %shared.id, "reader worker started");
    let poll = shared.config.poll_interval();
    let mut last_seen = None;

    while !shared.stopped() {
        let Some(slot) = shared.current() else {
            shared.pause(poll);
            continue;
        };
        if shared.is_full() {
            shared.pause(poll);
            continue;
        }

        let next = slot.cursor.lock().expect("cursor lock poisoned").try_next();
        match next {
            Ok(Some(document)) => {
                shared.mark(slot.generation, ReaderState::Streaming);
                match shared.mapper.deserialize(&document) {
                    Ok(record) if record.is_sentinel() || !slot.checkpoint.admits(&record) => {}
                    Ok(record) => {
                        last_seen = Some(record.time);
                        shared.push(slot.generation, record);
                    }
                    Err(e) => warn!(
                        reader = %shared.id,
                        time = %document.time,
                        serial = document.serial,
                        error = %e,
                        "undecodable trace document; skipping"
                    ),
                }
            }
            Ok(None) => {
                shared.mark(slot.generation, ReaderState::Streaming);
                shared.pause(poll);
            }
            Err(e) => shared.recover(&slot, &e, last_seen),
        }
    }
    debug!(reader = %shared.id, "reader worker stopped");
}

/// Tails the durable log from a checkpoint into a bounded buffer.
///
/// A background thread polls the store cursor and buffers every record at
/// or after the current checkpoint, skipping sentinels. Callers drain the
/// buffer with [`get_traces`](Self::get_traces). When the cursor fails the
/// reader logs the failure, waits out the configured backoff, and
/// repositions just after "now": records written during the outage are
/// skipped, never replayed.
///
/// With reads disabled no thread is started and the store is never
/// touched.
pub struct TraceReader {
    shared: Arc<ReaderShared>,
    worker: Option<JoinHandle<()>>,
    read_enabled: bool,
}

impl TraceReader {
    pub fn new(
        store: Arc<dyn TraceStore>,
        mapper: Arc<dyn DocumentMapper>,
        config: ReaderConfig,
        read_enabled: bool,
    ) -> LogResult<Self> {
        let shared = Arc::new(ReaderShared {
            id: Uuid::now_v7(),
            store,
            mapper,
            config,
            cursor: RwLock::new(None),
            tail: Mutex::new(Tail {
                generation: 0,
                state: ReaderState::Unpositioned,
                records: VecDeque::new(),
            }),
            positioning: Mutex::new(()),
            stop: AtomicBool::new(false),
            recoveries: AtomicU64::new(0),
        });

        let worker = if read_enabled {
            let worker_shared = Arc::clone(&shared);
            Some(
                thread::Builder::new()
                    .name("tracelog-reader".into())
                    .spawn(move || run(worker_shared))?,
            )
        } else {
            None
        };
        info!(reader = %shared.id, read_enabled, "trace reader created");

        Ok(Self {
            shared,
            worker,
            read_enabled,
        })
    }

    /// Reader using the JSON document mapping.
    pub fn with_json(
        store: Arc<dyn TraceStore>,
        config: ReaderConfig,
        read_enabled: bool,
    ) -> LogResult<Self> {
        Self::new(store, Arc::new(JsonMapper), config, read_enabled)
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn is_read_enabled(&self) -> bool {
        self.read_enabled
    }

    /// Reposition the reader.
    ///
    /// `Some(time)` reads from `time` inclusive. `None` reads from the first
    /// millisecond after the current instant. Records buffered before the
    /// call are discarded. With reads disabled this only computes the
    /// checkpoint.
    pub fn move_to(&self, time: Option<TraceTime>) -> LogResult<Checkpoint> {
        if !self.read_enabled {
            return Ok(Checkpoint::at(time.unwrap_or_else(now)));
        }
        let checkpoint = self.shared.position(time)?;
        info!(reader = %self.shared.id, %checkpoint, "reader positioned");
        self.wake();
        Ok(checkpoint)
    }

    /// Drain buffered records in arrival order.
    ///
    /// With `until`, only records strictly earlier than it are removed; the
    /// rest stay buffered for a later call.
    pub fn get_traces(&self, until: Option<TraceTime>) -> Vec<TraceRecord> {
        if !self.read_enabled {
            return Vec::new();
        }
        let drained = {
            let mut tail = self.shared.tail.lock().expect("tail lock poisoned");
            match until {
                None => tail.records.drain(..).collect(),
                Some(until) => {
                    let (taken, kept): (VecDeque<_>, VecDeque<_>) =
                        tail.records.drain(..).partition(|r| r.time < until);
                    tail.records = kept;
                    Vec::from(taken)
                }
            }
        };
        if !drained.is_empty() {
            self.wake();
        }
        drained
    }

    /// Current checkpoint, if positioned.
    pub fn checkpoint(&self) -> Option<Checkpoint> {
        self.shared.current().map(|slot| slot.checkpoint)
    }

    pub fn state(&self) -> ReaderState {
        self.shared.tail.lock().expect("tail lock poisoned").state
    }

    /// Number of automatic resyncs after cursor failures.
    pub fn recovery_count(&self) -> u64 {
        self.shared.recoveries.load(Ordering::Acquire)
    }

    /// Records waiting to be drained.
    pub fn buffered(&self) -> usize {
        self.shared.tail.lock().expect("tail lock poisoned").records.len()
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub fn close(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            worker.thread().unpark();
            if worker.join().is_err() {
                error!(reader = %self.shared.id, "reader worker panicked");
            }
            debug!(reader = %self.shared.id, "trace reader closed");
        }
    }

    fn wake(&self) {
        if let Some(worker) = &self.worker {
            worker.thread().unpark();
        }
    }
}

impl Drop for TraceReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for TraceReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceReader")
            .field("id", &self.shared.id)
            .field("read_enabled", &self.read_enabled)
            .field("state", &self.state())
            .field("checkpoint", &self.checkpoint())
            .field("buffered", &self.buffered())
            .finish()
    }
}
