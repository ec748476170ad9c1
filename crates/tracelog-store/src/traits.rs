use tracelog_types::TraceTime;

use crate::document::Document;
use crate::error::StoreResult;

/// Size-bounded, append-only document store with tailing reads.
///
/// All implementations must satisfy these invariants:
/// - Documents are never modified once inserted; the oldest may be evicted
///   when the store reaches its size bound.
/// - A tailing cursor yields documents with `time >= from` in insertion
///   order, including documents inserted after the cursor was opened.
/// - A cursor whose position was evicted fails with
///   [`StoreError::CursorInvalidated`](crate::StoreError::CursorInvalidated)
///   rather than skipping silently.
pub trait TraceStore: Send + Sync {
    /// Append one document.
    fn insert(&self, document: Document) -> StoreResult<()>;

    /// Returns `true` if any stored document has `time >= from`.
    fn exists_from(&self, from: TraceTime) -> StoreResult<bool>;

    /// Open a tailing, await-data cursor over documents with `time >= from`.
    fn tail_from(&self, from: TraceTime) -> StoreResult<Box<dyn TailCursor>>;

    /// Whether [`tail_from`](Self::tail_from) needs at least one matching
    /// document to exist to stay open.
    ///
    /// Readers insert a sentinel document before opening a cursor on
    /// stores that return `true`. Engines with native "subscribe from
    /// offset" semantics return `false` and skip that step.
    fn requires_anchor(&self) -> bool {
        true
    }

    /// Highest serial persisted so far, if the store can tell.
    fn last_serial(&self) -> StoreResult<Option<u64>> {
        Ok(None)
    }
}

/// Live read position over a [`TraceStore`].
pub trait TailCursor: Send {
    /// Next matching document, or `Ok(None)` when none is available yet.
    ///
    /// Returning `None` does not end the cursor; later calls observe
    /// documents inserted in the meantime.
    fn try_next(&mut self) -> StoreResult<Option<Document>>;
}
