use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tracelog_types::TraceTime;

use crate::document::Document;
use crate::error::{StoreError, StoreResult};
use crate::traits::{TailCursor, TraceStore};

struct Inner {
    documents: VecDeque<Document>,
    /// Absolute sequence number of `documents[0]`.
    first_seq: u64,
    max_documents: usize,
}

impl Inner {
    fn next_seq(&self) -> u64 {
        self.first_seq + self.documents.len() as u64
    }
}

/// In-memory capped trace store.
///
/// Intended for tests and embedding. Behaves like a capped collection:
/// once `max_documents` is reached the oldest document is evicted for each
/// insert, cursors over evicted positions fail, and a tailing cursor cannot
/// be opened while no document matches its query.
pub struct InMemoryTraceStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryTraceStore {
    /// Create an unbounded store.
    pub fn new() -> Self {
        Self::with_max_documents(usize::MAX)
    }

    /// Create a store holding at most `max_documents` (minimum 1).
    pub fn with_max_documents(max_documents: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                documents: VecDeque::new(),
                first_seq: 0,
                max_documents: max_documents.max(1),
            })),
        }
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").documents.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored document, oldest first.
    pub fn documents(&self) -> Vec<Document> {
        let inner = self.inner.read().expect("lock poisoned");
        inner.documents.iter().cloned().collect()
    }

    /// Remove all documents. Open cursors become invalid.
    pub fn clear(&self) {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.first_seq = inner.next_seq();
        inner.documents.clear();
    }
}

impl Default for InMemoryTraceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceStore for InMemoryTraceStore {
    fn insert(&self, document: Document) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.documents.push_back(document);
        while inner.documents.len() > inner.max_documents {
            inner.documents.pop_front();
            inner.first_seq += 1;
        }
        Ok(())
    }

    fn exists_from(&self, from: TraceTime) -> StoreResult<bool> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.documents.iter().any(|d| d.time >= from))
    }

    fn tail_from(&self, from: TraceTime) -> StoreResult<Box<dyn TailCursor>> {
        let inner = self.inner.read().expect("lock poisoned");
        let index = inner
            .documents
            .iter()
            .position(|d| d.time >= from)
            .ok_or(StoreError::DeadCursor { from })?;
        Ok(Box::new(MemoryCursor {
            inner: Arc::clone(&self.inner),
            next_seq: inner.first_seq + index as u64,
            from,
        }))
    }

    fn last_serial(&self) -> StoreResult<Option<u64>> {
        let inner = self.inner.read().expect("lock poisoned");
        Ok(inner.documents.iter().map(|d| d.serial).max())
    }
}

impl std::fmt::Debug for InMemoryTraceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTraceStore")
            .field("document_count", &self.len())
            .finish()
    }
}

struct MemoryCursor {
    inner: Arc<RwLock<Inner>>,
    next_seq: u64,
    from: TraceTime,
}

impl TailCursor for MemoryCursor {
    fn try_next(&mut self) -> StoreResult<Option<Document>> {
        let inner = self.inner.read().expect("lock poisoned");
        if self.next_seq < inner.first_seq {
            return Err(StoreError::CursorInvalidated {
                position: self.next_seq,
            });
        }
        while self.next_seq < inner.next_seq() {
            let doc = &inner.documents[(self.next_seq - inner.first_seq) as usize];
            self.next_seq += 1;
            if doc.time >= self.from {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracelog_types::time_from_millis;

    fn doc(ms: i64, serial: u64) -> Document {
        Document::new(time_from_millis(ms).unwrap(), serial, json!({ "n": serial }))
    }

    fn t(ms: i64) -> TraceTime {
        time_from_millis(ms).unwrap()
    }

    #[test]
    fn tail_on_empty_match_is_dead() {
        let store = InMemoryTraceStore::new();
        assert!(matches!(
            store.tail_from(t(0)),
            Err(StoreError::DeadCursor { .. })
        ));

        store.insert(doc(10, 1)).unwrap();
        assert!(matches!(
            store.tail_from(t(11)),
            Err(StoreError::DeadCursor { .. })
        ));
        assert!(store.requires_anchor());
    }

    #[test]
    fn cursor_follows_new_inserts() {
        let store = InMemoryTraceStore::new();
        store.insert(doc(5, 1)).unwrap();
        store.insert(doc(10, 2)).unwrap();

        let mut cursor = store.tail_from(t(10)).unwrap();
        assert_eq!(cursor.try_next().unwrap().unwrap().serial, 2);
        assert!(cursor.try_next().unwrap().is_none());

        store.insert(doc(3, 3)).unwrap(); // older than the query; skipped
        store.insert(doc(20, 4)).unwrap();
        assert_eq!(cursor.try_next().unwrap().unwrap().serial, 4);
        assert!(cursor.try_next().unwrap().is_none());
    }

    #[test]
    fn eviction_invalidates_lagging_cursor() {
        let store = InMemoryTraceStore::with_max_documents(2);
        store.insert(doc(1, 1)).unwrap();
        let mut cursor = store.tail_from(t(0)).unwrap();

        store.insert(doc(2, 2)).unwrap();
        store.insert(doc(3, 3)).unwrap();
        assert_eq!(store.len(), 2);

        assert!(matches!(
            cursor.try_next(),
            Err(StoreError::CursorInvalidated { position: 0 })
        ));
    }

    #[test]
    fn exists_and_last_serial() {
        let store = InMemoryTraceStore::new();
        assert!(!store.exists_from(t(0)).unwrap());
        assert_eq!(store.last_serial().unwrap(), None);

        store.insert(doc(100, 7)).unwrap();
        store.insert(doc(50, 3)).unwrap();
        assert!(store.exists_from(t(100)).unwrap());
        assert!(!store.exists_from(t(101)).unwrap());
        assert_eq!(store.last_serial().unwrap(), Some(7));
    }

    #[test]
    fn clear_invalidates_cursors() {
        let store = InMemoryTraceStore::new();
        store.insert(doc(1, 1)).unwrap();
        let mut cursor = store.tail_from(t(0)).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(cursor.try_next().is_err());
    }
}
