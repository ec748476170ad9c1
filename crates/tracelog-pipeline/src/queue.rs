use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};

/// Default number of pending records held between emitters and the
/// dispatcher.
pub const DEFAULT_QUEUE_CAPACITY: usize = 15_000;

/// Fixed-capacity FIFO shared by many producers and one consumer.
///
/// Insertion never blocks: when the queue is full the item is handed back
/// to the caller. Removal blocks until an item is available or the
/// consumer's cancel channel fires.
pub struct BoundedQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        Self { tx, rx, capacity }
    }

    /// Insert without blocking. Returns the item back if the queue is full.
    pub fn offer(&self, item: T) -> Result<(), T> {
        match self.tx.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) | Err(TrySendError::Disconnected(item)) => Err(item),
        }
    }

    /// Block until an item is available or `cancel` becomes ready.
    ///
    /// `cancel` is ready when a message is sent on it or when every sender
    /// for it has been dropped. Returns `None` on cancellation.
    pub fn take(&self, cancel: &Receiver<()>) -> Option<T> {
        select! {
            recv(self.rx) -> item => item.ok(),
            recv(cancel) -> _ => None,
        }
    }

    /// Remove the head item if one is present.
    pub fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Number of items currently queued.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> std::fmt::Debug for BoundedQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn fifo_order() {
        let q = BoundedQueue::new(4);
        for i in 0..4 {
            q.offer(i).unwrap();
        }
        let taken: Vec<_> = std::iter::from_fn(|| q.try_take()).collect();
        assert_eq!(taken, vec![0, 1, 2, 3]);
    }

    #[test]
    fn offer_fails_fast_when_full() {
        let q = BoundedQueue::new(2);
        q.offer("a").unwrap();
        q.offer("b").unwrap();
        assert_eq!(q.offer("c"), Err("c"));
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let q = BoundedQueue::new(0);
        assert_eq!(q.capacity(), 1);
        q.offer(1).unwrap();
        assert!(q.offer(2).is_err());
    }

    #[test]
    fn take_returns_none_when_cancelled() {
        let q: BoundedQueue<u32> = BoundedQueue::new(1);
        let (cancel_tx, cancel_rx) = bounded::<()>(0);

        let handle = thread::spawn(move || q.take(&cancel_rx));
        thread::sleep(Duration::from_millis(20));
        drop(cancel_tx);

        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn take_wakes_on_offer() {
        let q = std::sync::Arc::new(BoundedQueue::new(1));
        let (_cancel_tx, cancel_rx) = bounded::<()>(0);

        let consumer = {
            let q = q.clone();
            thread::spawn(move || q.take(&cancel_rx))
        };
        thread::sleep(Duration::from_millis(20));
        q.offer(99).unwrap();

        assert_eq!(consumer.join().unwrap(), Some(99));
    }

    proptest! {
        #[test]
        fn rejected_count_is_overflow(capacity in 1usize..64, emitted in 0usize..200) {
            let q = BoundedQueue::new(capacity);
            let rejected = (0..emitted).filter(|i| q.offer(*i).is_err()).count();
            prop_assert_eq!(rejected, emitted.saturating_sub(capacity));
            prop_assert_eq!(q.len(), emitted.min(capacity));
        }
    }
}
