//! Deduplicating blocking work queue.
//!
//! The queue is:
//! - **Fair**: items are handed out in the order they were first added.
//! - **Stingy**: an item is never processed by two workers at once, and an
//!   item added several times before it is picked up is processed once.
//! - Safe for many producers and consumers. An item may be re-added while
//!   it is being processed; it is handed out again once the current holder
//!   calls [`DedupQueue::done`].
//! - Shut down gracefully: already-queued items are drained before
//!   [`DedupQueue::get`] starts reporting shutdown.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// The operations a worker loop needs from a queue.
pub trait WorkQueue<T> {
    /// Mark `item` as needing processing.
    fn add(&self, item: T);
    /// Number of items ready to be handed out.
    fn len(&self) -> usize;
    /// Block until an item is ready. `None` means the queue has shut down.
    fn get(&self) -> Option<T>;
    /// Mark `item` as finished processing.
    fn done(&self, item: &T);
    /// Stop accepting new items and wake every blocked `get`.
    fn shut_down(&self);
    /// Whether [`WorkQueue::shut_down`] has been called.
    fn is_shutting_down(&self) -> bool;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct State<T> {
    /// Items ready to be handed out. Every entry is also in `dirty`.
    order: VecDeque<T>,
    /// Items that need a processing pass.
    dirty: HashSet<T>,
    /// Items handed out by `get` and not yet `done`.
    processing: HashSet<T>,
    shutting_down: bool,
    /// Set once `get` has reported shutdown; never cleared.
    drained: bool,
}

/// A fair, stingy, blocking work queue.
///
/// Share it between threads with an `Arc`.
pub struct DedupQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Default for DedupQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DedupQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("DedupQueue")
            .field("len", &state.order.len())
            .field("processing", &state.processing.len())
            .field("shutting_down", &state.shutting_down)
            .finish()
    }
}

impl<T> DedupQueue<T> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                order: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
                drained: false,
            }),
            ready: Condvar::new(),
        }
    }

    // No caller code runs under the lock, so a poisoned lock still guards
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop accepting new items and wake every blocked [`get`](Self::get).
    ///
    /// Items already queued are still handed out. Calling this more than
    /// once has no further effect.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        if !state.shutting_down {
            debug!(queued = state.order.len(), "work queue shutting down");
        }
        state.shutting_down = true;
        self.ready.notify_all();
    }

    /// Whether [`shut_down`](Self::shut_down) has been called.
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of items ready to be handed out.
    ///
    /// This is a snapshot; other threads may change it immediately.
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Whether no item is ready to be handed out.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Eq + Hash + Clone> DedupQueue<T> {
    /// Mark `item` as needing processing.
    ///
    /// Does nothing if the queue is shutting down or the item is already
    /// pending. If the item is currently being processed, it is queued again
    /// when the holder calls [`done`](Self::done).
    pub fn add(&self, item: T) {
        let mut state = self.lock();
        if state.shutting_down || state.dirty.contains(&item) {
            return;
        }
        state.dirty.insert(item.clone());
        if state.processing.contains(&item) {
            return;
        }
        state.order.push_back(item);
        self.ready.notify_one();
    }

    /// Block until an item is ready and check it out.
    ///
    /// Returns `None` once the queue is shutting down and every queued item
    /// has been handed out. After the first `None`, every later call also
    /// returns `None`.
    pub fn get(&self) -> Option<T> {
        let mut state = self.lock();
        while state.order.is_empty() && !state.shutting_down {
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.drained {
            return None;
        }
        let Some(item) = state.order.pop_front() else {
            state.drained = true;
            return None;
        };
        state.dirty.remove(&item);
        state.processing.insert(item.clone());
        Some(item)
    }

    /// Mark `item` as finished.
    ///
    /// If the item was added again while it was checked out, it goes to the
    /// back of the queue. Calling this for an item that is not checked out
    /// does nothing.
    pub fn done(&self, item: &T) {
        let mut state = self.lock();
        if !state.processing.remove(item) {
            return;
        }
        let Some(item) = state.dirty.take(item) else {
            return;
        };
        if state.drained {
            // `get` has already reported shutdown; nobody will collect it.
            debug!(
                processing = state.processing.len(),
                "discarding requeue after shutdown reported"
            );
            return;
        }
        state.order.push_back(item);
        self.ready.notify_one();
    }
}

impl<T: Eq + Hash + Clone> WorkQueue<T> for DedupQueue<T> {
    fn add(&self, item: T) {
        DedupQueue::add(self, item)
    }

    fn len(&self) -> usize {
        DedupQueue::len(self)
    }

    fn get(&self) -> Option<T> {
        DedupQueue::get(self)
    }

    fn done(&self, item: &T) {
        DedupQueue::done(self, item)
    }

    fn shut_down(&self) {
        DedupQueue::shut_down(self)
    }

    fn is_shutting_down(&self) -> bool {
        DedupQueue::is_shutting_down(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants<T: Eq + Hash + Clone + std::fmt::Debug>(q: &DedupQueue<T>) {
        let state = q.lock();
        let unique: HashSet<&T> = state.order.iter().collect();
        assert_eq!(unique.len(), state.order.len(), "duplicate in order");
        for item in &state.order {
            assert!(state.dirty.contains(item), "{item:?} queued but not dirty");
            assert!(
                !state.processing.contains(item),
                "{item:?} both queued and processing"
            );
        }
    }

    #[test]
    fn get_moves_item_from_dirty_to_processing() {
        let q = DedupQueue::new();
        q.add("a");
        assert_invariants(&q);

        assert_eq!(q.get(), Some("a"));
        let state = q.lock();
        assert!(state.processing.contains(&"a"));
        assert!(!state.dirty.contains(&"a"));
        assert!(state.order.is_empty());
    }

    #[test]
    fn readd_while_processing_stays_out_of_order() {
        let q = DedupQueue::new();
        q.add(7);
        assert_eq!(q.get(), Some(7));
        q.add(7);
        q.add(7);
        assert_invariants(&q);
        {
            let state = q.lock();
            assert!(state.order.is_empty());
            assert!(state.dirty.contains(&7));
        }

        q.done(&7);
        assert_invariants(&q);
        let state = q.lock();
        assert_eq!(state.order, VecDeque::from([7]));
        assert!(state.processing.is_empty());
    }

    #[test]
    fn done_on_queued_item_does_not_duplicate_it() {
        let q = DedupQueue::new();
        q.add(1);
        q.done(&1);
        q.done(&1);
        assert_invariants(&q);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn requeue_after_drained_is_discarded() {
        let q = DedupQueue::new();
        q.add(1);
        assert_eq!(q.get(), Some(1));
        q.add(1);
        q.shut_down();

        // Another consumer observes shutdown while 1 is still checked out.
        assert_eq!(q.get(), None);
        q.done(&1);

        let state = q.lock();
        assert!(state.order.is_empty());
        assert!(state.dirty.is_empty());
        assert!(state.processing.is_empty());
    }
}
