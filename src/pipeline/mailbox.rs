use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Single-slot mailbox that keeps only the newest item.
///
/// `put` never blocks on the consumer: an item still waiting in the slot is
/// handed back to the producer so it can be dropped. `take` blocks until an
/// item arrives or the mailbox is closed.
pub(crate) struct LatestSlot<T> {
    state: Mutex<SlotState<T>>,
    ready: Condvar,
}

struct SlotState<T> {
    pending: Option<T>,
    closed: bool,
}

/// Outcome of offering an item to the slot.
pub(crate) enum Put<T> {
    /// Stored; the slot was empty.
    Stored,
    /// Stored; this older item was waiting and got replaced.
    Replaced(T),
    /// The mailbox is closed; the item was not stored.
    Closed(T),
}

impl<T> LatestSlot<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: None,
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn put(&self, item: T) -> Put<T> {
        let mut state = self.lock();
        if state.closed {
            return Put::Closed(item);
        }
        let previous = state.pending.replace(item);
        drop(state);
        self.ready.notify_one();
        match previous {
            Some(previous) => Put::Replaced(previous),
            None => Put::Stored,
        }
    }

    /// Wait for the next item. `None` once the mailbox is closed.
    pub(crate) fn take(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if state.closed {
                return None;
            }
            if let Some(item) = state.pending.take() {
                return Some(item);
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Close the mailbox and return whatever was still waiting.
    pub(crate) fn close(&self) -> Option<T> {
        let mut state = self.lock();
        state.closed = true;
        let pending = state.pending.take();
        drop(state);
        self.ready.notify_all();
        pending
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
