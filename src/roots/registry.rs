//! Escape registry: the safety net for objects that outlive their scope.
//!
//! ## Problem
//!
//! An escaped value's slot must stay live until the last host wrapper
//! referencing it is gone, and that final drop can happen anywhere — on a
//! worker thread, inside a panic unwind, long after the creating scope is
//! disposed. Clearing the slot directly from a drop site would race with
//! stack bookkeeping.
//!
//! ## Solution
//!
//! Each escaped wrapper carries an [`EscapeGuard`]. Dropping the guard
//! queues the registration id on a thread-safe queue; the manager drains the
//! queue under the stack mutex at its next operation and clears the slot —
//! but only if the registration is still live. Explicitly releasing a slot
//! invalidates its registration first, so a stale guard belonging to a dead
//! wrapper can never clear a reused slot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};

use super::manager::RootManager;

struct RegistryState {
    by_id: HashMap<u64, usize>,
    by_index: HashMap<usize, u64>,
    next_id: u64,
}

/// Registration table mapping escape ids to slot indices.
pub(crate) struct EscapeRegistry {
    state: Mutex<RegistryState>,
}

impl EscapeRegistry {
    pub(crate) fn new() -> Self {
        EscapeRegistry {
            state: Mutex::new(RegistryState {
                by_id: HashMap::new(),
                by_index: HashMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Register a slot and return its registration id.
    pub(crate) fn register(&self, index: usize) -> u64 {
        let mut st = self.lock();
        let id = st.next_id;
        st.next_id += 1;
        if let Some(stale) = st.by_index.insert(index, id) {
            // A slot escapes at most once per occupancy; a leftover entry
            // here means the index was reused without invalidation.
            tracing::warn!("slot {index} re-registered while registration {stale} was pending");
            st.by_id.remove(&stale);
        }
        st.by_id.insert(id, index);
        id
    }

    /// Consume a registration, returning the slot it protected.
    /// Returns `None` if it was already invalidated.
    pub(crate) fn take(&self, id: u64) -> Option<usize> {
        let mut st = self.lock();
        let index = st.by_id.remove(&id)?;
        st.by_index.remove(&index);
        Some(index)
    }

    /// Invalidate whatever registration is pending for a slot index.
    /// Called on every explicit release path before the slot is cleared.
    pub(crate) fn invalidate_index(&self, index: usize) -> Option<u64> {
        let mut st = self.lock();
        let id = st.by_index.remove(&index)?;
        st.by_id.remove(&id);
        Some(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub(crate) fn clear(&self) {
        let mut st = self.lock();
        st.by_id.clear();
        st.by_index.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().expect("escape registry poisoned")
    }
}

/// Thread-safe queue of registration ids whose slots are pending a clear.
///
/// Guards may drop from any thread; the queue decouples the drop site from
/// stack mutation, which only ever happens under the manager's control.
pub(crate) struct DeferredClearQueue {
    queue: Mutex<Vec<u64>>,
    /// Fast lock-free check for the hot path.
    pending_count: AtomicU64,
}

impl DeferredClearQueue {
    pub(crate) fn new() -> Self {
        DeferredClearQueue {
            queue: Mutex::new(Vec::new()),
            pending_count: AtomicU64::new(0),
        }
    }

    pub(crate) fn defer(&self, id: u64) {
        self.queue
            .lock()
            .expect("deferred clear queue poisoned")
            .push(id);
        self.pending_count.fetch_add(1, Ordering::Release);
        tracing::trace!("deferred slot clear for registration {id}");
    }

    #[inline]
    pub(crate) fn has_pending(&self) -> bool {
        self.pending_count.load(Ordering::Acquire) > 0
    }

    pub(crate) fn drain(&self) -> Vec<u64> {
        let ids = {
            let mut queue = self.queue.lock().expect("deferred clear queue poisoned");
            std::mem::take(&mut *queue)
        };
        self.pending_count
            .fetch_sub(ids.len() as u64, Ordering::Release);
        ids
    }
}

/// RAII registration held by an escaped wrapper.
///
/// Dropping the guard (with the last wrapper clone) queues the slot clear.
/// If the runtime is already gone the upgrade fails and there is nothing
/// left to protect.
pub struct EscapeGuard {
    id: u64,
    manager: Weak<RootManager>,
}

impl EscapeGuard {
    pub(crate) fn new(id: u64, manager: Weak<RootManager>) -> Self {
        EscapeGuard { id, manager }
    }
}

impl Drop for EscapeGuard {
    fn drop(&mut self) {
        if let Some(manager) = self.manager.upgrade() {
            manager.defer_clear(self.id);
        }
    }
}

impl std::fmt::Debug for EscapeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscapeGuard").field("id", &self.id).finish()
    }
}
