//! The root stack: an append-only array of protected native handles.
//!
//! Logically a LIFO with random-access slots. For a mark M, every index
//! ≥ M stays valid until `release(M)` truncates the suffix or the slot is
//! explicitly moved. All mutation is serialized by one mutex so concurrent
//! native-side threads cannot corrupt the bookkeeping.

use std::sync::Mutex;

use crate::error::Error;
use crate::value::RawValue;

/// Hard ceiling on root slots. Hitting it is a fatal allocation condition,
/// not a recoverable error.
pub const DEFAULT_MAX_ROOTS: usize = 1 << 22;

struct StackState {
    slots: Vec<RawValue>,
    /// Number of non-null slots. Cleared slots stay in place until the
    /// suffix above them is reclaimed, so `slots.len()` alone overcounts.
    live: usize,
    initialized: bool,
}

/// Mutex-protected stack of root slots.
///
/// Constructed per runtime session; `init` and `close` bracket the native
/// runtime's own lifecycle.
pub struct RootStack {
    state: Mutex<StackState>,
    max_capacity: usize,
}

impl RootStack {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_ROOTS)
    }

    /// Create a stack with a custom hard capacity.
    pub fn with_limit(max_capacity: usize) -> Self {
        RootStack {
            state: Mutex::new(StackState {
                slots: Vec::new(),
                live: 0,
                initialized: false,
            }),
            max_capacity,
        }
    }

    /// Initialize with an initial slot capacity. Idempotent.
    pub fn init(&self, capacity: usize) {
        let mut st = self.lock();
        if st.initialized {
            return;
        }
        st.slots.reserve(capacity.min(self.max_capacity));
        st.initialized = true;
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().initialized
    }

    /// Current stack top, used as a release boundary.
    pub fn mark(&self) -> usize {
        self.lock().slots.len()
    }

    /// Push a handle and return its slot index.
    pub fn push(&self, handle: RawValue) -> Result<usize, Error> {
        let mut st = self.lock();
        if !st.initialized {
            return Err(Error::NotInitialized);
        }
        if st.slots.len() >= self.max_capacity {
            return Err(Error::CapacityExceeded {
                requested: st.slots.len() + 1,
                capacity: self.max_capacity,
            });
        }
        // Grow by doubling; Vec only over-allocates past the hard cap if we
        // let it, so clamp the reservation.
        if st.slots.len() == st.slots.capacity() {
            let grown = (st.slots.capacity().max(1) * 2).min(self.max_capacity);
            let additional = grown - st.slots.len();
            st.slots.reserve_exact(additional);
        }
        let index = st.slots.len();
        st.slots.push(handle);
        if !handle.is_null() {
            st.live += 1;
        }
        Ok(index)
    }

    /// Truncate every slot at or above `mark`. O(k) in the number of slots
    /// released, never O(full stack).
    pub fn release(&self, mark: usize) {
        let mut st = self.lock();
        if mark > st.slots.len() {
            tracing::warn!(
                "release mark {} beyond stack top {}",
                mark,
                st.slots.len()
            );
            return;
        }
        let dropped_live = st.slots[mark..].iter().filter(|h| !h.is_null()).count();
        st.slots.truncate(mark);
        st.live -= dropped_live;
    }

    /// Exchange the contents of two slots without disturbing slot identity.
    pub fn swap(&self, i: usize, j: usize) {
        let mut st = self.lock();
        if i >= st.slots.len() || j >= st.slots.len() {
            tracing::warn!("swap({i}, {j}) out of range, stack top {}", st.slots.len());
            return;
        }
        st.slots.swap(i, j);
    }

    pub fn get(&self, index: usize) -> RawValue {
        let st = self.lock();
        match st.slots.get(index) {
            Some(h) => *h,
            None => {
                tracing::warn!("get({index}) out of range, stack top {}", st.slots.len());
                RawValue::NULL
            }
        }
    }

    /// Overwrite a slot's content. Writing the null handle releases the
    /// protection without reclaiming the slot.
    pub fn set(&self, index: usize, handle: RawValue) {
        let mut st = self.lock();
        let Some(old) = st.slots.get(index).copied() else {
            tracing::warn!("set({index}) out of range, stack top {}", st.slots.len());
            return;
        };
        match (old.is_null(), handle.is_null()) {
            (true, false) => st.live += 1,
            (false, true) => st.live -= 1,
            _ => {}
        }
        st.slots[index] = handle;
    }

    /// Number of slots, including cleared ones awaiting reclamation.
    pub fn size(&self) -> usize {
        self.lock().slots.len()
    }

    /// Number of slots holding a live handle.
    pub fn live(&self) -> usize {
        self.lock().live
    }

    pub fn capacity(&self) -> usize {
        self.max_capacity
    }

    /// Pop the contiguous run of cleared slots at the top. This is how
    /// per-slot clears turn back into baseline stack size once the last
    /// holder above them lets go.
    pub fn shrink_cleared_suffix(&self) {
        let mut st = self.lock();
        while st.slots.last().is_some_and(|h| h.is_null()) {
            st.slots.pop();
        }
    }

    /// Snapshot of all live handles, bottom to top. This is the surface the
    /// native collector's root scanner reads.
    pub fn live_handles(&self) -> Vec<RawValue> {
        self.lock()
            .slots
            .iter()
            .copied()
            .filter(|h| !h.is_null())
            .collect()
    }

    /// Release everything at once and de-initialize. Bypasses all scopes.
    pub fn close(&self) {
        let mut st = self.lock();
        st.slots.clear();
        st.live = 0;
        st.initialized = false;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StackState> {
        self.state.lock().expect("root stack poisoned")
    }
}

impl Default for RootStack {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RootStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.lock();
        f.debug_struct("RootStack")
            .field("size", &st.slots.len())
            .field("live", &st.live)
            .field("initialized", &st.initialized)
            .finish()
    }
}
