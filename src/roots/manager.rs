//! Fail-safe client of the root stack.
//!
//! The manager is what the scope layer actually talks to. It adds three
//! things over the raw stack: a `closed` flag that turns every call after
//! runtime teardown into a graceful no-op (there is nothing left to
//! protect), the escape registry with its deferred-clear queue, and the
//! active-mark bookkeeping that turns out-of-order scope disposal into a
//! detected error instead of silent corruption.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::value::RawValue;

use super::registry::{DeferredClearQueue, EscapeRegistry};
use super::stack::RootStack;

struct ActiveScope {
    seq: u64,
    mark: usize,
}

/// Adapter over [`RootStack`] owning the escape registry and the nesting
/// bookkeeping. One instance per runtime session.
pub struct RootManager {
    stack: RootStack,
    registry: EscapeRegistry,
    pending: DeferredClearQueue,
    scopes: Mutex<Vec<ActiveScope>>,
    next_seq: AtomicU64,
    closed: AtomicBool,
}

impl RootManager {
    /// Create a manager with an initialized stack.
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Arc<Self> {
        let stack = RootStack::with_limit(max_capacity);
        stack.init(initial_capacity);
        Arc::new(RootManager {
            stack,
            registry: EscapeRegistry::new(),
            pending: DeferredClearQueue::new(),
            scopes: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Direct access to the stack, for the native side's root scanner and
    /// for tests.
    pub fn stack(&self) -> &RootStack {
        &self.stack
    }

    /// Push a handle onto the root stack.
    ///
    /// Returns `Ok(None)` after close: by then the native runtime is gone
    /// and there is nothing to protect.
    pub fn push(&self, handle: RawValue) -> Result<Option<usize>, Error> {
        if self.is_closed() {
            tracing::debug!("push after close ignored");
            return Ok(None);
        }
        self.run_pending_clears();
        self.stack.push(handle).map(Some)
    }

    /// Open a scope: record its mark on the active-scope stack and hand back
    /// `(sequence, mark)`. Sequence 0 means the runtime was already closed
    /// and the scope will no-op throughout its life.
    pub fn scope_begin(&self) -> (u64, usize) {
        if self.is_closed() {
            return (0, 0);
        }
        self.run_pending_clears();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let mark = self.stack.mark();
        self.scopes
            .lock()
            .expect("active scope list poisoned")
            .push(ActiveScope { seq, mark });
        (seq, mark)
    }

    /// Close a scope: clear each of its slots, invalidate their pending
    /// escape registrations, pop its mark, and reclaim the cleared suffix.
    ///
    /// Marks must be released like parentheses. If this scope is not the
    /// innermost active one, nothing is released and the violation is
    /// reported so the caller can dispose in LIFO order and retry.
    pub fn release_scope(&self, seq: u64, indices: &[usize]) -> Result<(), Error> {
        if self.is_closed() || seq == 0 {
            return Ok(());
        }
        self.run_pending_clears();
        let mut scopes = self.scopes.lock().expect("active scope list poisoned");
        let top = scopes.last().map(|s| (s.seq, s.mark));
        match top {
            Some((top_seq, mark)) if top_seq == seq => {
                for &index in indices {
                    self.registry.invalidate_index(index);
                    self.stack.set(index, RawValue::NULL);
                }
                scopes.pop();
                drop(scopes);
                self.stack.shrink_cleared_suffix();
                tracing::trace!(
                    "released scope {seq}: {} slots, mark {mark}, stack size {}",
                    indices.len(),
                    self.stack.size()
                );
                Ok(())
            }
            other => {
                let innermost = other.map(|(top_seq, _)| top_seq);
                tracing::error!(
                    "scope {seq} disposed out of order (innermost active: {innermost:?})"
                );
                Err(Error::NestingViolation {
                    scope: seq,
                    innermost,
                })
            }
        }
    }

    /// Register an escape for a slot. Returns the registration id, or `None`
    /// after close.
    pub fn register_escape(&self, index: usize) -> Option<u64> {
        if self.is_closed() {
            return None;
        }
        Some(self.registry.register(index))
    }

    /// Invalidate the pending registration for a slot, if any. Paired with
    /// [`register_escape`](Self::register_escape): every explicit release of
    /// a slot goes through here before the index can be reused.
    pub fn unregister_escape(&self, index: usize) -> bool {
        self.registry.invalidate_index(index).is_some()
    }

    /// Clear one slot through the explicit path.
    pub fn clear_slot(&self, index: usize) {
        if self.is_closed() {
            return;
        }
        self.registry.invalidate_index(index);
        self.stack.set(index, RawValue::NULL);
        self.stack.shrink_cleared_suffix();
    }

    /// Queue a registration's slot for clearing. Called from [`EscapeGuard`]
    /// drops, which may run on any thread.
    ///
    /// [`EscapeGuard`]: super::registry::EscapeGuard
    pub(crate) fn defer_clear(&self, id: u64) {
        if self.is_closed() {
            tracing::trace!("deferred clear {id} after close dropped");
            return;
        }
        self.pending.defer(id);
    }

    /// Apply all queued escape-registry clears under the stack mutex.
    ///
    /// Runs automatically at the start of every manager operation; exposed
    /// so callers can force a settle point.
    pub fn run_pending_clears(&self) {
        if !self.pending.has_pending() {
            return;
        }
        let mut cleared = 0usize;
        for id in self.pending.drain() {
            if let Some(index) = self.registry.take(id) {
                self.stack.set(index, RawValue::NULL);
                cleared += 1;
            }
        }
        if cleared > 0 {
            self.stack.shrink_cleared_suffix();
            tracing::trace!("applied {cleared} deferred slot clears");
        }
    }

    /// Number of native objects currently protected.
    pub fn protected_count(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.run_pending_clears();
        self.stack.live()
    }

    /// Snapshot of every protected handle — the surface a native-side root
    /// scanner consumes.
    pub fn protected_handles(&self) -> Vec<RawValue> {
        if self.is_closed() {
            return Vec::new();
        }
        self.run_pending_clears();
        self.stack.live_handles()
    }

    /// Number of live escape registrations.
    pub fn escape_registrations(&self) -> usize {
        self.registry.len()
    }

    /// Tear down: release the entire stack at once, bypassing scopes, and
    /// make every later call a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pending.drain();
        self.registry.clear();
        self.scopes
            .lock()
            .expect("active scope list poisoned")
            .clear();
        self.stack.close();
        tracing::debug!("root manager closed");
    }
}

impl std::fmt::Debug for RootManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootManager")
            .field("closed", &self.is_closed())
            .field("stack", &self.stack)
            .field("registrations", &self.registry.len())
            .finish()
    }
}
