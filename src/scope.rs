//! Scopes: bounded lexical regions with deterministic release.
//!
//! A scope records every ownership-bearing value produced while it is
//! active and releases all of them when it is disposed, on every exit path.
//! Values the caller needs afterwards are escaped: removed from the scope's
//! set and handed to the escape registry, which releases the slot when the
//! last host wrapper drops.
//!
//! State machine: `Created → Active → Disposed` (terminal). `track` and
//! `escape` are valid only while active; `dispose` is idempotent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Error;
use crate::roots::{EscapeGuard, RootManager};
use crate::value::{RawValue, Value};

/// Per-scope configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeOptions {
    /// Route every tracked slot through the escape registry instead of
    /// releasing it at dispose. Slower, but safe for scope bodies that
    /// capture native values in closures outliving the lexical scope:
    /// each slot lives until its wrapper actually drops.
    pub safe: bool,
}

struct ScopeState {
    /// value identity → slot index
    tracked: HashMap<RawValue, usize>,
    disposed: bool,
    tracking_enabled: bool,
}

struct ScopeInner {
    roots: Arc<RootManager>,
    seq: u64,
    mark: usize,
    safe: bool,
    state: Mutex<ScopeState>,
}

/// A bounded region owning the set of slot indices it tracked.
///
/// Clones share one underlying scope, so the async entry point can move a
/// handle into a future while the caller keeps another.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub fn new(roots: Arc<RootManager>) -> Self {
        Self::with_options(roots, ScopeOptions::default())
    }

    pub fn with_options(roots: Arc<RootManager>, options: ScopeOptions) -> Self {
        let (seq, mark) = roots.scope_begin();
        Scope {
            inner: Arc::new(ScopeInner {
                roots,
                seq,
                mark,
                safe: options.safe,
                state: Mutex::new(ScopeState {
                    tracked: HashMap::new(),
                    disposed: false,
                    tracking_enabled: true,
                }),
            }),
        }
    }

    /// Protect a value for the lifetime of this scope.
    ///
    /// Idempotent per handle: tracking the same value twice returns it
    /// unchanged without occupying a second slot. Scalar kinds pass through
    /// untouched — they never occupy a slot.
    pub fn track(&self, value: &Value) -> Result<Value, Error> {
        let mut st = self.inner.lock_state();
        if st.disposed {
            return Err(Error::ScopeDisposed);
        }
        if !value.kind().needs_root() {
            return Ok(value.clone());
        }
        let raw = value.native_handle();
        if st.tracked.contains_key(&raw) {
            return Ok(value.clone());
        }
        if let Some(index) = self.inner.roots.push(raw)? {
            st.tracked.insert(raw, index);
            if self.inner.safe && !value.is_escaped() {
                self.inner.register(value, index);
            }
        }
        Ok(value.clone())
    }

    /// Transfer a value out of this scope so it survives disposal.
    ///
    /// The slot is not released; ownership moves to the escape registry,
    /// which clears it when the last wrapper clone drops. This scope's
    /// subsequent dispose will not touch the slot.
    pub fn escape(&self, value: &Value) -> Result<Value, Error> {
        let mut st = self.inner.lock_state();
        if st.disposed {
            return Err(Error::ScopeDisposed);
        }
        if !value.kind().needs_root() {
            return Ok(value.clone());
        }
        let raw = value.native_handle();
        match st.tracked.remove(&raw) {
            Some(index) => {
                if !value.is_escaped() {
                    self.inner.register(value, index);
                }
            }
            None => {
                // Not tracked here: root it directly under registry
                // ownership so it still outlives this scope.
                if !value.is_escaped() {
                    if let Some(index) = self.inner.roots.push(raw)? {
                        self.inner.register(value, index);
                    }
                }
            }
        }
        Ok(value.clone())
    }

    /// Run `f` with auto-tracking suspended for this scope.
    ///
    /// Useful when a loop creates many short-lived values through the
    /// tracking adapter that would otherwise pile up on the root stack.
    /// Explicit [`track`](Self::track) still works inside. Nests correctly
    /// and restores the previous setting on unwind.
    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        let prev = {
            let mut st = self.inner.lock_state();
            std::mem::replace(&mut st.tracking_enabled, false)
        };
        let _restore = RestoreTracking {
            inner: &self.inner,
            prev,
        };
        f()
    }

    /// Release every slot this scope still owns. Idempotent; safe on both
    /// normal return and unwind paths.
    ///
    /// Disposing out of nesting order is reported as
    /// [`Error::NestingViolation`] and releases nothing — the scope stays
    /// active so the caller can dispose inner scopes first and retry.
    pub fn dispose(&self) -> Result<(), Error> {
        self.inner.dispose()
    }

    /// Number of values currently tracked.
    pub fn size(&self) -> usize {
        self.inner.lock_state().tracked.len()
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock_state().disposed
    }

    pub fn is_tracked(&self, value: &Value) -> bool {
        self.inner
            .lock_state()
            .tracked
            .contains_key(&value.native_handle())
    }

    /// The stack position recorded when this scope opened.
    pub fn mark(&self) -> usize {
        self.inner.mark
    }

    pub(crate) fn tracking_enabled(&self) -> bool {
        self.inner.lock_state().tracking_enabled
    }
}

impl ScopeInner {
    fn lock_state(&self) -> MutexGuard<'_, ScopeState> {
        self.state.lock().expect("scope state poisoned")
    }

    fn register(&self, value: &Value, index: usize) {
        if let Some(id) = self.roots.register_escape(index) {
            value.attach_escape(EscapeGuard::new(id, Arc::downgrade(&self.roots)));
        }
    }

    fn dispose(&self) -> Result<(), Error> {
        let mut st = self.lock_state();
        if st.disposed {
            return Ok(());
        }
        let indices: Vec<usize> = if self.safe {
            // Safe mode: slots are registry-owned and release when their
            // wrappers drop; only the mark bookkeeping is retired here.
            Vec::new()
        } else {
            st.tracked.values().copied().collect()
        };
        self.roots.release_scope(self.seq, &indices)?;
        st.tracked.clear();
        st.disposed = true;
        Ok(())
    }
}

impl Drop for ScopeInner {
    fn drop(&mut self) {
        if let Err(e) = self.dispose() {
            tracing::error!("scope {} leaked on drop: {e}", self.seq);
        }
    }
}

impl std::fmt::Debug for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.lock_state();
        f.debug_struct("Scope")
            .field("seq", &self.inner.seq)
            .field("mark", &self.inner.mark)
            .field("size", &st.tracked.len())
            .field("disposed", &st.disposed)
            .finish()
    }
}

struct RestoreTracking<'a> {
    inner: &'a ScopeInner,
    prev: bool,
}

impl Drop for RestoreTracking<'_> {
    fn drop(&mut self) {
        self.inner.lock_state().tracking_enabled = self.prev;
    }
}

/// Values that can cross a scope boundary as the callback's return value.
///
/// The entry points escape whatever the callback returns if the scope still
/// tracks it, so the caller receives a wrapper whose handle stays valid
/// after disposal. Scalars and plain host data escape nothing.
pub trait ScopeResult {
    fn escape_on_return(&self, scope: &Scope) -> Result<(), Error>;
}

impl ScopeResult for Value {
    fn escape_on_return(&self, scope: &Scope) -> Result<(), Error> {
        if scope.is_tracked(self) {
            scope.escape(self)?;
        }
        Ok(())
    }
}

impl<T: ScopeResult> ScopeResult for Option<T> {
    fn escape_on_return(&self, scope: &Scope) -> Result<(), Error> {
        if let Some(v) = self {
            v.escape_on_return(scope)?;
        }
        Ok(())
    }
}

impl<T: ScopeResult> ScopeResult for Vec<T> {
    fn escape_on_return(&self, scope: &Scope) -> Result<(), Error> {
        for v in self {
            v.escape_on_return(scope)?;
        }
        Ok(())
    }
}

macro_rules! passthrough_scope_result {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ScopeResult for $ty {
                fn escape_on_return(&self, _scope: &Scope) -> Result<(), Error> {
                    Ok(())
                }
            }
        )*
    };
}

passthrough_scope_result!((), bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String);
