//! Host-side wrappers around native handles.
//!
//! A [`RawValue`] is an opaque pointer into the native runtime's heap. The
//! tracking layer never inspects what it points at; it only moves handles in
//! and out of root slots. A [`Value`] is the reference-counted host wrapper
//! carrying a handle plus a kind tag — the only two things the rooting layer
//! depends on.

use std::ffi::c_void;
use std::sync::{Arc, Mutex};

use crate::roots::EscapeGuard;

/// Opaque handle to an object owned by the native runtime.
///
/// The null handle is the neutral value written into released root slots.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawValue(*mut c_void);

// SAFETY: RawValue is a plain address. The tracking layer never dereferences
// it; all accesses to the pointee happen on the native side of the boundary,
// which has its own synchronization.
unsafe impl Send for RawValue {}
unsafe impl Sync for RawValue {}

impl RawValue {
    /// The neutral handle stored in cleared slots.
    pub const NULL: RawValue = RawValue(std::ptr::null_mut());

    pub fn from_ptr(ptr: *mut c_void) -> Self {
        RawValue(ptr)
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl std::fmt::Debug for RawValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawValue({:p})", self.0)
    }
}

/// Kind tag for a native value.
///
/// Scalar kinds are marshalled by value and never occupy a root slot.
/// Composite kinds own native memory and must be rooted while host code
/// holds them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Nothing,
    Bool,
    Int,
    Float,
    Str,
    Symbol,
    Array,
    Dict,
    Set,
    Tuple,
    NamedTuple,
    Pair,
    Range,
    Function,
    Module,
}

impl ValueKind {
    /// Whether values of this kind need a root slot while the host holds
    /// them. Tracking every scalar would exhaust stack capacity needlessly,
    /// so only composite, ownership-bearing kinds qualify.
    pub fn needs_root(self) -> bool {
        matches!(
            self,
            ValueKind::Array
                | ValueKind::Dict
                | ValueKind::Set
                | ValueKind::Tuple
                | ValueKind::NamedTuple
                | ValueKind::Pair
                | ValueKind::Range
                | ValueKind::Function
                | ValueKind::Module
        )
    }
}

struct ValueCore {
    raw: RawValue,
    kind: ValueKind,
    /// Present once the value has escaped a scope. Dropping the last clone
    /// of the wrapper drops the guard, which hands the slot back through
    /// the manager's deferred-clear queue.
    escape: Mutex<Option<EscapeGuard>>,
}

/// Reference-counted host wrapper for a native value.
///
/// Clones share one core, so escaping any clone keeps the underlying slot
/// alive for all of them, and the slot is released when the last clone is
/// dropped.
#[derive(Clone)]
pub struct Value {
    core: Arc<ValueCore>,
}

impl Value {
    pub fn new(raw: RawValue, kind: ValueKind) -> Self {
        Value {
            core: Arc::new(ValueCore {
                raw,
                kind,
                escape: Mutex::new(None),
            }),
        }
    }

    /// The native handle this wrapper protects.
    pub fn native_handle(&self) -> RawValue {
        self.core.raw
    }

    pub fn kind(&self) -> ValueKind {
        self.core.kind
    }

    /// Whether this wrapper currently owns an escape registration.
    pub fn is_escaped(&self) -> bool {
        self.core
            .escape
            .lock()
            .expect("value escape state poisoned")
            .is_some()
    }

    pub(crate) fn attach_escape(&self, guard: EscapeGuard) {
        let mut slot = self
            .core
            .escape
            .lock()
            .expect("value escape state poisoned");
        // One registration per wrapper; a second escape is a no-op upstream.
        if slot.is_none() {
            *slot = Some(guard);
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.core.raw == other.core.raw
    }
}

impl Eq for Value {}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value")
            .field("raw", &self.core.raw)
            .field("kind", &self.core.kind)
            .field("escaped", &self.is_escaped())
            .finish()
    }
}
