//! Error types for the root-protection layer.

use crate::native::NativeError;

/// Errors surfaced by the rooting and scope layer.
///
/// Scope-lifecycle violations (`ScopeDisposed`, `NestingViolation`) are
/// programmer errors and are reported synchronously, never retried.
/// `CapacityExceeded` means the root stack hit its hard growth ceiling and
/// is not recoverable locally. Native-runtime exceptions pass through as
/// `Native` without being touched by this layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// `track`/`escape` was called on a scope that has already been disposed.
    ScopeDisposed,

    /// The root stack reached its hard capacity while growing.
    CapacityExceeded { requested: usize, capacity: usize },

    /// A scope was disposed while a more recently opened scope was still
    /// active. Marks must be released in LIFO order.
    NestingViolation {
        /// Sequence number of the scope that attempted to dispose.
        scope: u64,
        /// Sequence number of the innermost active scope, if any.
        innermost: Option<u64>,
    },

    /// The root stack was used before `init`.
    NotInitialized,

    /// An error raised by the native runtime itself.
    Native(NativeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::ScopeDisposed => write!(f, "cannot operate on a disposed scope"),
            Error::CapacityExceeded {
                requested,
                capacity,
            } => write!(
                f,
                "root stack capacity exceeded: requested {requested} slots, hard limit is {capacity}"
            ),
            Error::NestingViolation { scope, innermost } => match innermost {
                Some(inner) => write!(
                    f,
                    "scope {scope} disposed out of order: scope {inner} is still active"
                ),
                None => write!(f, "scope {scope} disposed out of order: no scope is active"),
            },
            Error::NotInitialized => write!(f, "root stack is not initialized"),
            Error::Native(e) => write!(f, "native runtime error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Native(e) => Some(e),
            _ => None,
        }
    }
}

impl From<NativeError> for Error {
    fn from(e: NativeError) -> Self {
        Error::Native(e)
    }
}
