//! The collaborator boundary to the native runtime.
//!
//! Everything that actually produces or consumes native objects — code
//! evaluation, module and binding lookup, function invocation — lives on the
//! other side of this trait. The rooting layer needs nothing from those
//! operations beyond the raw handles they return and a kind tag per handle.

use crate::value::{RawValue, ValueKind};

/// An error raised inside the native runtime.
///
/// These pass through the tracking layer unaffected; they are orthogonal to
/// scope-lifecycle errors.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeError {
    message: String,
    /// The native runtime's own name for the exception type.
    native_type: String,
}

impl NativeError {
    pub fn new(native_type: impl Into<String>, message: impl Into<String>) -> Self {
        NativeError {
            message: message.into(),
            native_type: native_type.into(),
        }
    }

    pub fn native_type(&self) -> &str {
        &self.native_type
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for NativeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.native_type, self.message)
    }
}

impl std::error::Error for NativeError {}

/// Operations the glue layer needs from the embedded runtime.
///
/// Implementations wrap the actual foreign-function boundary. The contract
/// is deliberately narrow: every operation returns raw handles, and
/// [`kind_of`](NativeApi::kind_of) classifies a handle so the scope layer
/// can decide whether it needs a root slot.
pub trait NativeApi: Send + Sync {
    /// Evaluate a snippet of native code and return the resulting handle.
    fn eval(&self, code: &str) -> Result<RawValue, NativeError>;

    /// Resolve a top-level module by name.
    fn import_module(&self, name: &str) -> Result<RawValue, NativeError>;

    /// Read a binding out of a namespace.
    fn lookup(&self, module: RawValue, name: &str) -> Result<RawValue, NativeError>;

    /// Invoke a native callable.
    fn call(&self, func: RawValue, args: &[RawValue]) -> Result<RawValue, NativeError>;

    /// Classify a handle.
    fn kind_of(&self, raw: RawValue) -> ValueKind;

    /// Human-readable type description, for diagnostics.
    fn describe(&self, raw: RawValue) -> String;
}
