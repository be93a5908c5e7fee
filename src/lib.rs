pub mod error;
pub mod native;
pub mod roots;
pub mod runtime;
pub mod scope;
pub mod scoped;
pub mod value;

// Core API
pub use error::Error;
pub use native::{NativeApi, NativeError};
pub use roots::{RootManager, RootStack};
pub use runtime::{Runtime, RuntimeConfig};
pub use scope::{Scope, ScopeOptions, ScopeResult};
pub use scoped::{ScopedContext, ScopedFunction, ScopedModule};
pub use value::{RawValue, Value, ValueKind};
