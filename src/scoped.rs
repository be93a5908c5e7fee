//! The auto-tracking adapter handed to scope callbacks.
//!
//! Scope bodies do not talk to the native boundary directly; they go
//! through [`ScopedContext`], a wrap-and-forward proxy that passes every
//! produced value through the scope's `track` when it is an
//! ownership-bearing kind. Namespaces and callables get their own wrappers
//! ([`ScopedModule`], [`ScopedFunction`]) that hand out further wrapped
//! values, so arbitrarily deep call chains stay covered without any
//! per-call bookkeeping at the use sites.

use std::sync::Arc;

use crate::error::Error;
use crate::native::{NativeApi, NativeError};
use crate::scope::Scope;
use crate::value::{RawValue, Value, ValueKind};

/// Tracking proxy over the native boundary, bound to one scope.
#[derive(Clone)]
pub struct ScopedContext {
    scope: Scope,
    api: Arc<dyn NativeApi>,
}

impl ScopedContext {
    pub(crate) fn new(scope: Scope, api: Arc<dyn NativeApi>) -> Self {
        ScopedContext { scope, api }
    }

    /// The scope backing this context.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn track(&self, value: &Value) -> Result<Value, Error> {
        self.scope.track(value)
    }

    pub fn escape(&self, value: &Value) -> Result<Value, Error> {
        self.scope.escape(value)
    }

    pub fn untracked<T>(&self, f: impl FnOnce() -> T) -> T {
        self.scope.untracked(f)
    }

    pub fn size(&self) -> usize {
        self.scope.size()
    }

    /// Evaluate native code; the result is tracked if it owns memory.
    pub fn eval(&self, code: &str) -> Result<Value, Error> {
        let raw = self.api.eval(code)?;
        self.intercept(raw)
    }

    /// Import a top-level module. The module handle itself is tracked.
    pub fn import(&self, name: &str) -> Result<ScopedModule, Error> {
        let raw = self.api.import_module(name)?;
        let module = self.intercept(raw)?;
        Ok(ScopedModule {
            module,
            ctx: self.clone(),
        })
    }

    /// Invoke a native callable with already-wrapped arguments.
    pub fn call(&self, func: &Value, args: &[Value]) -> Result<Value, Error> {
        let raw_args: Vec<RawValue> = args.iter().map(Value::native_handle).collect();
        let raw = self.api.call(func.native_handle(), &raw_args)?;
        self.intercept(raw)
    }

    /// Human-readable type description of a value.
    pub fn describe(&self, value: &Value) -> String {
        self.api.describe(value.native_handle())
    }

    /// Wrap a raw handle produced by the boundary, tracking it when its
    /// kind is ownership-bearing and tracking is enabled.
    fn intercept(&self, raw: RawValue) -> Result<Value, Error> {
        let value = Value::new(raw, self.api.kind_of(raw));
        if value.kind().needs_root() && self.scope.tracking_enabled() {
            self.scope.track(&value)
        } else {
            Ok(value)
        }
    }
}

impl std::fmt::Debug for ScopedContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedContext")
            .field("scope", &self.scope)
            .finish()
    }
}

/// A namespace wrapper whose binding reads flow through the scope.
#[derive(Clone)]
pub struct ScopedModule {
    module: Value,
    ctx: ScopedContext,
}

impl ScopedModule {
    pub fn value(&self) -> &Value {
        &self.module
    }

    /// Read a binding; composite results are tracked.
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        let raw = self.ctx.api.lookup(self.module.native_handle(), name)?;
        self.ctx.intercept(raw)
    }

    /// Resolve a binding expected to be callable.
    pub fn function(&self, name: &str) -> Result<ScopedFunction, Error> {
        let func = self.get(name)?;
        if func.kind() != ValueKind::Function {
            return Err(NativeError::new(
                "TypeError",
                format!("{name} is not callable ({:?})", func.kind()),
            )
            .into());
        }
        Ok(ScopedFunction {
            func,
            ctx: self.ctx.clone(),
        })
    }

    /// Resolve a nested namespace.
    pub fn module(&self, name: &str) -> Result<ScopedModule, Error> {
        let module = self.get(name)?;
        if module.kind() != ValueKind::Module {
            return Err(NativeError::new(
                "TypeError",
                format!("{name} is not a module ({:?})", module.kind()),
            )
            .into());
        }
        Ok(ScopedModule {
            module,
            ctx: self.ctx.clone(),
        })
    }

    /// Look up a binding and invoke it in one step.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, Error> {
        let func = self.function(name)?;
        func.call(args)
    }
}

impl std::fmt::Debug for ScopedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedModule")
            .field("module", &self.module)
            .finish()
    }
}

/// A callable wrapper that tracks its results.
#[derive(Clone)]
pub struct ScopedFunction {
    func: Value,
    ctx: ScopedContext,
}

impl ScopedFunction {
    pub fn value(&self) -> &Value {
        &self.func
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        self.ctx.call(&self.func, args)
    }
}

impl std::fmt::Debug for ScopedFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedFunction")
            .field("func", &self.func)
            .finish()
    }
}
