//! Runtime session: the explicit init/close lifecycle and the scope entry
//! points.
//!
//! The root stack, escape registry, and their capacity counters are
//! process-wide singletons *per native runtime session*, but they are
//! modelled as one constructed service rather than static state so tests
//! can run several independent sessions side by side.

use std::future::Future;
use std::sync::Arc;

use crate::error::Error;
use crate::native::NativeApi;
use crate::roots::{RootManager, DEFAULT_MAX_ROOTS};
use crate::scope::{Scope, ScopeOptions, ScopeResult};
use crate::scoped::ScopedContext;
use crate::value::{RawValue, Value};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Root slots reserved up front.
    pub initial_root_capacity: usize,
    /// Hard ceiling on root slots; exceeding it is fatal.
    pub max_root_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            initial_root_capacity: 256,
            max_root_capacity: DEFAULT_MAX_ROOTS,
        }
    }
}

struct RuntimeInner {
    roots: Arc<RootManager>,
    api: Arc<dyn NativeApi>,
}

impl Drop for RuntimeInner {
    fn drop(&mut self) {
        self.roots.close();
    }
}

/// Handle to one native runtime session.
///
/// Cheap to clone; all clones share the session. The session tears down
/// when [`close`](Runtime::close) is called or the last clone drops,
/// releasing the entire root stack at once and turning every later rooting
/// operation into a graceful no-op.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Start a session over an already-initialized native runtime.
    pub fn init(api: Arc<dyn NativeApi>, config: RuntimeConfig) -> Self {
        let roots = RootManager::new(config.initial_root_capacity, config.max_root_capacity);
        tracing::debug!(
            "runtime session started (root capacity {}/{})",
            config.initial_root_capacity,
            config.max_root_capacity
        );
        Runtime {
            inner: Arc::new(RuntimeInner { roots, api }),
        }
    }

    /// The root manager backing this session.
    pub fn roots(&self) -> &Arc<RootManager> {
        &self.inner.roots
    }

    /// Open a scope for manual management. Prefer [`scope`](Self::scope),
    /// which guarantees disposal.
    pub fn new_scope(&self) -> ScopedContext {
        self.new_scope_with(ScopeOptions::default())
    }

    pub fn new_scope_with(&self, options: ScopeOptions) -> ScopedContext {
        ScopedContext::new(
            Scope::with_options(self.inner.roots.clone(), options),
            self.inner.api.clone(),
        )
    }

    /// Run `f` inside a scope.
    ///
    /// Every ownership-bearing value produced through the context is
    /// tracked; on return the scope is disposed unconditionally. If `f`'s
    /// return value is still tracked it is escaped first, so the caller
    /// receives a wrapper whose handle outlives the scope. Everything else
    /// the callback created is released before this returns.
    pub fn scope<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: ScopeResult,
        F: FnOnce(&ScopedContext) -> Result<T, Error>,
    {
        self.scope_with(ScopeOptions::default(), f)
    }

    pub fn scope_with<T, F>(&self, options: ScopeOptions, f: F) -> Result<T, Error>
    where
        T: ScopeResult,
        F: FnOnce(&ScopedContext) -> Result<T, Error>,
    {
        let ctx = self.new_scope_with(options);
        let result = f(&ctx);
        Self::finish_scope(&ctx, result)
    }

    /// Async variant of [`scope`](Self::scope): the same contract across
    /// suspension points. The context moves into the future; scopes opened
    /// while another is active must still be disposed before their parent,
    /// even across awaits.
    pub async fn scope_async<T, F, Fut>(&self, f: F) -> Result<T, Error>
    where
        T: ScopeResult,
        F: FnOnce(ScopedContext) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        self.scope_async_with(ScopeOptions::default(), f).await
    }

    pub async fn scope_async_with<T, F, Fut>(&self, options: ScopeOptions, f: F) -> Result<T, Error>
    where
        T: ScopeResult,
        F: FnOnce(ScopedContext) -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let ctx = self.new_scope_with(options);
        let result = f(ctx.clone()).await;
        Self::finish_scope(&ctx, result)
    }

    fn finish_scope<T: ScopeResult>(
        ctx: &ScopedContext,
        result: Result<T, Error>,
    ) -> Result<T, Error> {
        match result {
            Ok(value) => {
                value.escape_on_return(ctx.scope())?;
                ctx.scope().dispose()?;
                Ok(value)
            }
            Err(e) => {
                // The callback failed; release what it created, but keep
                // its error as the primary one.
                if let Err(dispose_err) = ctx.scope().dispose() {
                    tracing::error!("scope disposal after callback error failed: {dispose_err}");
                }
                Err(e)
            }
        }
    }

    /// Evaluate native code outside any scope. The result is *not* rooted;
    /// the caller must track or escape it before the native collector runs.
    pub fn eval(&self, code: &str) -> Result<Value, Error> {
        let raw = self.inner.api.eval(code)?;
        Ok(self.wrap(raw))
    }

    /// Import a module outside any scope. Not rooted; see [`eval`](Self::eval).
    pub fn import(&self, name: &str) -> Result<Value, Error> {
        let raw = self.inner.api.import_module(name)?;
        Ok(self.wrap(raw))
    }

    /// Invoke a callable outside any scope. The result is not rooted.
    pub fn call(&self, func: &Value, args: &[Value]) -> Result<Value, Error> {
        let raw_args: Vec<RawValue> = args.iter().map(Value::native_handle).collect();
        let raw = self.inner.api.call(func.native_handle(), &raw_args)?;
        Ok(self.wrap(raw))
    }

    /// Number of native objects currently protected, session-wide.
    pub fn protected_count(&self) -> usize {
        self.inner.roots.protected_count()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.roots.is_closed()
    }

    /// Tear the session down: release the entire root stack at once,
    /// bypassing per-scope disposal. Idempotent.
    pub fn close(&self) {
        self.inner.roots.close();
    }

    fn wrap(&self, raw: RawValue) -> Value {
        Value::new(raw, self.inner.api.kind_of(raw))
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("roots", &self.inner.roots)
            .finish()
    }
}
