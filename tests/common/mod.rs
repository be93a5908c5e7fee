//! In-process stand-in for the native runtime.
//!
//! Implements just enough of the collaborator boundary to exercise the
//! tracking layer end to end: a heap of payloads keyed by fabricated
//! handles, a tiny expression evaluator, a `Base` module with a few
//! callables, and a `collect` sweep that reclaims everything not present in
//! the root set — which is exactly what the real collector would do.

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use rootscope::{NativeApi, NativeError, RawValue, Value, ValueKind};

#[derive(Debug, Clone)]
pub enum Payload {
    Nothing,
    Int(i64),
    Float(f64),
    Array(Vec<f64>),
    Function(&'static str),
    Module(&'static str),
}

pub struct FakeRuntime {
    heap: Mutex<HashMap<usize, Payload>>,
    next_addr: AtomicUsize,
}

#[allow(dead_code)]
impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeRuntime {
            heap: Mutex::new(HashMap::new()),
            next_addr: AtomicUsize::new(0x7000_0000),
        })
    }

    pub fn alloc(&self, payload: Payload) -> RawValue {
        let addr = self.next_addr.fetch_add(16, Ordering::Relaxed);
        self.heap
            .lock()
            .expect("fake heap poisoned")
            .insert(addr, payload);
        RawValue::from_ptr(addr as *mut c_void)
    }

    /// Allocate an array and hand back a wrapped value, as the marshalling
    /// layer would.
    pub fn array(&self, data: Vec<f64>) -> Value {
        Value::new(self.alloc(Payload::Array(data)), ValueKind::Array)
    }

    pub fn alive(&self, raw: RawValue) -> bool {
        self.heap
            .lock()
            .expect("fake heap poisoned")
            .contains_key(&(raw.as_ptr() as usize))
    }

    pub fn heap_size(&self) -> usize {
        self.heap.lock().expect("fake heap poisoned").len()
    }

    pub fn float_value(&self, raw: RawValue) -> Option<f64> {
        match self.payload(raw)? {
            Payload::Float(x) => Some(x),
            Payload::Int(n) => Some(n as f64),
            _ => None,
        }
    }

    pub fn array_sum(&self, raw: RawValue) -> Option<f64> {
        match self.payload(raw)? {
            Payload::Array(data) => Some(data.iter().sum()),
            _ => None,
        }
    }

    pub fn array_len(&self, raw: RawValue) -> Option<usize> {
        match self.payload(raw)? {
            Payload::Array(data) => Some(data.len()),
            _ => None,
        }
    }

    /// Simulate one native collection cycle: everything not in `roots` is
    /// reclaimed. Returns the number of objects swept.
    pub fn collect(&self, roots: &[RawValue]) -> usize {
        let keep: HashSet<usize> = roots.iter().map(|r| r.as_ptr() as usize).collect();
        let mut heap = self.heap.lock().expect("fake heap poisoned");
        let before = heap.len();
        heap.retain(|addr, _| keep.contains(addr));
        before - heap.len()
    }

    fn payload(&self, raw: RawValue) -> Option<Payload> {
        self.heap
            .lock()
            .expect("fake heap poisoned")
            .get(&(raw.as_ptr() as usize))
            .cloned()
    }

    fn int_arg(&self, args: &[RawValue], i: usize) -> Result<i64, NativeError> {
        match args.get(i).and_then(|&raw| self.payload(raw)) {
            Some(Payload::Int(n)) => Ok(n),
            other => Err(NativeError::new(
                "MethodError",
                format!("expected integer argument at position {i}, got {other:?}"),
            )),
        }
    }

    fn array_arg(&self, args: &[RawValue], i: usize) -> Result<Vec<f64>, NativeError> {
        match args.get(i).and_then(|&raw| self.payload(raw)) {
            Some(Payload::Array(data)) => Ok(data),
            other => Err(NativeError::new(
                "MethodError",
                format!("expected array argument at position {i}, got {other:?}"),
            )),
        }
    }
}

impl NativeApi for FakeRuntime {
    fn eval(&self, code: &str) -> Result<RawValue, NativeError> {
        let code = code.trim();
        if let Ok(n) = code.parse::<i64>() {
            return Ok(self.alloc(Payload::Int(n)));
        }
        if let Some(inner) = code.strip_prefix("zeros(").and_then(|s| s.strip_suffix(')')) {
            let n: usize = inner
                .trim()
                .parse()
                .map_err(|_| NativeError::new("ParseError", format!("bad length in `{code}`")))?;
            return Ok(self.alloc(Payload::Array(vec![0.0; n])));
        }
        if let Some(inner) = code.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            let data = inner
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| s.trim().parse::<f64>())
                .collect::<Result<Vec<f64>, _>>()
                .map_err(|_| NativeError::new("ParseError", format!("bad literal `{code}`")))?;
            return Ok(self.alloc(Payload::Array(data)));
        }
        Err(NativeError::new(
            "ParseError",
            format!("cannot evaluate `{code}`"),
        ))
    }

    fn import_module(&self, name: &str) -> Result<RawValue, NativeError> {
        match name {
            "Base" => Ok(self.alloc(Payload::Module("Base"))),
            _ => Err(NativeError::new(
                "ArgumentError",
                format!("package {name} not found"),
            )),
        }
    }

    fn lookup(&self, module: RawValue, name: &str) -> Result<RawValue, NativeError> {
        match self.payload(module) {
            Some(Payload::Module(_)) => {}
            _ => return Err(NativeError::new("TypeError", "not a module")),
        }
        match name {
            "zeros" | "fill" | "sum" | "first" | "identity" => {
                Ok(self.alloc(Payload::Function(match name {
                    "zeros" => "zeros",
                    "fill" => "fill",
                    "sum" => "sum",
                    "first" => "first",
                    _ => "identity",
                })))
            }
            _ => Err(NativeError::new(
                "UndefVarError",
                format!("`{name}` not defined"),
            )),
        }
    }

    fn call(&self, func: RawValue, args: &[RawValue]) -> Result<RawValue, NativeError> {
        let op = match self.payload(func) {
            Some(Payload::Function(op)) => op,
            other => {
                return Err(NativeError::new(
                    "MethodError",
                    format!("not callable: {other:?}"),
                ));
            }
        };
        match op {
            "zeros" => {
                let n = self.int_arg(args, 0)?;
                Ok(self.alloc(Payload::Array(vec![0.0; n as usize])))
            }
            "fill" => {
                let x = args
                    .first()
                    .and_then(|&raw| self.float_value(raw))
                    .ok_or_else(|| NativeError::new("MethodError", "fill: bad fill value"))?;
                let n = self.int_arg(args, 1)?;
                Ok(self.alloc(Payload::Array(vec![x; n as usize])))
            }
            "sum" => {
                let data = self.array_arg(args, 0)?;
                Ok(self.alloc(Payload::Float(data.iter().sum())))
            }
            "first" => {
                let data = self.array_arg(args, 0)?;
                let first = *data
                    .first()
                    .ok_or_else(|| NativeError::new("BoundsError", "empty array"))?;
                Ok(self.alloc(Payload::Float(first)))
            }
            "identity" => args
                .first()
                .copied()
                .ok_or_else(|| NativeError::new("MethodError", "identity: missing argument")),
            _ => Err(NativeError::new("MethodError", format!("unknown op {op}"))),
        }
    }

    fn kind_of(&self, raw: RawValue) -> ValueKind {
        match self.payload(raw) {
            Some(Payload::Int(_)) => ValueKind::Int,
            Some(Payload::Float(_)) => ValueKind::Float,
            Some(Payload::Array(_)) => ValueKind::Array,
            Some(Payload::Function(_)) => ValueKind::Function,
            Some(Payload::Module(_)) => ValueKind::Module,
            Some(Payload::Nothing) | None => ValueKind::Nothing,
        }
    }

    fn describe(&self, raw: RawValue) -> String {
        match self.payload(raw) {
            Some(Payload::Int(_)) => "Int64".to_string(),
            Some(Payload::Float(_)) => "Float64".to_string(),
            Some(Payload::Array(_)) => "Vector{Float64}".to_string(),
            Some(Payload::Function(op)) => format!("typeof({op})"),
            Some(Payload::Module(name)) => format!("Module {name}"),
            Some(Payload::Nothing) => "Nothing".to_string(),
            None => "<collected>".to_string(),
        }
    }
}
