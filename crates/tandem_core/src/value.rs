//! Runtime-local dynamic values
//!
//! `JsValue` is the materialized form of a value inside one runtime. It is
//! what application code and worklets actually touch; `Shareable` is the
//! cross-runtime wrapper built from and rebuilt into these.

use crate::{RuntimeId, Shareable, ValueError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Native callable body. Errors are surfaced through the guarded-invocation
/// boundary, never unwound into a run loop.
pub type NativeFn = Arc<dyn Fn(&[JsValue]) -> Result<JsValue, ValueError> + Send + Sync>;

/// A function implemented on the native side (or rebuilt there by an
/// unpacker). Identity is the body pointer.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: Arc<str>,
    pub body: NativeFn,
}

impl NativeFunction {
    pub fn new<F>(name: &str, body: F) -> Self
    where
        F: Fn(&[JsValue]) -> Result<JsValue, ValueError> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            body: Arc::new(body),
        }
    }

    pub fn call(&self, args: &[JsValue]) -> Result<JsValue, ValueError> {
        (self.body)(args)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({})", self.name)
    }
}

impl PartialEq for NativeFunction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.body, &other.body)
    }
}

/// The authored, transportable form of a worklet closure: an opaque compiled
/// source. The values it captured at authoring time live on the function
/// value instead, so a closure instance carries exactly one set of captures
/// and they travel as shareables, never as raw origin-runtime values.
#[derive(Debug, Clone)]
pub struct WorkletSource {
    pub name: Arc<str>,
    pub code: Arc<str>,
    /// Marker assigned by the compile step; identifies a closure as
    /// re-instantiable in a runtime other than the one that authored it.
    pub hash: u64,
}

/// How a function value is represented.
#[derive(Debug, Clone)]
pub enum FunctionRepr {
    /// A pre-existing native callback; callable from any runtime.
    Host(NativeFunction),
    /// A plain function authored in one runtime; callable only there.
    Plain(NativeFunction),
    /// A closure carrying the worklet marker; must be unpacked before use.
    /// Captures are restored as live bindings by the target runtime's
    /// unpacker.
    Worklet {
        source: Arc<WorkletSource>,
        captures: Vec<(String, JsValue)>,
    },
}

/// A function value with its runtime affinity.
#[derive(Debug, Clone)]
pub struct JsFunction {
    pub runtime: RuntimeId,
    pub repr: FunctionRepr,
}

impl JsFunction {
    pub fn host(runtime: RuntimeId, function: NativeFunction) -> Self {
        Self {
            runtime,
            repr: FunctionRepr::Host(function),
        }
    }

    pub fn plain(runtime: RuntimeId, function: NativeFunction) -> Self {
        Self {
            runtime,
            repr: FunctionRepr::Plain(function),
        }
    }

    pub fn worklet(
        runtime: RuntimeId,
        source: Arc<WorkletSource>,
        captures: Vec<(String, JsValue)>,
    ) -> Self {
        Self {
            runtime,
            repr: FunctionRepr::Worklet { source, captures },
        }
    }

    pub fn name(&self) -> &str {
        match &self.repr {
            FunctionRepr::Host(f) | FunctionRepr::Plain(f) => &f.name,
            FunctionRepr::Worklet { source, .. } => &source.name,
        }
    }

    /// Invoke the function. A worklet that has not been unpacked has no body
    /// in this runtime and is rejected.
    pub fn call(&self, args: &[JsValue]) -> Result<JsValue, ValueError> {
        match &self.repr {
            FunctionRepr::Host(f) | FunctionRepr::Plain(f) => f.call(args),
            FunctionRepr::Worklet { source, .. } => Err(ValueError::NotCallable {
                name: source.name.to_string(),
            }),
        }
    }
}

/// An opaque platform object passed across the boundary by reference.
pub trait HostObject: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &'static str;
}

/// One runtime-local value.
#[derive(Debug, Clone)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(Arc<str>),
    Symbol(Arc<str>),
    Array(Vec<JsValue>),
    Object(BTreeMap<String, JsValue>),
    ArrayBuffer(Arc<[u8]>),
    Function(JsFunction),
    HostObject(Arc<dyn HostObject>),
    /// An already-wrapped cross-runtime handle observed as a value.
    Handle(Arc<Shareable>),
}

impl JsValue {
    pub fn string(s: &str) -> Self {
        JsValue::String(Arc::from(s))
    }

    pub fn object<I: IntoIterator<Item = (String, JsValue)>>(entries: I) -> Self {
        JsValue::Object(entries.into_iter().collect())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            JsValue::Undefined => "undefined",
            JsValue::Null => "null",
            JsValue::Bool(_) => "boolean",
            JsValue::Number(_) => "number",
            JsValue::BigInt(_) => "bigint",
            JsValue::String(_) => "string",
            JsValue::Symbol(_) => "symbol",
            JsValue::Array(_) => "array",
            JsValue::Object(_) => "object",
            JsValue::ArrayBuffer(_) => "array-buffer",
            JsValue::Function(_) => "function",
            JsValue::HostObject(_) => "host-object",
            JsValue::Handle(_) => "handle",
        }
    }

    pub fn get(&self, key: &str) -> Option<&JsValue> {
        match self {
            JsValue::Object(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Result<&JsFunction, ValueError> {
        match self {
            JsValue::Function(f) => Ok(f),
            other => Err(ValueError::IncompatibleHandleType {
                expected: "function",
                actual: other.kind_name(),
            }),
        }
    }

    /// Convert to plain JSON data. Only data kinds convert; functions,
    /// host objects and handles cannot travel as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        use serde_json::Value;
        Ok(match self {
            JsValue::Undefined | JsValue::Null => Value::Null,
            JsValue::Bool(b) => Value::Bool(*b),
            JsValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            JsValue::BigInt(n) => Value::Number((*n).into()),
            JsValue::String(s) | JsValue::Symbol(s) => Value::String(s.to_string()),
            JsValue::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|v| v.to_json())
                    .collect::<Result<_, _>>()?,
            ),
            JsValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<Result<_, ValueError>>()?,
            ),
            other => {
                return Err(ValueError::UnsupportedValueKind {
                    kind: other.kind_name(),
                })
            }
        })
    }

    pub fn from_json(json: &serde_json::Value) -> JsValue {
        use serde_json::Value;
        match json {
            Value::Null => JsValue::Null,
            Value::Bool(b) => JsValue::Bool(*b),
            Value::Number(n) => JsValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => JsValue::string(s),
            Value::Array(items) => JsValue::Array(items.iter().map(JsValue::from_json).collect()),
            Value::Object(map) => JsValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), JsValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for JsValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JsValue::Undefined, JsValue::Undefined) => true,
            (JsValue::Null, JsValue::Null) => true,
            (JsValue::Bool(a), JsValue::Bool(b)) => a == b,
            (JsValue::Number(a), JsValue::Number(b)) => a == b,
            (JsValue::BigInt(a), JsValue::BigInt(b)) => a == b,
            (JsValue::String(a), JsValue::String(b)) => a == b,
            (JsValue::Symbol(a), JsValue::Symbol(b)) => a == b,
            (JsValue::Array(a), JsValue::Array(b)) => a == b,
            (JsValue::Object(a), JsValue::Object(b)) => a == b,
            (JsValue::ArrayBuffer(a), JsValue::ArrayBuffer(b)) => a == b,
            (JsValue::Function(a), JsValue::Function(b)) => match (&a.repr, &b.repr) {
                (FunctionRepr::Host(x), FunctionRepr::Host(y))
                | (FunctionRepr::Plain(x), FunctionRepr::Plain(y)) => x == y,
                (
                    FunctionRepr::Worklet {
                        source: x,
                        captures: cx,
                    },
                    FunctionRepr::Worklet {
                        source: y,
                        captures: cy,
                    },
                ) => Arc::ptr_eq(x, y) && cx == cy,
                _ => false,
            },
            (JsValue::HostObject(a), JsValue::HostObject(b)) => Arc::ptr_eq(a, b),
            (JsValue::Handle(a), JsValue::Handle(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
