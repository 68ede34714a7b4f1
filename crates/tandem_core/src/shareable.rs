//! Cross-runtime value wrapper
//!
//! A `Shareable` is the tagged, immutable form of a value that can cross the
//! boundary between the two cooperating runtimes. Wrapping deep-copies the
//! value observed in the origin runtime; materializing rebuilds it inside a
//! target runtime. Each handle caches at most two runtime-specific
//! materializations (the sharing protocol is defined for exactly two
//! cooperating runtimes); a third runtime forces an uncached rebuild.

use crate::sync_holder::SynchronizedDataHolder;
use crate::value::{FunctionRepr, JsFunction, JsValue, NativeFunction, WorkletSource};
use crate::{HostObject, RuntimeContext, RuntimeId, RuntimeLivenessRegistry, ValueError};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Wrap recursion bound. The by-value tree model cannot observe object
/// identity, so a cyclic input would recurse forever; any graph deeper than
/// this is rejected as unshareable.
pub const MAX_WRAP_DEPTH: usize = 256;

#[derive(Debug)]
pub enum ShareableKind {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(Arc<str>),
    Array(Vec<Arc<Shareable>>),
    Object(Vec<(String, Arc<Shareable>)>),
    ArrayBuffer(Arc<[u8]>),
    /// A closure carrying the worklet marker, with its captured values
    /// wrapped alongside it.
    Worklet {
        source: Arc<WorkletSource>,
        captures: Vec<(String, Arc<Shareable>)>,
    },
    /// A pre-existing native callback; callable from any runtime.
    HostFunction(NativeFunction),
    /// A plain function of one runtime; only its home runtime can call it.
    RemoteFunction {
        home: RuntimeId,
        function: NativeFunction,
    },
    /// Lazily initialized per runtime by running an initializer worklet once.
    Lazy { initializer: Arc<Shareable> },
    Synchronized(SynchronizedDataHolder),
    HostObject(Arc<dyn HostObject>),
}

impl ShareableKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShareableKind::Undefined => "undefined",
            ShareableKind::Null => "null",
            ShareableKind::Bool(_) => "boolean",
            ShareableKind::Number(_) => "number",
            ShareableKind::BigInt(_) => "bigint",
            ShareableKind::String(_) => "string",
            ShareableKind::Array(_) => "array",
            ShareableKind::Object(_) => "object",
            ShareableKind::ArrayBuffer(_) => "array-buffer",
            ShareableKind::Worklet { .. } => "worklet",
            ShareableKind::HostFunction(_) => "host-function",
            ShareableKind::RemoteFunction { .. } => "remote-function",
            ShareableKind::Lazy { .. } => "lazy-handle",
            ShareableKind::Synchronized(_) => "synchronized-data-holder",
            ShareableKind::HostObject(_) => "host-object",
        }
    }
}

#[derive(Default)]
struct MaterializationCache {
    primary: Option<(RuntimeId, JsValue)>,
    secondary: Option<(RuntimeId, JsValue)>,
}

/// One shareable value. Reference-counted; may be observed from both
/// runtimes concurrently. The payload is immutable except through the
/// synchronized-data-holder path.
pub struct Shareable {
    kind: ShareableKind,
    origin: RuntimeId,
    cache: Mutex<MaterializationCache>,
    liveness: Arc<RuntimeLivenessRegistry>,
}

impl std::fmt::Debug for Shareable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shareable")
            .field("kind", &self.kind.name())
            .field("origin", &self.origin)
            .finish()
    }
}

impl Shareable {
    /// Deep-copy `value` as observed in runtime `origin` into a shareable.
    /// Already-wrapped handles pass through unchanged.
    pub fn wrap(
        liveness: &Arc<RuntimeLivenessRegistry>,
        origin: RuntimeId,
        value: &JsValue,
    ) -> Result<Arc<Shareable>, ValueError> {
        Self::wrap_at_depth(liveness, origin, value, 0)
    }

    fn wrap_at_depth(
        liveness: &Arc<RuntimeLivenessRegistry>,
        origin: RuntimeId,
        value: &JsValue,
        depth: usize,
    ) -> Result<Arc<Shareable>, ValueError> {
        if depth > MAX_WRAP_DEPTH {
            return Err(ValueError::GraphTooDeep {
                limit: MAX_WRAP_DEPTH,
            });
        }

        let kind = match value {
            JsValue::Handle(shareable) => return Ok(shareable.clone()),
            JsValue::Undefined => ShareableKind::Undefined,
            JsValue::Null => ShareableKind::Null,
            JsValue::Bool(b) => ShareableKind::Bool(*b),
            JsValue::Number(n) => ShareableKind::Number(*n),
            JsValue::BigInt(n) => ShareableKind::BigInt(*n),
            JsValue::String(s) => ShareableKind::String(s.clone()),
            // Symbols travel as their string form; nothing on the UI runtime
            // distinguishes them yet.
            JsValue::Symbol(s) => ShareableKind::String(s.clone()),
            JsValue::Array(items) => ShareableKind::Array(
                items
                    .iter()
                    .map(|item| Self::wrap_at_depth(liveness, origin, item, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            JsValue::Object(map) => ShareableKind::Object(
                map.iter()
                    .map(|(key, item)| {
                        Ok((
                            key.clone(),
                            Self::wrap_at_depth(liveness, origin, item, depth + 1)?,
                        ))
                    })
                    .collect::<Result<_, ValueError>>()?,
            ),
            JsValue::ArrayBuffer(bytes) => ShareableKind::ArrayBuffer(bytes.clone()),
            JsValue::HostObject(object) => ShareableKind::HostObject(object.clone()),
            JsValue::Function(function) => match &function.repr {
                FunctionRepr::Worklet { source, captures } => ShareableKind::Worklet {
                    source: source.clone(),
                    captures: captures
                        .iter()
                        .map(|(key, item)| {
                            Ok((
                                key.clone(),
                                Self::wrap_at_depth(liveness, origin, item, depth + 1)?,
                            ))
                        })
                        .collect::<Result<_, ValueError>>()?,
                },
                FunctionRepr::Host(native) => ShareableKind::HostFunction(native.clone()),
                FunctionRepr::Plain(native) => ShareableKind::RemoteFunction {
                    home: function.runtime,
                    function: native.clone(),
                },
            },
        };

        // Worklets and lazy handles materialize through the target runtime's
        // unpacker, so they carry no eager primary.
        let primary = match kind {
            ShareableKind::Worklet { .. } | ShareableKind::Lazy { .. } => None,
            _ => Some((origin, value.clone())),
        };

        Ok(Arc::new(Shareable {
            kind,
            origin,
            cache: Mutex::new(MaterializationCache {
                primary,
                secondary: None,
            }),
            liveness: liveness.clone(),
        }))
    }

    /// A handle whose per-runtime value is produced by running `initializer`
    /// (a worklet or host function) once in each observing runtime.
    pub fn lazy(
        liveness: &Arc<RuntimeLivenessRegistry>,
        origin: RuntimeId,
        initializer: Arc<Shareable>,
    ) -> Result<Arc<Shareable>, ValueError> {
        match initializer.kind {
            ShareableKind::Worklet { .. } | ShareableKind::HostFunction(_) => {}
            ref other => {
                return Err(ValueError::IncompatibleHandleType {
                    expected: "worklet",
                    actual: other.name(),
                })
            }
        }
        Ok(Arc::new(Shareable {
            kind: ShareableKind::Lazy { initializer },
            origin,
            cache: Mutex::new(MaterializationCache::default()),
            liveness: liveness.clone(),
        }))
    }

    /// A single-writer/multi-reader holder whose current value may be
    /// atomically replaced from either runtime.
    pub fn synchronized(
        liveness: &Arc<RuntimeLivenessRegistry>,
        origin: RuntimeId,
        initial: &JsValue,
    ) -> Result<Arc<Shareable>, ValueError> {
        let inner = Self::wrap(liveness, origin, initial)?;
        Ok(Arc::new(Shareable {
            kind: ShareableKind::Synchronized(SynchronizedDataHolder::new(inner)),
            origin,
            cache: Mutex::new(MaterializationCache::default()),
            liveness: liveness.clone(),
        }))
    }

    pub fn kind(&self) -> &ShareableKind {
        &self.kind
    }

    pub fn origin(&self) -> RuntimeId {
        self.origin
    }

    pub fn is_worklet(&self) -> bool {
        matches!(self.kind, ShareableKind::Worklet { .. })
    }

    pub fn expect_worklet(&self) -> Result<(), ValueError> {
        if self.is_worklet() {
            Ok(())
        } else {
            Err(ValueError::IncompatibleHandleType {
                expected: "worklet",
                actual: self.kind.name(),
            })
        }
    }

    pub fn expect_remote_function(&self) -> Result<RuntimeId, ValueError> {
        match &self.kind {
            ShareableKind::RemoteFunction { home, .. } => Ok(*home),
            other => Err(ValueError::IncompatibleHandleType {
                expected: "remote-function",
                actual: other.name(),
            }),
        }
    }

    fn holder(&self) -> Result<&SynchronizedDataHolder, ValueError> {
        match &self.kind {
            ShareableKind::Synchronized(holder) => Ok(holder),
            other => Err(ValueError::IncompatibleHandleType {
                expected: "synchronized-data-holder",
                actual: other.name(),
            }),
        }
    }

    /// Read the holder's latest fully-set value, materialized for `ctx`.
    pub fn synchronized_get(&self, ctx: &dyn RuntimeContext) -> Result<JsValue, ValueError> {
        self.holder()?.get(ctx)
    }

    /// Replace the holder's value. Both cached materializations are
    /// invalidated; the next read from either runtime re-derives a
    /// consistent snapshot.
    pub fn synchronized_set(&self, writer: RuntimeId, value: &JsValue) -> Result<(), ValueError> {
        let replacement = Self::wrap(&self.liveness, writer, value)?;
        self.holder()?.set(replacement);
        Ok(())
    }

    /// Produce a value usable in `ctx`'s runtime.
    ///
    /// The runtime that wrapped the value gets its eagerly built primary
    /// materialization back; exactly one other runtime gets a lazily built,
    /// cached secondary; any further runtime gets an uncached rebuild.
    pub fn materialize(self: &Arc<Self>, ctx: &dyn RuntimeContext) -> Result<JsValue, ValueError> {
        match &self.kind {
            // The holder is addressed through the handle itself from both
            // runtimes; there is nothing runtime-local to cache.
            ShareableKind::Synchronized(_) => return Ok(JsValue::Handle(self.clone())),
            // Off its home runtime a remote function stays a handle, so it
            // can be captured and later scheduled back home.
            ShareableKind::RemoteFunction { home, .. } if *home != ctx.id() => {
                return Ok(JsValue::Handle(self.clone()))
            }
            _ => {}
        }

        let runtime = ctx.id();
        if let Some(cached) = self.cached_for(runtime) {
            return Ok(cached);
        }
        let built = self.build(ctx)?;
        Ok(self.store_cached(runtime, built))
    }

    fn cached_for(&self, runtime: RuntimeId) -> Option<JsValue> {
        let cache = self.cache.lock();
        if let Some((rt, value)) = &cache.primary {
            if *rt == runtime {
                return Some(value.clone());
            }
        }
        if let Some((rt, value)) = &cache.secondary {
            if *rt == runtime {
                return Some(value.clone());
            }
        }
        None
    }

    fn store_cached(&self, runtime: RuntimeId, built: JsValue) -> JsValue {
        let mut cache = self.cache.lock();
        // Another thread may have filled the slot while we were building;
        // keep the first materialization so identity stays stable.
        if let Some((rt, value)) = &cache.primary {
            if *rt == runtime {
                return value.clone();
            }
        }
        if let Some((rt, value)) = &cache.secondary {
            if *rt == runtime {
                return value.clone();
            }
        }
        if runtime == self.origin {
            cache.primary = Some((runtime, built.clone()));
        } else if cache.secondary.is_none() {
            cache.secondary = Some((runtime, built.clone()));
        }
        // A third distinct runtime gets the value uncached.
        built
    }

    /// Build a fresh materialization for `ctx`; never touches the cache.
    fn build(self: &Arc<Self>, ctx: &dyn RuntimeContext) -> Result<JsValue, ValueError> {
        Ok(match &self.kind {
            ShareableKind::Undefined => JsValue::Undefined,
            ShareableKind::Null => JsValue::Null,
            ShareableKind::Bool(b) => JsValue::Bool(*b),
            ShareableKind::Number(n) => JsValue::Number(*n),
            ShareableKind::BigInt(n) => JsValue::BigInt(*n),
            ShareableKind::String(s) => JsValue::String(s.clone()),
            ShareableKind::Array(items) => JsValue::Array(
                items
                    .iter()
                    .map(|item| item.materialize(ctx))
                    .collect::<Result<_, _>>()?,
            ),
            ShareableKind::Object(entries) => JsValue::Object(
                entries
                    .iter()
                    .map(|(key, item)| Ok((key.clone(), item.materialize(ctx)?)))
                    .collect::<Result<BTreeMap<_, _>, ValueError>>()?,
            ),
            ShareableKind::ArrayBuffer(bytes) => JsValue::ArrayBuffer(bytes.clone()),
            ShareableKind::HostObject(object) => JsValue::HostObject(object.clone()),
            ShareableKind::HostFunction(native) => {
                JsValue::Function(JsFunction::host(ctx.id(), native.clone()))
            }
            ShareableKind::RemoteFunction { home, function } => {
                debug_assert_eq!(*home, ctx.id());
                JsValue::Function(JsFunction::plain(*home, function.clone()))
            }
            ShareableKind::Worklet { source, captures } => {
                let mut env = BTreeMap::new();
                for (key, item) in captures {
                    env.insert(key.clone(), item.materialize(ctx)?);
                }
                ctx.unpack(source, JsValue::Object(env))?
            }
            ShareableKind::Lazy { initializer } => {
                let factory = initializer.materialize(ctx)?;
                factory.as_function()?.call(&[])?
            }
            ShareableKind::Synchronized(_) => unreachable!("handled in materialize"),
        })
    }

    /// Explicitly release the cached secondary materialization. If the
    /// runtime that owns it is already gone the cached value is leaked
    /// instead of released.
    pub fn detach_secondary(&self) {
        let taken = self.cache.lock().secondary.take();
        if let Some((runtime, value)) = taken {
            if !self.liveness.is_alive(runtime) {
                tracing::debug!(%runtime, "leaking secondary materialization of a torn-down runtime");
                std::mem::forget(value);
            }
        }
    }
}

impl Drop for Shareable {
    fn drop(&mut self) {
        if let Some((runtime, value)) = self.cache.get_mut().secondary.take() {
            if !self.liveness.is_alive(runtime) {
                tracing::debug!(%runtime, "leaking secondary materialization of a torn-down runtime");
                std::mem::forget(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::NativeFn;

    /// Runtime stand-in whose unpacker rebuilds a worklet as a fresh native
    /// closure returning the capture named "answer".
    struct TestRuntime {
        id: RuntimeId,
    }

    impl TestRuntime {
        fn new(id: u64) -> Self {
            Self { id: RuntimeId(id) }
        }
    }

    impl RuntimeContext for TestRuntime {
        fn id(&self) -> RuntimeId {
            self.id
        }

        fn unpack(
            &self,
            source: &WorkletSource,
            captures: JsValue,
        ) -> Result<JsValue, ValueError> {
            let answer = captures
                .get("answer")
                .cloned()
                .unwrap_or(JsValue::Undefined);
            let body: NativeFn = Arc::new(move |_args| Ok(answer.clone()));
            Ok(JsValue::Function(JsFunction::host(
                self.id,
                NativeFunction {
                    name: source.name.clone(),
                    body,
                },
            )))
        }
    }

    fn registry() -> Arc<RuntimeLivenessRegistry> {
        let liveness = Arc::new(RuntimeLivenessRegistry::new());
        for id in 1..=3 {
            liveness.register(RuntimeId(id));
        }
        liveness
    }

    fn sample_object() -> JsValue {
        JsValue::object([
            ("a".to_string(), JsValue::Number(1.0)),
            (
                "b".to_string(),
                JsValue::Array(vec![JsValue::Bool(true), JsValue::string("x")]),
            ),
        ])
    }

    #[test]
    fn test_round_trip_between_runtimes() {
        let liveness = registry();
        let r1 = TestRuntime::new(1);
        let r2 = TestRuntime::new(2);

        let value = sample_object();
        let shareable = Shareable::wrap(&liveness, r1.id(), &value).unwrap();

        assert_eq!(shareable.materialize(&r2).unwrap(), value);
        assert_eq!(shareable.materialize(&r1).unwrap(), value);
    }

    #[test]
    fn test_wrap_is_idempotent() {
        let liveness = registry();
        let r1 = TestRuntime::new(1);

        let shareable = Shareable::wrap(&liveness, r1.id(), &sample_object()).unwrap();
        let rewrapped =
            Shareable::wrap(&liveness, r1.id(), &JsValue::Handle(shareable.clone())).unwrap();
        assert!(Arc::ptr_eq(&shareable, &rewrapped));
    }

    fn function_identity(value: &JsValue) -> *const () {
        match value {
            JsValue::Function(JsFunction {
                repr: FunctionRepr::Host(native),
                ..
            }) => Arc::as_ptr(&native.body) as *const (),
            other => panic!("expected a host function, got {}", other.kind_name()),
        }
    }

    fn worklet(name: &str) -> JsValue {
        JsValue::Function(JsFunction::worklet(
            RuntimeId(1),
            Arc::new(WorkletSource {
                name: Arc::from(name),
                code: Arc::from("() => answer"),
                hash: 0xbeef,
            }),
            vec![("answer".to_string(), JsValue::Number(42.0))],
        ))
    }

    #[test]
    fn test_single_secondary_cache() {
        let liveness = registry();
        let r1 = TestRuntime::new(1);
        let r2 = TestRuntime::new(2);
        let r3 = TestRuntime::new(3);

        let shareable = Shareable::wrap(&liveness, r1.id(), &worklet("w")).unwrap();

        let first = shareable.materialize(&r2).unwrap();
        let second = shareable.materialize(&r2).unwrap();
        assert_eq!(function_identity(&first), function_identity(&second));

        // A third runtime rebuilds without caching and without evicting.
        let third = shareable.materialize(&r3).unwrap();
        assert_ne!(function_identity(&first), function_identity(&third));
        let fourth = shareable.materialize(&r3).unwrap();
        assert_ne!(function_identity(&third), function_identity(&fourth));

        let again = shareable.materialize(&r2).unwrap();
        assert_eq!(function_identity(&first), function_identity(&again));
    }

    #[test]
    fn test_unpacked_worklet_sees_captures() {
        let liveness = registry();
        let r2 = TestRuntime::new(2);

        let shareable = Shareable::wrap(&liveness, RuntimeId(1), &worklet("w")).unwrap();
        let callable = shareable.materialize(&r2).unwrap();
        let result = callable.as_function().unwrap().call(&[]).unwrap();
        assert_eq!(result, JsValue::Number(42.0));
    }

    #[test]
    fn test_closures_sharing_a_source_keep_their_own_captures() {
        let liveness = registry();
        let r2 = TestRuntime::new(2);

        // One compiled source, two closure instances with different capture
        // environments; the wrapped captures are all that crosses over.
        let source = Arc::new(WorkletSource {
            name: Arc::from("shared"),
            code: Arc::from("() => answer"),
            hash: 0xbeef,
        });
        let first = JsValue::Function(JsFunction::worklet(
            RuntimeId(1),
            source.clone(),
            vec![("answer".to_string(), JsValue::Number(1.0))],
        ));
        let second = JsValue::Function(JsFunction::worklet(
            RuntimeId(1),
            source,
            vec![("answer".to_string(), JsValue::Number(2.0))],
        ));

        let a = Shareable::wrap(&liveness, RuntimeId(1), &first).unwrap();
        let b = Shareable::wrap(&liveness, RuntimeId(1), &second).unwrap();
        let call = |s: &Arc<Shareable>| {
            s.materialize(&r2)
                .unwrap()
                .as_function()
                .unwrap()
                .call(&[])
                .unwrap()
        };
        assert_eq!(call(&a), JsValue::Number(1.0));
        assert_eq!(call(&b), JsValue::Number(2.0));
    }

    #[test]
    fn test_remote_function_stays_handle_off_home() {
        let liveness = registry();
        let r1 = TestRuntime::new(1);
        let r2 = TestRuntime::new(2);

        let plain = JsValue::Function(JsFunction::plain(
            r1.id(),
            NativeFunction::new("callback", |_| Ok(JsValue::Undefined)),
        ));
        let shareable = Shareable::wrap(&liveness, r1.id(), &plain).unwrap();

        assert!(matches!(
            shareable.materialize(&r2).unwrap(),
            JsValue::Handle(_)
        ));
        assert!(matches!(
            shareable.materialize(&r1).unwrap(),
            JsValue::Function(_)
        ));
    }

    #[test]
    fn test_synchronized_holder_set_invalidates() {
        let liveness = registry();
        let r1 = TestRuntime::new(1);
        let r2 = TestRuntime::new(2);

        let holder = Shareable::synchronized(&liveness, r1.id(), &JsValue::Number(1.0)).unwrap();
        assert_eq!(
            holder.synchronized_get(&r2).unwrap(),
            JsValue::Number(1.0)
        );

        holder
            .synchronized_set(r2.id(), &JsValue::string("next"))
            .unwrap();
        assert_eq!(
            holder.synchronized_get(&r1).unwrap(),
            JsValue::string("next")
        );
        assert_eq!(
            holder.synchronized_get(&r2).unwrap(),
            JsValue::string("next")
        );
    }

    #[test]
    fn test_lazy_handle_initializes_once_per_runtime() {
        let liveness = registry();
        let r2 = TestRuntime::new(2);

        let initializer = Shareable::wrap(&liveness, RuntimeId(1), &worklet("init")).unwrap();
        let handle = Shareable::lazy(&liveness, RuntimeId(1), initializer).unwrap();

        assert_eq!(handle.materialize(&r2).unwrap(), JsValue::Number(42.0));
        assert_eq!(handle.materialize(&r2).unwrap(), JsValue::Number(42.0));
    }

    #[test]
    fn test_deep_graph_is_rejected() {
        let liveness = registry();
        let mut value = JsValue::Number(0.0);
        for _ in 0..(MAX_WRAP_DEPTH + 2) {
            value = JsValue::Array(vec![value]);
        }
        assert!(matches!(
            Shareable::wrap(&liveness, RuntimeId(1), &value),
            Err(ValueError::GraphTooDeep { .. })
        ));
    }

    #[test]
    fn test_symbol_wraps_as_string() {
        let liveness = registry();
        let r2 = TestRuntime::new(2);

        let shareable =
            Shareable::wrap(&liveness, RuntimeId(1), &JsValue::Symbol(Arc::from("sym"))).unwrap();
        assert_eq!(shareable.materialize(&r2).unwrap(), JsValue::string("sym"));
    }

    #[test]
    fn test_teardown_with_dead_secondary_runtime_does_not_crash() {
        let liveness = registry();
        let r2 = TestRuntime::new(2);

        let shareable = Shareable::wrap(&liveness, RuntimeId(1), &worklet("w")).unwrap();
        shareable.materialize(&r2).unwrap();

        liveness.unregister(r2.id());
        drop(shareable); // secondary release is skipped, not crashed on
    }
}
