//! One isolated execution context
//!
//! A `WorkletRuntime` is pinned to one of the two cooperating threads' run
//! loops and driven from there. It owns its engine, the installed value
//! unpacker that rebuilds worklet closures as live callables, and a set of
//! installed global decorations. All invocation goes through `run_guarded`:
//! exceptions are funneled to an error channel, never propagated into the
//! run loop.

use crate::engine::{EngineError, WorkletEngine};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::{
    JsFunction, JsValue, NativeFn, NativeFunction, RuntimeContext, RuntimeId,
    RuntimeLivenessRegistry, Shareable, ShareableKind, ValueError, WorkletSource,
};
use tandem_sched::ThreadLane;

/// The unpacking transform: rebuilds a worklet's compiled source, with its
/// materialized captures, as a callable bound to this runtime.
pub type Unpacker = Arc<dyn Fn(&WorkletSource, JsValue) -> Result<JsValue, ValueError> + Send + Sync>;

type ErrorHandler = Arc<dyn Fn(&ValueError) + Send + Sync>;

pub struct WorkletRuntime {
    id: RuntimeId,
    name: String,
    lane: ThreadLane,
    engine: Arc<dyn WorkletEngine>,
    unpacker: Mutex<Option<Unpacker>>,
    globals: Mutex<BTreeMap<String, JsValue>>,
    error_handler: Mutex<Option<ErrorHandler>>,
    liveness: Arc<RuntimeLivenessRegistry>,
}

impl WorkletRuntime {
    /// Usually constructed through `RuntimeManager::create`, which also
    /// registers the runtime's liveness.
    pub fn new(
        id: RuntimeId,
        name: &str,
        lane: ThreadLane,
        engine: Arc<dyn WorkletEngine>,
        liveness: Arc<RuntimeLivenessRegistry>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            lane,
            engine,
            unpacker: Mutex::new(None),
            globals: Mutex::new(BTreeMap::new()),
            error_handler: Mutex::new(None),
            liveness,
        }
    }

    pub fn id(&self) -> RuntimeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lane(&self) -> ThreadLane {
        self.lane
    }

    pub fn engine(&self) -> &Arc<dyn WorkletEngine> {
        &self.engine
    }

    /// Evaluate source text in this runtime's engine.
    pub fn eval(&self, source: &str) -> Result<(), EngineError> {
        self.engine.eval(source)
    }

    /// Install a native unpacking transform.
    pub fn install_unpacker(&self, unpacker: Unpacker) {
        let mut slot = self.unpacker.lock();
        if slot.is_some() {
            tracing::debug!(runtime = %self.name, "replacing installed value unpacker");
        }
        *slot = Some(unpacker);
    }

    /// Compile and install the unpacking transform from source. The source
    /// must define `globalThis.__valueUnpacker(code, captures)` returning a
    /// callable; worklet instances are kept in an engine-side table and
    /// invoked with JSON-converted arguments.
    pub fn install_unpacker_source(self: &Arc<Self>, source: &str) -> Result<(), EngineError> {
        self.engine.eval(source)?;

        let engine = self.engine.clone();
        let runtime_id = self.id;
        let instances = Arc::new(AtomicU64::new(0));
        let unpacker: Unpacker = Arc::new(move |worklet, captures| {
            let instance = instances.fetch_add(1, Ordering::Relaxed);
            let code_literal = serde_json::Value::String(worklet.code.to_string()).to_string();
            let captures_json = captures.to_json()?;
            engine
                .eval(&format!(
                    "globalThis.__worklets = globalThis.__worklets || {{}};\n\
                     globalThis.__worklets[{instance}] = \
                     globalThis.__valueUnpacker({code_literal}, {captures_json});"
                ))
                .map_err(|e| ValueError::execution(e.to_string()))?;

            let engine = engine.clone();
            let body: NativeFn = Arc::new(move |args| {
                let mut rendered = Vec::with_capacity(args.len());
                for arg in args {
                    rendered.push(arg.to_json()?.to_string());
                }
                let result = engine
                    .eval_json(&format!(
                        "globalThis.__worklets[{instance}]({})",
                        rendered.join(",")
                    ))
                    .map_err(|e| ValueError::execution(e.to_string()))?;
                Ok(JsValue::from_json(&result))
            });
            Ok(JsValue::Function(JsFunction::host(
                runtime_id,
                NativeFunction {
                    name: worklet.name.clone(),
                    body,
                },
            )))
        });
        self.install_unpacker(unpacker);
        Ok(())
    }

    /// Install a named decoration (a primitive exposed to worklet code).
    pub fn set_global(&self, name: &str, value: JsValue) {
        self.globals.lock().insert(name.to_string(), value);
    }

    pub fn global(&self, name: &str) -> Option<JsValue> {
        self.globals.lock().get(name).cloned()
    }

    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&ValueError) + Send + Sync + 'static,
    {
        *self.error_handler.lock() = Some(Arc::new(handler));
    }

    /// Materialize `handle` into this runtime and invoke it. Any error is
    /// funneled to the error channel and logged; nothing propagates to the
    /// caller, so one failing job cannot crash the thread's run loop.
    pub fn run_guarded(self: &Arc<Self>, handle: &Arc<Shareable>, args: &[JsValue]) {
        if let Err(error) = self.try_run(handle, args) {
            tracing::error!(runtime = %self.name, %error, "uncaught error in worklet");
            let handler = self.error_handler.lock().clone();
            if let Some(handler) = handler {
                handler(&error);
            }
        }
    }

    /// Like `run_guarded`, with arguments that crossed the boundary as a
    /// shared array.
    pub fn run_guarded_shared(self: &Arc<Self>, handle: &Arc<Shareable>, args: Option<&Arc<Shareable>>) {
        let args = match args {
            None => Vec::new(),
            Some(shared) => match shared.materialize(&**self) {
                Ok(JsValue::Array(items)) => items,
                Ok(other) => vec![other],
                Err(error) => {
                    tracing::error!(runtime = %self.name, %error, "failed to materialize arguments");
                    return;
                }
            },
        };
        self.run_guarded(handle, &args);
    }

    fn try_run(self: &Arc<Self>, handle: &Arc<Shareable>, args: &[JsValue]) -> Result<JsValue, ValueError> {
        let callable = handle.materialize(&**self)?;
        callable.as_function()?.call(args)
    }

    /// Whether `handle` can run here at all (worklet, host function, or a
    /// remote function whose home is this runtime).
    pub fn can_run(&self, handle: &Shareable) -> bool {
        match handle.kind() {
            ShareableKind::Worklet { .. } | ShareableKind::HostFunction(_) => true,
            ShareableKind::RemoteFunction { home, .. } => *home == self.id,
            _ => false,
        }
    }
}

impl RuntimeContext for WorkletRuntime {
    fn id(&self) -> RuntimeId {
        self.id
    }

    fn unpack(&self, source: &WorkletSource, captures: JsValue) -> Result<JsValue, ValueError> {
        // Clone out of the slot so no lock is held across the transform.
        let unpacker = self.unpacker.lock().clone();
        match unpacker {
            Some(unpacker) => unpacker(source, captures),
            None => Err(ValueError::UnpackerMissing {
                runtime: self.name.clone(),
            }),
        }
    }
}

impl Drop for WorkletRuntime {
    fn drop(&mut self) {
        // Outstanding shareables holding materializations for this runtime
        // consult the liveness registry before releasing them.
        self.liveness.unregister(self.id);
        tracing::debug!(runtime = %self.name, "worklet runtime destroyed");
    }
}

impl std::fmt::Debug for WorkletRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkletRuntime")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("lane", &self.lane)
            .finish()
    }
}
