//! Runtime decorations
//!
//! Every execution context (the UI runtime and any created worklet runtime)
//! gets the same primitive decorations: a log function, scheduling back to
//! the main runtime, shareable construction, and synchronized-data-holder
//! access. Decorations are installed as host functions under the runtime's
//! globals.

use crate::runtime::WorkletRuntime;
use std::sync::{Arc, Weak};
use tandem_core::{JsValue, NativeFunction, RuntimeLivenessRegistry, Shareable, ValueError};
use tandem_sched::DualScheduler;

fn expect_handle(value: Option<&JsValue>) -> Result<Arc<Shareable>, ValueError> {
    match value {
        Some(JsValue::Handle(handle)) => Ok(handle.clone()),
        Some(other) => Err(ValueError::IncompatibleHandleType {
            expected: "handle",
            actual: other.kind_name(),
        }),
        None => Err(ValueError::IncompatibleHandleType {
            expected: "handle",
            actual: "undefined",
        }),
    }
}

fn upgrade(runtime: &Weak<WorkletRuntime>) -> Result<Arc<WorkletRuntime>, ValueError> {
    runtime
        .upgrade()
        .ok_or_else(|| ValueError::execution("runtime has been torn down"))
}

/// Install the primitive decorations on `runtime`.
pub fn decorate_runtime(
    runtime: &Arc<WorkletRuntime>,
    scheduler: &DualScheduler,
    main_runtime: &Arc<WorkletRuntime>,
    liveness: &Arc<RuntimeLivenessRegistry>,
) {
    let runtime_name = runtime.name().to_string();
    runtime.set_global(
        "_log",
        JsValue::Function(tandem_core::JsFunction::host(
            runtime.id(),
            NativeFunction::new("_log", move |args| {
                for arg in args {
                    match arg.to_json() {
                        Ok(json) => tracing::info!(runtime = %runtime_name, "{json}"),
                        Err(_) => tracing::info!(runtime = %runtime_name, "{}", arg.kind_name()),
                    }
                }
                Ok(JsValue::Undefined)
            }),
        )),
    );

    {
        let scheduler = scheduler.clone();
        let main_runtime = Arc::downgrade(main_runtime);
        runtime.set_global(
            "_scheduleOnMain",
            JsValue::Function(tandem_core::JsFunction::host(
                runtime.id(),
                NativeFunction::new("_scheduleOnMain", move |args| {
                    let function = expect_handle(args.first())?;
                    function.expect_remote_function()?;
                    let shared_args = match args.get(1) {
                        None | Some(JsValue::Undefined) => None,
                        other => Some(expect_handle(other)?),
                    };
                    let main_runtime = main_runtime.clone();
                    scheduler.schedule_on_main(Box::new(move || {
                        if let Some(main_runtime) = main_runtime.upgrade() {
                            match shared_args {
                                // fast path for a remote function without arguments
                                None => main_runtime.run_guarded(&function, &[]),
                                Some(ref shared) => {
                                    main_runtime.run_guarded_shared(&function, Some(shared))
                                }
                            }
                        }
                    }));
                    Ok(JsValue::Undefined)
                }),
            )),
        );
    }

    {
        let liveness = liveness.clone();
        let origin = runtime.id();
        runtime.set_global(
            "_makeShareable",
            JsValue::Function(tandem_core::JsFunction::host(
                runtime.id(),
                NativeFunction::new("_makeShareable", move |args| {
                    let value = args.first().cloned().unwrap_or(JsValue::Undefined);
                    Ok(JsValue::Handle(Shareable::wrap(&liveness, origin, &value)?))
                }),
            )),
        );
    }

    {
        let this = Arc::downgrade(runtime);
        runtime.set_global(
            "_getDataSynchronously",
            JsValue::Function(tandem_core::JsFunction::host(
                runtime.id(),
                NativeFunction::new("_getDataSynchronously", move |args| {
                    let holder = expect_handle(args.first())?;
                    let runtime = upgrade(&this)?;
                    holder.synchronized_get(&*runtime)
                }),
            )),
        );
    }

    {
        let writer = runtime.id();
        runtime.set_global(
            "_updateDataSynchronously",
            JsValue::Function(tandem_core::JsFunction::host(
                runtime.id(),
                NativeFunction::new("_updateDataSynchronously", move |args| {
                    let holder = expect_handle(args.first())?;
                    let value = args.get(1).cloned().unwrap_or(JsValue::Undefined);
                    holder.synchronized_set(writer, &value)?;
                    Ok(JsValue::Undefined)
                }),
            )),
        );
    }
}
