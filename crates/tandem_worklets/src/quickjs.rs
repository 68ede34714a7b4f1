//! QuickJS-backed engine
//!
//! One isolated QuickJS runtime plus context per worklet runtime. Values
//! travel in and out as JSON text; functions never cross this boundary
//! directly (the shareable layer handles those).

use crate::engine::{EngineError, WorkletEngine};
use rquickjs::{Context, Runtime};

pub struct QuickJsEngine {
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
    context: Context,
}

impl QuickJsEngine {
    pub fn new() -> Result<Self, EngineError> {
        let runtime = Runtime::new().map_err(|e| EngineError::Construct(e.to_string()))?;
        let context =
            Context::full(&runtime).map_err(|e| EngineError::Construct(e.to_string()))?;
        Ok(Self { runtime, context })
    }

    fn describe_error(ctx: &rquickjs::Ctx<'_>, error: rquickjs::Error) -> EngineError {
        if matches!(error, rquickjs::Error::Exception) {
            EngineError::Eval(format!("{:?}", ctx.catch()))
        } else {
            EngineError::Eval(error.to_string())
        }
    }
}

impl WorkletEngine for QuickJsEngine {
    fn eval(&self, source: &str) -> Result<(), EngineError> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(source)
                .map_err(|e| Self::describe_error(&ctx, e))
        })
    }

    fn eval_json(&self, expression: &str) -> Result<serde_json::Value, EngineError> {
        // `?? "null"` keeps expressions evaluating to undefined from failing
        // the string conversion.
        let wrapped = format!("JSON.stringify(({expression})) ?? \"null\"");
        let text = self.context.with(|ctx| {
            ctx.eval::<String, _>(wrapped)
                .map_err(|e| Self::describe_error(&ctx, e))
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}
