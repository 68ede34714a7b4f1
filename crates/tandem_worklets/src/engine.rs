//! Engine seam
//!
//! The core only needs two things from a JS engine: evaluate source text,
//! and evaluate an expression whose result travels back as JSON. Everything
//! else (worklet instantiation, the value unpacker) is built on top of these
//! in `WorkletRuntime`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to construct engine: {0}")]
    Construct(String),

    #[error("evaluation failed: {0}")]
    Eval(String),

    #[error("engine returned invalid JSON: {0}")]
    BadResult(#[from] serde_json::Error),
}

pub trait WorkletEngine: Send + Sync {
    /// Evaluate `source` for its side effects.
    fn eval(&self, source: &str) -> Result<(), EngineError>;

    /// Evaluate `expression` and return its value as JSON data.
    fn eval_json(&self, expression: &str) -> Result<serde_json::Value, EngineError>;
}
