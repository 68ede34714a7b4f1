//! Worklet runtime management
//!
//! Creation, decoration and naming of isolated execution contexts beyond the
//! fixed UI runtime, the engine seam that keeps the actual JS engine an
//! external collaborator, and guarded invocation so one failing worklet
//! never unwinds into a thread's run loop.

mod decorators;
mod engine;
mod manager;
mod quickjs;
mod runtime;

pub use decorators::decorate_runtime;
pub use engine::{EngineError, WorkletEngine};
pub use manager::{EngineFactory, RuntimeManager};
pub use quickjs::QuickJsEngine;
pub use runtime::{Unpacker, WorkletRuntime};
