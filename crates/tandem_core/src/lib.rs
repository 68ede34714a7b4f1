//! Tandem core value model
//!
//! Defines the shareable value wrapper that lets a JS value cross the
//! boundary between two cooperating runtimes, the per-handle materialization
//! cache, the synchronized data holder, and the process-wide runtime
//! liveness registry consulted before touching cross-runtime references.

mod error;
mod liveness;
mod shareable;
mod sync_holder;
mod value;

pub use error::ValueError;
pub use liveness::RuntimeLivenessRegistry;
pub use shareable::{Shareable, ShareableKind, MAX_WRAP_DEPTH};
pub use sync_holder::SynchronizedDataHolder;
pub use value::{
    FunctionRepr, HostObject, JsFunction, JsValue, NativeFn, NativeFunction, WorkletSource,
};

/// Identity of one isolated JS execution context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeId(pub u64);

impl std::fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "runtime#{}", self.0)
    }
}

/// The per-runtime services materialization needs: an identity, and the
/// unpacking transform that rebuilds a worklet closure as a live callable.
///
/// Implemented by the worklet runtime type; kept as a trait here so the value
/// model does not depend on any particular JS engine.
pub trait RuntimeContext: Send + Sync {
    fn id(&self) -> RuntimeId;

    /// Rebuild `source` as a callable in this runtime, with `captures`
    /// (an object mapping capture names to already-materialized values)
    /// restored as live bindings.
    fn unpack(&self, source: &WorkletSource, captures: JsValue) -> Result<JsValue, ValueError>;
}
