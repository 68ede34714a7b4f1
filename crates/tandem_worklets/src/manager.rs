//! Runtime creation and liveness bookkeeping

use crate::engine::{EngineError, WorkletEngine};
use crate::runtime::WorkletRuntime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tandem_core::{RuntimeId, RuntimeLivenessRegistry};
use tandem_sched::ThreadLane;

pub type EngineFactory = Arc<dyn Fn() -> Result<Arc<dyn WorkletEngine>, EngineError> + Send + Sync>;

/// Builds isolated execution contexts, assigns them process-unique ids, and
/// records them in the liveness registry. Ids are monotonically increasing
/// and never reused while the process lives.
pub struct RuntimeManager {
    liveness: Arc<RuntimeLivenessRegistry>,
    engine_factory: EngineFactory,
    next_id: AtomicU64,
}

impl RuntimeManager {
    pub fn new(liveness: Arc<RuntimeLivenessRegistry>, engine_factory: EngineFactory) -> Self {
        Self {
            liveness,
            engine_factory,
            next_id: AtomicU64::new(1),
        }
    }

    /// Build a new, independent execution context pinned to `lane`.
    ///
    /// Callers must drain scheduled jobs and unregister event handlers that
    /// reference the runtime before dropping the returned handle; stale
    /// shareables are tolerated (liveness-guarded) but leak.
    pub fn create(&self, name: &str, lane: ThreadLane) -> Result<Arc<WorkletRuntime>, EngineError> {
        let id = RuntimeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let engine = (self.engine_factory)()?;
        let runtime = Arc::new(WorkletRuntime::new(id, name, lane, engine, self.liveness.clone()));
        self.liveness.register(id);
        tracing::info!(%id, name, ?lane, "created worklet runtime");
        Ok(runtime)
    }

    pub fn liveness(&self) -> &Arc<RuntimeLivenessRegistry> {
        &self.liveness
    }
}
