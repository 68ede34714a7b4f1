//! Process-wide registry of currently-alive execution contexts
//!
//! Consulted as a destructor-time guard: before releasing a cached
//! materialization that belongs to a runtime other than the one executing
//! the release, callers check `is_alive`. If the owning runtime is already
//! gone the release is skipped, a documented bounded leak, because touching
//! memory owned by a torn-down runtime is undefined.

use crate::RuntimeId;
use parking_lot::Mutex;
use std::collections::HashSet;

pub struct RuntimeLivenessRegistry {
    alive: Mutex<HashSet<RuntimeId>>,
}

impl RuntimeLivenessRegistry {
    pub fn new() -> Self {
        Self {
            alive: Mutex::new(HashSet::new()),
        }
    }

    pub fn register(&self, runtime: RuntimeId) {
        self.alive.lock().insert(runtime);
    }

    pub fn unregister(&self, runtime: RuntimeId) {
        self.alive.lock().remove(&runtime);
    }

    pub fn is_alive(&self, runtime: RuntimeId) -> bool {
        self.alive.lock().contains(&runtime)
    }
}

impl Default for RuntimeLivenessRegistry {
    fn default() -> Self {
        Self::new()
    }
}
