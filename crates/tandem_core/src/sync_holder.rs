//! Synchronized data holder
//!
//! The one mutable spot in the value model. A holder owns the current
//! shareable snapshot behind a mutex; `set` swaps the whole snapshot, which
//! discards the previous handle's cached materializations, so the next read
//! from either runtime re-derives a consistent value. Readers never observe
//! a partial write and neither runtime ever blocks on the other.

use crate::{JsValue, RuntimeContext, Shareable, ValueError};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
pub struct SynchronizedDataHolder {
    data: Mutex<Arc<Shareable>>,
}

impl SynchronizedDataHolder {
    pub fn new(initial: Arc<Shareable>) -> Self {
        Self {
            data: Mutex::new(initial),
        }
    }

    /// Latest fully-set value, materialized for `ctx`. The lock guards only
    /// the snapshot read; materialization runs after it is released.
    pub fn get(&self, ctx: &dyn RuntimeContext) -> Result<JsValue, ValueError> {
        let snapshot = self.data.lock().clone();
        snapshot.materialize(ctx)
    }

    pub fn set(&self, replacement: Arc<Shareable>) {
        *self.data.lock() = replacement;
    }
}
