//! Layout-animation configuration registry
//!
//! Stores per-view animation configs as shareables so the UI runtime can
//! materialize them when the host reports a layout change. Actually running
//! the animations is the host's job; this registry only keeps the configs
//! and the process-wide enable flag.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tandem_core::Shareable;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutAnimationKind {
    Entering,
    Exiting,
    Layout,
}

pub struct LayoutAnimationRegistry {
    configs: DashMap<(u64, LayoutAnimationKind), Arc<Shareable>>,
    enabled: AtomicBool,
}

impl LayoutAnimationRegistry {
    pub fn new(enabled: bool) -> Self {
        Self {
            configs: DashMap::new(),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Store (or replace) the config for one view and animation kind.
    pub fn configure(&self, view_tag: u64, kind: LayoutAnimationKind, config: Arc<Shareable>) {
        self.configs.insert((view_tag, kind), config);
    }

    pub fn config_for(&self, view_tag: u64, kind: LayoutAnimationKind) -> Option<Arc<Shareable>> {
        self.configs.get(&(view_tag, kind)).map(|c| c.clone())
    }

    /// Drop every config for a view the host has unmounted.
    pub fn drop_for_view(&self, view_tag: u64) {
        self.configs.retain(|(tag, _), _| *tag != view_tag);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{JsValue, RuntimeId, RuntimeLivenessRegistry};

    fn config() -> Arc<Shareable> {
        let liveness = Arc::new(RuntimeLivenessRegistry::new());
        Shareable::wrap(&liveness, RuntimeId(1), &JsValue::string("spring")).unwrap()
    }

    #[test]
    fn test_configure_and_drop_per_view() {
        let registry = LayoutAnimationRegistry::new(false);
        registry.configure(7, LayoutAnimationKind::Entering, config());
        registry.configure(7, LayoutAnimationKind::Exiting, config());
        registry.configure(8, LayoutAnimationKind::Entering, config());

        assert!(registry.config_for(7, LayoutAnimationKind::Entering).is_some());
        assert!(registry.config_for(7, LayoutAnimationKind::Layout).is_none());

        registry.drop_for_view(7);
        assert!(registry.config_for(7, LayoutAnimationKind::Entering).is_none());
        assert!(registry.config_for(8, LayoutAnimationKind::Entering).is_some());
    }

    #[test]
    fn test_enable_flag() {
        let registry = LayoutAnimationRegistry::new(false);
        assert!(!registry.is_enabled());
        registry.set_enabled(true);
        assert!(registry.is_enabled());
    }
}
