//! Host tree renderer seam
//!
//! The host renderer owns diff/commit/mount; this subsystem only needs a
//! commit transaction entry point, a synchronous direct-update path for
//! paint-only props, and the two hook registration points. `InMemoryRenderer`
//! is the in-process implementation used by the demo binary and tests.

use crate::hooks::CommitMarker;
use crate::node::{PropsMap, ShadowNode};
use crate::NodeId;
use parking_lot::Mutex;
use std::sync::Arc;

/// Intercepts the host's commit with the proposed new tree; returns the tree
/// to commit instead. Runs synchronously inside the host's commit call and
/// must not block or schedule further work.
pub trait CommitHook: Send + Sync {
    fn shadow_tree_will_commit(&self, old_root: &ShadowNode, new_root: ShadowNode) -> ShadowNode;
}

/// Observes that a committed tree finished mounting.
pub trait MountHook: Send + Sync {
    fn shadow_tree_did_mount(&self, root: &ShadowNode, timestamp: f64);
}

pub trait TreeRenderer: Send + Sync {
    /// Run a commit transaction against the current root. The transaction
    /// receives the old root and returns the proposed new one; installed
    /// hooks run as part of the commit.
    fn commit(&self, transaction: &mut dyn FnMut(&ShadowNode) -> ShadowNode);

    /// Apply paint-only props to the live node synchronously, bypassing the
    /// commit cycle entirely.
    fn update_direct(&self, node: NodeId, patch: &PropsMap);

    fn register_commit_hook(&self, hook: Arc<dyn CommitHook>);
    fn unregister_commit_hook(&self);
    fn register_mount_hook(&self, hook: Arc<dyn MountHook>);
    fn unregister_mount_hook(&self);

    /// Find the current version of a node by id.
    fn find_node(&self, id: NodeId) -> Option<ShadowNode>;
}

/// A complete single-surface renderer holding one root tree in memory.
pub struct InMemoryRenderer {
    root: Mutex<ShadowNode>,
    commit_hook: Mutex<Option<Arc<dyn CommitHook>>>,
    mount_hook: Mutex<Option<Arc<dyn MountHook>>>,
    direct_updates: Mutex<Vec<(NodeId, PropsMap)>>,
    clock: Mutex<f64>,
}

impl InMemoryRenderer {
    pub fn new(root: ShadowNode) -> Self {
        Self {
            root: Mutex::new(root),
            commit_hook: Mutex::new(None),
            mount_hook: Mutex::new(None),
            direct_updates: Mutex::new(Vec::new()),
            clock: Mutex::new(0.0),
        }
    }

    pub fn root(&self) -> ShadowNode {
        self.root.lock().clone()
    }

    /// A commit originating from the host itself (e.g. a re-render), i.e.
    /// not driven by the props updater. Identical commit path; the only
    /// difference is that no UI-commit marker is set on this thread.
    pub fn host_commit(&self, transaction: &mut dyn FnMut(&ShadowNode) -> ShadowNode) {
        debug_assert!(!CommitMarker::is_set());
        self.commit(transaction);
    }

    /// Direct updates applied so far, for assertions.
    pub fn direct_updates(&self) -> Vec<(NodeId, PropsMap)> {
        self.direct_updates.lock().clone()
    }
}

impl TreeRenderer for InMemoryRenderer {
    fn commit(&self, transaction: &mut dyn FnMut(&ShadowNode) -> ShadowNode) {
        let mounted = {
            let mut root = self.root.lock();
            let proposed = transaction(&root);
            let hook = self.commit_hook.lock().clone();
            let committed = match hook {
                Some(hook) => hook.shadow_tree_will_commit(&root, proposed),
                None => proposed,
            };
            *root = committed.clone();
            committed
        };

        let timestamp = {
            let mut clock = self.clock.lock();
            *clock += 1.0;
            *clock
        };
        let hook = self.mount_hook.lock().clone();
        if let Some(hook) = hook {
            hook.shadow_tree_did_mount(&mounted, timestamp);
        }
    }

    fn update_direct(&self, node: NodeId, patch: &PropsMap) {
        self.direct_updates.lock().push((node, patch.clone()));
        let mut root = self.root.lock();
        // Paint-only updates still need to land somewhere visible; apply
        // in place without a mount cycle.
        if let Some(new_root) = root.clone_with_new_props(node, patch) {
            *root = new_root;
        }
    }

    fn register_commit_hook(&self, hook: Arc<dyn CommitHook>) {
        *self.commit_hook.lock() = Some(hook);
    }

    fn unregister_commit_hook(&self) {
        *self.commit_hook.lock() = None;
    }

    fn register_mount_hook(&self, hook: Arc<dyn MountHook>) {
        *self.mount_hook.lock() = Some(hook);
    }

    fn unregister_mount_hook(&self) {
        *self.mount_hook.lock() = None;
    }

    fn find_node(&self, id: NodeId) -> Option<ShadowNode> {
        self.root.lock().find(id).cloned()
    }
}
