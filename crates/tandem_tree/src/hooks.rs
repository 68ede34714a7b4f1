//! Commit/mount hooks and the commit-skip state machine
//!
//! The skip flag serializes subsystem-initiated commits: set when the props
//! updater performs its own direct commit, cleared only when a commit that
//! did NOT originate from that path finishes mounting. The marker is
//! thread-confined: the updater's commit runs synchronously on the calling
//! thread, so the hooks can tell the two origins apart without any shared
//! state.

use crate::node::ShadowNode;
use crate::registry::PropsRegistry;
use crate::renderer::{CommitHook, MountHook};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

thread_local! {
    static UI_COMMIT_IN_FLIGHT: Cell<bool> = const { Cell::new(false) };
}

/// Thread-confined marker identifying commits initiated by the props
/// updater, for the duration of the commit call.
pub struct CommitMarker {
    _private: (),
}

impl CommitMarker {
    pub fn guard() -> CommitMarker {
        UI_COMMIT_IN_FLIGHT.with(|flag| flag.set(true));
        CommitMarker { _private: () }
    }

    pub fn is_set() -> bool {
        UI_COMMIT_IN_FLIGHT.with(|flag| flag.get())
    }
}

impl Drop for CommitMarker {
    fn drop(&mut self) {
        UI_COMMIT_IN_FLIGHT.with(|flag| flag.set(false));
    }
}

/// The commit-skip flag; one per host-tree instance.
pub struct CommitState {
    skip: AtomicBool,
}

impl CommitState {
    pub fn new() -> Self {
        Self {
            skip: AtomicBool::new(false),
        }
    }

    /// Assert precedence for a subsystem commit. Returns whether the flag
    /// was already set, in which case the caller must yield.
    pub fn try_begin_commit(&self) -> bool {
        !self.skip.swap(true, Ordering::AcqRel)
    }

    pub fn is_skipping(&self) -> bool {
        self.skip.load(Ordering::Acquire)
    }

    pub fn settle(&self) {
        self.skip.store(false, Ordering::Release);
    }
}

impl Default for CommitState {
    fn default() -> Self {
        Self::new()
    }
}

/// Re-applies every buffered patch on top of the host's proposed tree, so a
/// host re-render cannot clobber UI-thread-driven values. Subsystem-initiated
/// commits pass through unchanged (the transaction already applied the
/// registry).
pub struct PropsCommitHook {
    registry: Arc<PropsRegistry>,
}

impl PropsCommitHook {
    pub fn new(registry: Arc<PropsRegistry>) -> Self {
        Self { registry }
    }
}

impl CommitHook for PropsCommitHook {
    fn shadow_tree_will_commit(&self, _old_root: &ShadowNode, new_root: ShadowNode) -> ShadowNode {
        if CommitMarker::is_set() {
            return new_root;
        }
        let mut root = new_root;
        // Snapshot first; the clone walk must not run under any registry lock.
        for (id, entry) in self.registry.snapshot() {
            match root.clone_with_new_props(id, &entry.patch) {
                Some(updated) => root = updated,
                // The host removed this node; animating a removed node is a
                // no-op, not an error.
                None => {
                    tracing::trace!(node = id.0, "skipping patch for a removed node");
                }
            }
        }
        root
    }
}

/// Clears the skip flag once a host-originated commit has mounted, re-arming
/// subsystem commits.
pub struct PropsMountHook {
    state: Arc<CommitState>,
}

impl PropsMountHook {
    pub fn new(state: Arc<CommitState>) -> Self {
        Self { state }
    }
}

impl MountHook for PropsMountHook {
    fn shadow_tree_did_mount(&self, _root: &ShadowNode, _timestamp: f64) {
        if !CommitMarker::is_set() {
            self.state.settle();
        }
    }
}
