//! Deferred-write buffer for UI-thread prop mutations

use crate::node::{merge_patch, PropsMap, ShadowNode};
use crate::NodeId;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone)]
pub struct PropsEntry {
    /// Latest node reference seen for this id.
    pub node: ShadowNode,
    /// Union of all writes since the entry was created; later writes win
    /// per key.
    pub patch: PropsMap,
}

/// Buffered prop writes per host-tree node. Entries persist across commits
/// (so host re-renders keep animated values) and are removed only when the
/// host reports the node torn down.
pub struct PropsRegistry {
    entries: DashMap<NodeId, PropsEntry>,
    pending_removals: Mutex<Vec<NodeId>>,
    /// Writes since the last flush. Entries outlive a flush so the commit
    /// hook can keep re-applying them; this flag is what a flush consumes.
    dirty: AtomicBool,
}

impl PropsRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            pending_removals: Mutex::new(Vec::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Create or merge the entry for `node`.
    pub fn update(&self, node: &ShadowNode, patch: &PropsMap) {
        self.entries
            .entry(node.id())
            .and_modify(|entry| {
                entry.node = node.clone();
                merge_patch(&mut entry.patch, patch);
            })
            .or_insert_with(|| PropsEntry {
                node: node.clone(),
                patch: patch.clone(),
            });
        self.dirty.store(true, Ordering::Release);
    }

    /// Consume the writes-since-last-flush flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    /// Re-arm the flag, for a flush that had to yield before committing.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn get(&self, id: NodeId) -> Option<PropsEntry> {
        self.entries.get(&id).map(|entry| entry.clone())
    }

    /// Copy out all entries; iteration never holds a shard lock across the
    /// caller's work.
    pub fn snapshot(&self) -> Vec<(NodeId, PropsEntry)> {
        self.entries
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Queue removal of a node the host reported torn down; applied on the
    /// next flush.
    pub fn mark_removed(&self, id: NodeId) {
        self.pending_removals.lock().push(id);
    }

    pub fn flush_removals(&self) {
        let removals: Vec<NodeId> = std::mem::take(&mut *self.pending_removals.lock());
        for id in removals {
            self.entries.remove(&id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for PropsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: u64) -> ShadowNode {
        ShadowNode::new(NodeId(id), PropsMap::new(), vec![])
    }

    fn patch(pairs: &[(&str, serde_json::Value)]) -> PropsMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_writes_merge_with_later_value_winning() {
        let registry = PropsRegistry::new();
        let n = node(10);

        registry.update(&n, &patch(&[("opacity", json!(0.5))]));
        registry.update(&n, &patch(&[("transform", json!(["scale"]))]));
        registry.update(&n, &patch(&[("opacity", json!(0.9))]));

        let entry = registry.get(NodeId(10)).unwrap();
        assert_eq!(entry.patch.len(), 2);
        assert_eq!(entry.patch.get("opacity"), Some(&json!(0.9)));
        assert_eq!(entry.patch.get("transform"), Some(&json!(["scale"])));
    }

    #[test]
    fn test_removal_is_deferred_until_flush() {
        let registry = PropsRegistry::new();
        registry.update(&node(1), &patch(&[("width", json!(5))]));

        registry.mark_removed(NodeId(1));
        assert_eq!(registry.len(), 1);

        registry.flush_removals();
        assert!(registry.is_empty());
    }
}
