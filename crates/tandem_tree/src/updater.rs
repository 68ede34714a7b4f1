//! Prop update entry point and commit pump
//!
//! `update_props` is the write path exposed to the UI runtime: paint-only
//! patches take the renderer's synchronous direct path, anything touching a
//! layout-relevant key is buffered in the registry and flushed by
//! `perform_operations` through a full commit transaction.

use crate::config::LayoutPropsTable;
use crate::hooks::{CommitMarker, CommitState};
use crate::node::{PropsMap, ShadowNode};
use crate::registry::PropsRegistry;
use crate::renderer::TreeRenderer;
use std::sync::Arc;

pub struct PropsUpdater {
    registry: Arc<PropsRegistry>,
    state: Arc<CommitState>,
    renderer: Arc<dyn TreeRenderer>,
    layout_props: Arc<LayoutPropsTable>,
}

impl PropsUpdater {
    pub fn new(
        registry: Arc<PropsRegistry>,
        state: Arc<CommitState>,
        renderer: Arc<dyn TreeRenderer>,
        layout_props: Arc<LayoutPropsTable>,
    ) -> Self {
        Self {
            registry,
            state,
            renderer,
            layout_props,
        }
    }

    pub fn registry(&self) -> &Arc<PropsRegistry> {
        &self.registry
    }

    /// Record a prop write against `node`. Patches without any
    /// layout-relevant key go straight to the renderer; the rest wait for
    /// the next `perform_operations` pass.
    pub fn update_props(&self, node: &ShadowNode, patch: &PropsMap) {
        if !self.layout_props.any_layout_prop(patch.keys()) {
            self.renderer.update_direct(node.id(), patch);
            return;
        }
        self.registry.update(node, patch);
    }

    /// The host reported `node` torn down; drop its buffered writes on the
    /// next flush.
    pub fn node_removed(&self, node: &ShadowNode) {
        self.registry.mark_removed(node.id());
    }

    /// Flush layout writes buffered since the last flush through a commit
    /// transaction; with no new writes this is a no-op (registry entries
    /// persist for the commit hook, but only fresh writes warrant a commit).
    /// Yields early when a previous subsystem commit has not mounted yet;
    /// the buffered entries are picked up by the commit hook on the host's
    /// next commit instead.
    pub fn perform_operations(&self) {
        self.registry.flush_removals();
        if !self.registry.take_dirty() || self.registry.is_empty() {
            return;
        }
        if !self.state.try_begin_commit() {
            // Re-arm so a later flush retries once the flag settles.
            self.registry.mark_dirty();
            tracing::trace!("skipping commit, previous one has not settled");
            return;
        }

        let snapshot = self.registry.snapshot();
        let _marker = CommitMarker::guard();
        self.renderer.commit(&mut |old_root| {
            let mut root = old_root.clone();
            for (id, entry) in &snapshot {
                match root.clone_with_new_props(*id, &entry.patch) {
                    Some(updated) => root = updated,
                    None => {
                        tracing::trace!(node = id.0, "node left the tree before flush");
                    }
                }
            }
            root
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{PropsCommitHook, PropsMountHook};
    use crate::renderer::InMemoryRenderer;
    use crate::NodeId;
    use serde_json::json;

    fn patch(pairs: &[(&str, serde_json::Value)]) -> PropsMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn tree() -> ShadowNode {
        ShadowNode::new(
            NodeId(1),
            PropsMap::new(),
            vec![
                ShadowNode::new(NodeId(2), PropsMap::new(), vec![]),
                ShadowNode::new(NodeId(3), PropsMap::new(), vec![]),
            ],
        )
    }

    struct Fixture {
        renderer: Arc<InMemoryRenderer>,
        state: Arc<CommitState>,
        updater: PropsUpdater,
    }

    fn fixture() -> Fixture {
        let renderer = Arc::new(InMemoryRenderer::new(tree()));
        let registry = Arc::new(PropsRegistry::new());
        let state = Arc::new(CommitState::new());
        renderer.register_commit_hook(Arc::new(PropsCommitHook::new(registry.clone())));
        renderer.register_mount_hook(Arc::new(PropsMountHook::new(state.clone())));
        let updater = PropsUpdater::new(
            registry,
            state.clone(),
            renderer.clone(),
            Arc::new(LayoutPropsTable::new()),
        );
        Fixture {
            renderer,
            state,
            updater,
        }
    }

    #[test]
    fn test_paint_only_patch_takes_direct_path() {
        let f = fixture();
        let node = f.renderer.find_node(NodeId(2)).unwrap();

        f.updater
            .update_props(&node, &patch(&[("opacity", json!(0.5))]));

        assert_eq!(f.renderer.direct_updates().len(), 1);
        assert!(f.updater.registry().is_empty());
        assert_eq!(
            f.renderer
                .find_node(NodeId(2))
                .unwrap()
                .props()
                .get("opacity"),
            Some(&json!(0.5))
        );
    }

    #[test]
    fn test_layout_patch_commits_and_sets_skip_flag() {
        let f = fixture();
        let node = f.renderer.find_node(NodeId(2)).unwrap();

        f.updater.update_props(
            &node,
            &patch(&[("width", json!(80)), ("opacity", json!(0.2))]),
        );
        assert!(f.renderer.direct_updates().is_empty());

        f.updater.perform_operations();
        let committed = f.renderer.find_node(NodeId(2)).unwrap();
        assert_eq!(committed.props().get("width"), Some(&json!(80)));
        assert_eq!(committed.props().get("opacity"), Some(&json!(0.2)));

        // The subsystem's own mount must not re-arm commits.
        assert!(f.state.is_skipping());
    }

    #[test]
    fn test_second_flush_yields_until_host_commit_mounts() {
        let f = fixture();
        let node = f.renderer.find_node(NodeId(2)).unwrap();

        f.updater
            .update_props(&node, &patch(&[("width", json!(10))]));
        f.updater.perform_operations();

        f.updater
            .update_props(&node, &patch(&[("width", json!(20))]));
        f.updater.perform_operations();
        // Second flush yielded; the tree still shows the first value.
        assert_eq!(
            f.renderer
                .find_node(NodeId(2))
                .unwrap()
                .props()
                .get("width"),
            Some(&json!(10))
        );

        // A host commit picks up the buffered value via the commit hook and
        // its mount clears the flag.
        f.renderer.host_commit(&mut |old| old.clone());
        assert_eq!(
            f.renderer
                .find_node(NodeId(2))
                .unwrap()
                .props()
                .get("width"),
            Some(&json!(20))
        );
        assert!(!f.state.is_skipping());

        f.updater
            .update_props(&node, &patch(&[("width", json!(30))]));
        f.updater.perform_operations();
        assert_eq!(
            f.renderer
                .find_node(NodeId(2))
                .unwrap()
                .props()
                .get("width"),
            Some(&json!(30))
        );
    }

    #[test]
    fn test_flush_without_new_writes_is_a_no_op() {
        let f = fixture();
        let node = f.renderer.find_node(NodeId(2)).unwrap();

        f.updater
            .update_props(&node, &patch(&[("width", json!(10))]));
        f.updater.perform_operations();
        f.renderer.host_commit(&mut |old| old.clone());
        assert!(!f.state.is_skipping());

        // The entry persists for the commit hook, but with nothing written
        // since the last flush there is no commit to make.
        f.updater.perform_operations();
        assert!(!f.state.is_skipping());
        assert_eq!(f.updater.registry().len(), 1);

        // A fresh write re-arms the flush.
        f.updater
            .update_props(&node, &patch(&[("width", json!(11))]));
        f.updater.perform_operations();
        assert!(f.state.is_skipping());
        assert_eq!(
            f.renderer
                .find_node(NodeId(2))
                .unwrap()
                .props()
                .get("width"),
            Some(&json!(11))
        );
    }

    #[test]
    fn test_host_rerender_keeps_buffered_values() {
        let f = fixture();
        let node = f.renderer.find_node(NodeId(3)).unwrap();

        f.updater
            .update_props(&node, &patch(&[("height", json!(55))]));
        f.updater.perform_operations();

        // Host re-renders from scratch with pristine props; the hook layers
        // the buffered patch back on.
        f.renderer.host_commit(&mut |_| tree());
        assert_eq!(
            f.renderer
                .find_node(NodeId(3))
                .unwrap()
                .props()
                .get("height"),
            Some(&json!(55))
        );
    }

    #[test]
    fn test_removed_node_drops_its_writes() {
        let f = fixture();
        let node = f.renderer.find_node(NodeId(3)).unwrap();

        f.updater
            .update_props(&node, &patch(&[("height", json!(55))]));
        f.updater.node_removed(&node);
        f.updater.perform_operations();

        assert!(f.updater.registry().is_empty());
        assert_eq!(
            f.renderer
                .find_node(NodeId(3))
                .unwrap()
                .props()
                .get("height"),
            None
        );
    }
}
