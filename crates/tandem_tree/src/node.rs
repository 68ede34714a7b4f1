//! Immutable shadow-tree model
//!
//! Nodes are persistent: mutation clones the touched node and its ancestor
//! chain, sharing every untouched subtree with the previous version. This is
//! the minimal shape the commit hook needs from the host tree; real hosts
//! adapt their own node type behind `TreeRenderer`.

use crate::NodeId;
use std::sync::Arc;

pub type PropsMap = serde_json::Map<String, serde_json::Value>;

/// Merge `patch` into `into`; the later write wins per key.
pub fn merge_patch(into: &mut PropsMap, patch: &PropsMap) {
    for (key, value) in patch {
        into.insert(key.clone(), value.clone());
    }
}

#[derive(Debug, Clone)]
pub struct ShadowNode {
    inner: Arc<NodeInner>,
}

#[derive(Debug)]
struct NodeInner {
    id: NodeId,
    props: PropsMap,
    children: Vec<ShadowNode>,
}

impl ShadowNode {
    pub fn new(id: NodeId, props: PropsMap, children: Vec<ShadowNode>) -> Self {
        Self {
            inner: Arc::new(NodeInner {
                id,
                props,
                children,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn props(&self) -> &PropsMap {
        &self.inner.props
    }

    pub fn children(&self) -> &[ShadowNode] {
        &self.inner.children
    }

    /// Clone this node with `patch` merged over its props.
    pub fn with_merged_props(&self, patch: &PropsMap) -> ShadowNode {
        let mut props = self.inner.props.clone();
        merge_patch(&mut props, patch);
        ShadowNode::new(self.inner.id, props, self.inner.children.clone())
    }

    pub fn find(&self, id: NodeId) -> Option<&ShadowNode> {
        if self.inner.id == id {
            return Some(self);
        }
        self.inner.children.iter().find_map(|child| child.find(id))
    }

    /// Rebuild this tree with `patch` applied to `target`, cloning only the
    /// ancestor chain. Returns None when the target is no longer in the
    /// tree (the host removed it).
    pub fn clone_with_new_props(&self, target: NodeId, patch: &PropsMap) -> Option<ShadowNode> {
        if self.inner.id == target {
            return Some(self.with_merged_props(patch));
        }
        for (index, child) in self.inner.children.iter().enumerate() {
            if let Some(new_child) = child.clone_with_new_props(target, patch) {
                let mut children = self.inner.children.clone();
                children[index] = new_child;
                return Some(ShadowNode::new(
                    self.inner.id,
                    self.inner.props.clone(),
                    children,
                ));
            }
        }
        None
    }

    /// Pointer identity; true when two values are the same tree version.
    pub fn same_version(&self, other: &ShadowNode) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
