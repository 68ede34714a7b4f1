//! Host-tree cooperation layer
//!
//! A deferred-write buffer for UI-thread-originated prop mutations plus the
//! hand-shake protocol with the host tree's own commit cycle: buffered
//! patches are either committed directly by this subsystem (at most one such
//! commit in flight) or re-applied on top of the host's next commit through
//! the commit hook, so host re-renders never clobber animated props.

mod config;
mod hooks;
mod node;
mod registry;
mod renderer;
mod updater;

pub use config::LayoutPropsTable;
pub use hooks::{CommitMarker, CommitState, PropsCommitHook, PropsMountHook};
pub use node::{merge_patch, PropsMap, ShadowNode};
pub use registry::{PropsEntry, PropsRegistry};
pub use renderer::{CommitHook, InMemoryRenderer, MountHook, TreeRenderer};
pub use updater::PropsUpdater;

/// Identity of one host-tree node.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(pub u64);
