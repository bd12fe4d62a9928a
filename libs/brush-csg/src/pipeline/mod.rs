//! # Update Pipeline
//!
//! Per-tree incremental update passes and the [`CsgManager`] front door.
//!
//! ## Pass lifecycle
//!
//! 1. **Snapshot**: on the caller's thread, the manager reads the tree's
//!    flags, rebuilds the compact tree on topology change and resolves every
//!    brush's polytope through the [`PolytopeSource`]. Flags are cleared.
//! 2. **Run**: the tree's cached state moves into the pass, which runs as a
//!    task graph on the rayon pool.
//! 3. **Complete**: the state and a [`PassResult`] come back through a
//!    channel; callbacks fire on the thread that polls.
//!
//! A tree has at most one pass in flight. Trees with a pass in flight are
//! deferred and keep their flags until the next update.

mod manager;
mod pass;

#[cfg(test)]
mod tests;

pub use manager::CsgManager;

use std::sync::Arc;

use glam::DMat4;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::assembly::{MeshQuery, TreeOutput};
use crate::cache::{BrushCaches, CacheStats};
use crate::compact::CompactTree;
use crate::error::CsgResult;
use crate::hierarchy::{CsgHierarchy, DirtyFlags, NodeId, Operation};
use crate::order::BrushOrder;
use crate::polytope::{Polytope, PolytopeId, PolytopeSource};

// =============================================================================
// BRUSH INPUT
// =============================================================================

/// Everything a brush's geometry is built from.
#[derive(Debug, Clone)]
pub struct BrushInput {
    /// The brush.
    pub node: NodeId,
    /// Referenced polytope.
    pub polytope_id: PolytopeId,
    /// Polytope generation at snapshot time.
    pub generation: Option<u64>,
    /// Resolved polytope, `None` when unavailable.
    pub polytope: Option<Arc<Polytope>>,
    /// Brush-local to tree space.
    pub local_to_tree: DMat4,
    /// Boolean operation.
    pub operation: Operation,
}

impl BrushInput {
    /// True when both inputs would build the same geometry.
    pub fn same_source(&self, other: &BrushInput) -> bool {
        self.node == other.node
            && self.polytope_id == other.polytope_id
            && self.generation == other.generation
            && self.polytope.is_some() == other.polytope.is_some()
            && self.local_to_tree == other.local_to_tree
            && self.operation == other.operation
    }
}

// =============================================================================
// PASS RESULT
// =============================================================================

/// Report of one completed pass.
#[derive(Debug, Clone)]
pub struct PassResult {
    /// Tree root.
    pub tree: NodeId,
    /// Pass number for this tree, starting at 1.
    pub pass: u64,
    /// Output after the pass.
    pub output: Arc<TreeOutput>,
    /// Brushes whose render buffers were rebuilt or removed.
    pub stale_brushes: Vec<NodeId>,
    /// Cache write counters after the pass.
    pub stats: CacheStats,
}

// =============================================================================
// TREE STATE
// =============================================================================

/// Cached state of one tree between passes.
#[derive(Debug, Clone, Default)]
pub(crate) struct TreeState {
    pub(crate) compact: Option<Arc<CompactTree>>,
    pub(crate) order: BrushOrder,
    pub(crate) caches: BrushCaches,
    pub(crate) output: Arc<TreeOutput>,
    pub(crate) passes: u64,
}

impl TreeState {
    /// Render revision of a brush.
    pub(crate) fn render_revision(&self, brush: NodeId) -> Option<u64> {
        let order = self.order.order_of(brush)?;
        self.caches.render.revision(order)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Inputs of one pass, captured on the caller's thread.
#[derive(Debug, Clone)]
pub(crate) struct TreeSnapshot {
    pub(crate) tree: NodeId,
    pub(crate) compact: Arc<CompactTree>,
    pub(crate) topology_changed: bool,
    pub(crate) inputs: FxHashMap<NodeId, BrushInput>,
    pub(crate) flagged: FxHashSet<NodeId>,
    pub(crate) force_full: bool,
    pub(crate) reassemble: bool,
    pub(crate) queries: Arc<[MeshQuery]>,
}

impl TreeSnapshot {
    /// Captures a tree.
    ///
    /// The compact tree of `state` is reused unless a node of the tree
    /// carries [`DirtyFlags::HIERARCHY_MODIFIED`]. Brushes that cannot be
    /// read are logged and left without inputs.
    ///
    /// # Errors
    ///
    /// Fails when the compact tree cannot be built from `tree`.
    pub(crate) fn capture(
        hierarchy: &CsgHierarchy,
        tree: NodeId,
        state: Option<&TreeState>,
        source: &dyn PolytopeSource,
        force_full: bool,
        reassemble: bool,
        queries: Arc<[MeshQuery]>,
    ) -> CsgResult<Self> {
        let previous = state.and_then(|s| s.compact.clone());
        let topology_changed =
            previous.is_none() || hierarchy.subtree_has_flag(tree, DirtyFlags::HIERARCHY_MODIFIED);
        let compact = match previous {
            Some(compact) if !topology_changed => compact,
            _ => Arc::new(CompactTree::build(hierarchy, tree)?),
        };

        let mut inputs = FxHashMap::default();
        let mut flagged = FxHashSet::default();
        for &node in compact.brushes() {
            let Some(entry) = hierarchy.node(node) else {
                warn!(brush = ?node, "brush vanished from hierarchy, skipped");
                continue;
            };
            if !entry.flags().is_empty() {
                flagged.insert(node);
            }
            match hierarchy.brush(node) {
                Ok((polytope_id, local_to_tree)) => {
                    inputs.insert(
                        node,
                        BrushInput {
                            node,
                            polytope_id,
                            generation: source.generation(polytope_id),
                            polytope: source.get_polytope(polytope_id),
                            local_to_tree,
                            operation: entry.operation(),
                        },
                    );
                }
                Err(error) => warn!(brush = ?node, error = %error, "brush skipped"),
            }
        }

        Ok(Self {
            tree,
            compact,
            topology_changed,
            inputs,
            flagged,
            force_full,
            reassemble,
            queries,
        })
    }

    /// True when running a pass on `state` would change nothing.
    pub(crate) fn is_unchanged(&self, state: &TreeState) -> bool {
        !self.topology_changed
            && !self.force_full
            && !self.reassemble
            && self.flagged.is_empty()
            && state.order.iter().all(|entry| {
                match (self.inputs.get(&entry.node), state.caches.base.get(entry.order)) {
                    (Some(input), Some(base)) => input.same_source(base),
                    (None, None) => true,
                    _ => false,
                }
            })
    }
}
