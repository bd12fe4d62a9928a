//! # Brush Order
//!
//! Dense per-pass order indices and the plan for moving order-indexed
//! caches from one pass to the next.

use rustc_hash::FxHashMap;

use crate::compact::CompactTree;
use crate::hierarchy::NodeId;

/// A brush and its dense order index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexOrder {
    /// Brush handle.
    pub node: NodeId,
    /// Position in `[0, brush_count)`.
    pub order: u32,
}

/// Bijection between brushes and dense order indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrushOrder {
    nodes: Vec<NodeId>,
    lookup: FxHashMap<NodeId, u32>,
}

impl BrushOrder {
    /// Order of a compact tree: evaluation order.
    pub fn from_compact(tree: &CompactTree) -> Self {
        Self::from_nodes(tree.brushes().to_vec())
    }

    /// Order from an explicit brush list.
    pub fn from_nodes(nodes: Vec<NodeId>) -> Self {
        let lookup = nodes
            .iter()
            .enumerate()
            .map(|(order, &node)| (node, order as u32))
            .collect();
        Self { nodes, lookup }
    }

    /// Order index of a brush.
    pub fn order_of(&self, node: NodeId) -> Option<u32> {
        self.lookup.get(&node).copied()
    }

    /// Brush at an order index.
    pub fn node(&self, order: u32) -> Option<NodeId> {
        self.nodes.get(order as usize).copied()
    }

    /// Brushes by order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Number of brushes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when there are no brushes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All `(node, order)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = IndexOrder> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(|(order, &node)| IndexOrder {
                node,
                order: order as u32,
            })
    }
}

/// How entries move from a previous order to the current one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderRemap {
    /// For each previous order, the current order of the same brush.
    pub moves: Vec<Option<u32>>,
    /// Brushes present before and gone now, with their previous order.
    pub removed: Vec<IndexOrder>,
    /// Brushes new in this pass, with their current order.
    pub added: Vec<IndexOrder>,
    /// Length of the current order.
    pub new_len: usize,
}

impl OrderRemap {
    /// Plans the move from `previous` to `current`.
    pub fn plan(previous: &BrushOrder, current: &BrushOrder) -> Self {
        let mut removed = Vec::new();
        let moves = previous
            .iter()
            .map(|entry| {
                let target = current.order_of(entry.node);
                if target.is_none() {
                    removed.push(entry);
                }
                target
            })
            .collect();
        let added = current
            .iter()
            .filter(|entry| previous.order_of(entry.node).is_none())
            .collect();
        Self {
            moves,
            removed,
            added,
            new_len: current.len(),
        }
    }

    /// True when nothing moved, appeared or disappeared.
    pub fn is_identity(&self) -> bool {
        self.removed.is_empty()
            && self.added.is_empty()
            && self.moves.len() == self.new_len
            && self
                .moves
                .iter()
                .enumerate()
                .all(|(old, new)| *new == Some(old as u32))
    }

    /// Full permutation over `max(old, new)` slots.
    ///
    /// `result[old] = new`. Sources without a destination (removed brushes
    /// and padding) take the unused destinations in ascending order, so the
    /// slots they carry land at the positions of added brushes or past the
    /// new length.
    pub fn permutation(&self) -> Vec<usize> {
        let size = self.moves.len().max(self.new_len);
        let mut taken = vec![false; size];
        for target in self.moves.iter().flatten() {
            taken[*target as usize] = true;
        }
        let mut free = (0..size).filter(|&slot| !taken[slot]);
        (0..size)
            .map(|old| match self.moves.get(old).copied().flatten() {
                Some(target) => target as usize,
                None => free.next().unwrap_or(old),
            })
            .collect()
    }
}
