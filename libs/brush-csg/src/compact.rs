//! # Compact Tree
//!
//! Read-only flattening of one hierarchy tree.
//!
//! ## Layout
//!
//! - `nodes`: breadth-first array; each node's children occupy a contiguous
//!   index range, and each node knows the range of brushes (in evaluation
//!   order) found in its subtree
//! - `brushes`: depth-first order of active brushes, which is the
//!   evaluation order and the basis of every order index
//! - `chains`: per brush, the brush node and its ancestors up to but
//!   excluding the root
//!
//! Leading children of an operation node that are neither additive nor
//! copy have nothing to act upon and are dropped together with their
//! subtrees.

use std::collections::VecDeque;
use std::ops::Range;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::warn;

use crate::error::{CsgError, CsgResult};
use crate::hierarchy::{CsgHierarchy, NodeId, NodeKind, Operation};

/// Kind of a compact node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactKind {
    /// The tree root.
    Tree,
    /// An operation node.
    Branch,
    /// A brush leaf.
    Brush,
}

/// One node of a [`CompactTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactNode {
    /// Hierarchy handle.
    pub id: NodeId,
    /// Node kind.
    pub kind: CompactKind,
    /// Boolean operation against preceding siblings.
    pub operation: Operation,
    /// Index of the parent node.
    pub parent: Option<u32>,
    /// Indices of the children.
    pub children: Range<u32>,
    /// Evaluation-order range of the brushes in this subtree.
    pub brushes: Range<u32>,
}

/// A brush and its ancestors, bottom-up, excluding the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BottomUpChain {
    /// The brush.
    pub brush: NodeId,
    /// Node indices: the brush first, then each ancestor below the root.
    pub nodes: SmallVec<[u32; 8]>,
}

/// Flattened, immutable view of one tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactTree {
    root: NodeId,
    nodes: Vec<CompactNode>,
    brushes: Vec<NodeId>,
    brush_nodes: Vec<u32>,
    chains: Vec<BottomUpChain>,
    lookup: FxHashMap<NodeId, u32>,
}

impl CompactTree {
    /// Flattens the tree rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`CsgError::InvalidNode`] for a stale root and
    /// [`CsgError::WrongNodeKind`] when `root` is not a tree.
    pub fn build(hierarchy: &CsgHierarchy, root: NodeId) -> CsgResult<Self> {
        let root_node = hierarchy
            .node(root)
            .ok_or(CsgError::InvalidNode { node: root })?;
        if *root_node.kind() != NodeKind::Tree {
            return Err(CsgError::WrongNodeKind {
                node: root,
                expected: "tree",
                actual: root_node.kind().name(),
            });
        }

        // Breadth-first layout
        let mut nodes = vec![CompactNode {
            id: root,
            kind: CompactKind::Tree,
            operation: Operation::Additive,
            parent: None,
            children: 0..0,
            brushes: 0..0,
        }];
        let mut queue: VecDeque<u32> = VecDeque::from([0]);
        while let Some(index) = queue.pop_front() {
            let id = nodes[index as usize].id;
            let Some(node) = hierarchy.node(id) else {
                continue;
            };
            let start = nodes.len() as u32;
            let mut leading = true;
            for &child_id in node.children() {
                let Some(child) = hierarchy.node(child_id) else {
                    warn!(node = ?child_id, "skipping dangling child reference");
                    continue;
                };
                if leading
                    && !matches!(child.operation(), Operation::Additive | Operation::Copy)
                {
                    continue;
                }
                leading = false;
                let kind = match child.kind() {
                    NodeKind::Tree => {
                        warn!(node = ?child_id, "skipping nested tree");
                        continue;
                    }
                    NodeKind::Branch => CompactKind::Branch,
                    NodeKind::Brush { .. } => CompactKind::Brush,
                };
                let child_index = nodes.len() as u32;
                nodes.push(CompactNode {
                    id: child_id,
                    kind,
                    operation: child.operation(),
                    parent: Some(index),
                    children: 0..0,
                    brushes: 0..0,
                });
                queue.push_back(child_index);
            }
            nodes[index as usize].children = start..nodes.len() as u32;
        }

        // Depth-first brush order and subtree brush ranges
        enum Visit {
            Enter(u32),
            Exit(u32, u32),
        }
        let mut brushes = Vec::new();
        let mut brush_nodes = Vec::new();
        let mut stack = vec![Visit::Enter(0)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(index) => {
                    let node = &nodes[index as usize];
                    let start = brush_nodes.len() as u32;
                    if node.kind == CompactKind::Brush {
                        brushes.push(node.id);
                        brush_nodes.push(index);
                    }
                    stack.push(Visit::Exit(index, start));
                    for child in node.children.clone().rev() {
                        stack.push(Visit::Enter(child));
                    }
                }
                Visit::Exit(index, start) => {
                    nodes[index as usize].brushes = start..brush_nodes.len() as u32;
                }
            }
        }

        let chains = brush_nodes
            .iter()
            .zip(&brushes)
            .map(|(&index, &brush)| {
                let mut chain = SmallVec::new();
                let mut current = Some(index);
                while let Some(i) = current {
                    let node = &nodes[i as usize];
                    if node.kind == CompactKind::Tree {
                        break;
                    }
                    chain.push(i);
                    current = node.parent;
                }
                BottomUpChain {
                    brush,
                    nodes: chain,
                }
            })
            .collect();

        let lookup = nodes
            .iter()
            .enumerate()
            .map(|(index, node)| (node.id, index as u32))
            .collect();

        Ok(Self {
            root,
            nodes,
            brushes,
            brush_nodes,
            chains,
            lookup,
        })
    }

    /// Tree root handle.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Breadth-first node array; index 0 is the root.
    pub fn nodes(&self) -> &[CompactNode] {
        &self.nodes
    }

    /// Active brushes in evaluation order.
    pub fn brushes(&self) -> &[NodeId] {
        &self.brushes
    }

    /// Number of active brushes.
    pub fn brush_count(&self) -> usize {
        self.brushes.len()
    }

    /// Node index of the brush at evaluation position `order`.
    pub fn brush_node(&self, order: usize) -> Option<u32> {
        self.brush_nodes.get(order).copied()
    }

    /// Bottom-up chains, parallel to [`CompactTree::brushes`].
    pub fn chains(&self) -> &[BottomUpChain] {
        &self.chains
    }

    /// Node index of a hierarchy handle.
    pub fn index_of(&self, id: NodeId) -> Option<u32> {
        self.lookup.get(&id).copied()
    }

    /// Children of a node.
    pub fn children(&self, index: u32) -> &[CompactNode] {
        let range = &self.nodes[index as usize].children;
        &self.nodes[range.start as usize..range.end as usize]
    }
}

// =============================================================================
// TESTS
// =============================================================================
