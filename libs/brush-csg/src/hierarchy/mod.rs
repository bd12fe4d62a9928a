//! # CSG Hierarchy
//!
//! Mutable scene graph of trees, branches and brushes.
//!
//! Nodes live in a slot map and are addressed by generation-checked
//! [`NodeId`] handles. Every mutation records [`DirtyFlags`] on the touched
//! node and, for topology changes, on the owning tree root. The update
//! pipeline reads the flags and clears them once it has consumed a tree.
//!
//! ## Example
//!
//! ```rust
//! use brush_csg::hierarchy::{CsgHierarchy, Operation};
//! use brush_csg::polytope::PolytopeId;
//! use glam::DMat4;
//!
//! let mut hierarchy = CsgHierarchy::new();
//! let tree = hierarchy.create_tree();
//! let brush = hierarchy.create_brush(PolytopeId(0), DMat4::IDENTITY, Operation::Additive);
//! hierarchy.append_child(tree, brush).unwrap();
//! assert_eq!(hierarchy.root_of(brush), Some(tree));
//! ```


use std::ops::{BitOr, BitOrAssign};

use glam::DMat4;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use crate::error::{CsgError, CsgResult};
use crate::polytope::PolytopeId;

new_key_type! {
    /// Handle of a node in a [`CsgHierarchy`].
    pub struct NodeId;
}

// =============================================================================
// OPERATION
// =============================================================================

/// Boolean operation a node applies to the result of its preceding siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operation {
    /// Union.
    #[default]
    Additive,
    /// Difference.
    Subtractive,
    /// Intersection.
    Intersecting,
    /// Pass-through: the node's own result is kept unchanged.
    Copy,
}

// =============================================================================
// DIRTY FLAGS
// =============================================================================

/// Modification flags recorded by mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DirtyFlags(u8);

impl DirtyFlags {
    /// Nothing changed.
    pub const NONE: Self = Self(0);
    /// The brush's polytope changed.
    pub const SHAPE_MODIFIED: Self = Self(1);
    /// The brush's transform changed.
    pub const TRANSFORM_MODIFIED: Self = Self(1 << 1);
    /// Children, parent or operation changed.
    pub const HIERARCHY_MODIFIED: Self = Self(1 << 2);

    /// True when every bit of `other` is set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DirtyFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// NODES
// =============================================================================

/// Kind-specific node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Root of an independently evaluated tree.
    Tree,
    /// Grouping node that combines its children.
    Branch,
    /// Convex solid.
    Brush {
        /// Shape in the polytope store.
        polytope: PolytopeId,
        /// Brush-local to tree space.
        local_to_tree: DMat4,
    },
}

impl NodeKind {
    /// Short name used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Tree => "tree",
            NodeKind::Branch => "branch",
            NodeKind::Brush { .. } => "brush",
        }
    }
}

/// A node in the hierarchy.
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    operation: Operation,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    flags: DirtyFlags,
}

impl Node {
    fn new(kind: NodeKind, operation: Operation, flags: DirtyFlags) -> Self {
        Self {
            kind,
            operation,
            parent: None,
            children: Vec::new(),
            flags,
        }
    }

    /// Kind and kind-specific data.
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Boolean operation.
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Parent node, if attached.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Ordered children.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Pending modification flags.
    pub fn flags(&self) -> DirtyFlags {
        self.flags
    }

    fn can_have_children(&self) -> bool {
        !matches!(self.kind, NodeKind::Brush { .. })
    }
}

// =============================================================================
// HIERARCHY
// =============================================================================

/// Arena of CSG nodes.
#[derive(Debug, Clone, Default)]
pub struct CsgHierarchy {
    nodes: SlotMap<NodeId, Node>,
}

impl CsgHierarchy {
    /// Creates an empty hierarchy.
    pub fn new() -> Self {
        Self::default()
    }

    // ----- Creation -----

    /// Creates a new, empty tree root.
    pub fn create_tree(&mut self) -> NodeId {
        self.nodes.insert(Node::new(
            NodeKind::Tree,
            Operation::Additive,
            DirtyFlags::HIERARCHY_MODIFIED,
        ))
    }

    /// Creates a detached branch.
    pub fn create_branch(&mut self, operation: Operation) -> NodeId {
        self.nodes.insert(Node::new(
            NodeKind::Branch,
            operation,
            DirtyFlags::HIERARCHY_MODIFIED,
        ))
    }

    /// Creates a detached brush.
    pub fn create_brush(
        &mut self,
        polytope: PolytopeId,
        local_to_tree: DMat4,
        operation: Operation,
    ) -> NodeId {
        self.nodes.insert(Node::new(
            NodeKind::Brush {
                polytope,
                local_to_tree,
            },
            operation,
            DirtyFlags::SHAPE_MODIFIED
                | DirtyFlags::TRANSFORM_MODIFIED
                | DirtyFlags::HIERARCHY_MODIFIED,
        ))
    }

    // ----- Queries -----

    /// Looks up a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// True when `id` refers to a live node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the hierarchy holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All tree roots, in slot order.
    pub fn trees(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .filter(|(_, node)| node.kind == NodeKind::Tree)
            .map(|(id, _)| id)
    }

    /// Topmost ancestor of `id`, which is `id` itself when detached.
    pub fn root_of(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        let mut node = self.nodes.get(current)?;
        while let Some(parent) = node.parent {
            current = parent;
            node = self.nodes.get(current)?;
        }
        Some(current)
    }

    /// Polytope and transform of a brush.
    pub fn brush(&self, id: NodeId) -> CsgResult<(PolytopeId, DMat4)> {
        match &self.get(id)?.kind {
            NodeKind::Brush {
                polytope,
                local_to_tree,
            } => Ok((*polytope, *local_to_tree)),
            other => Err(CsgError::WrongNodeKind {
                node: id,
                expected: "brush",
                actual: other.name(),
            }),
        }
    }

    /// True when any node of the tree carries `flag`.
    pub fn subtree_has_flag(&self, root: NodeId, flag: DirtyFlags) -> bool {
        let mut stack: SmallVec<[NodeId; 16]> = SmallVec::new();
        stack.push(root);
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.flags.contains(flag) {
                return true;
            }
            stack.extend(node.children.iter().copied());
        }
        false
    }

    // ----- Mutation -----

    /// Appends `child` as the last child of `parent`.
    ///
    /// A child that is already attached elsewhere is moved.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> CsgResult<()> {
        let index = self.get(parent)?.children.len();
        self.insert_child(parent, index, child)
    }

    /// Inserts `child` at `index` among the children of `parent`.
    ///
    /// `index` is clamped to the child count after `child` has been detached.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> CsgResult<()> {
        let parent_node = self.get(parent)?;
        if !parent_node.can_have_children() {
            return Err(CsgError::WrongNodeKind {
                node: parent,
                expected: "tree or branch",
                actual: parent_node.kind.name(),
            });
        }
        let child_node = self.get(child)?;
        if child_node.kind == NodeKind::Tree {
            return Err(CsgError::WrongNodeKind {
                node: child,
                expected: "branch or brush",
                actual: "tree",
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(CsgError::CycleDetected { parent, child });
        }

        self.detach(child)?;

        if let Some(node) = self.nodes.get_mut(parent) {
            let index = index.min(node.children.len());
            node.children.insert(index, child);
            node.flags |= DirtyFlags::HIERARCHY_MODIFIED;
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = Some(parent);
            node.flags |= DirtyFlags::HIERARCHY_MODIFIED;
        }
        self.mark_root(parent);
        Ok(())
    }

    /// Removes `id` from its parent. Detached nodes are left alone.
    pub fn detach(&mut self, id: NodeId) -> CsgResult<()> {
        let Some(parent) = self.get(id)?.parent else {
            return Ok(());
        };
        self.mark_root(parent);
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children.retain(|&c| c != id);
            node.flags |= DirtyFlags::HIERARCHY_MODIFIED;
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.parent = None;
            node.flags |= DirtyFlags::HIERARCHY_MODIFIED;
        }
        Ok(())
    }

    /// Destroys `id` and its whole subtree.
    ///
    /// Destroying a tree root invalidates every handle inside it.
    pub fn destroy(&mut self, id: NodeId) -> CsgResult<()> {
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(current) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    /// Replaces a brush's local-to-tree transform.
    pub fn set_transform(&mut self, id: NodeId, transform: DMat4) -> CsgResult<()> {
        let node = self.get_mut(id)?;
        match &mut node.kind {
            NodeKind::Brush { local_to_tree, .. } => {
                *local_to_tree = transform;
                node.flags |= DirtyFlags::TRANSFORM_MODIFIED;
                Ok(())
            }
            other => Err(CsgError::WrongNodeKind {
                node: id,
                expected: "brush",
                actual: other.name(),
            }),
        }
    }

    /// Points a brush at another polytope.
    pub fn set_polytope(&mut self, id: NodeId, polytope_id: PolytopeId) -> CsgResult<()> {
        let node = self.get_mut(id)?;
        match &mut node.kind {
            NodeKind::Brush { polytope, .. } => {
                *polytope = polytope_id;
                node.flags |= DirtyFlags::SHAPE_MODIFIED;
                Ok(())
            }
            other => Err(CsgError::WrongNodeKind {
                node: id,
                expected: "brush",
                actual: other.name(),
            }),
        }
    }

    /// Changes the boolean operation of a branch or brush.
    pub fn set_operation(&mut self, id: NodeId, operation: Operation) -> CsgResult<()> {
        let node = self.get_mut(id)?;
        if node.kind == NodeKind::Tree {
            return Err(CsgError::WrongNodeKind {
                node: id,
                expected: "branch or brush",
                actual: "tree",
            });
        }
        if node.operation != operation {
            node.operation = operation;
            node.flags |= DirtyFlags::HIERARCHY_MODIFIED;
            self.mark_root(id);
        }
        Ok(())
    }

    /// Sets flags on a node explicitly, e.g. to force a rebuild.
    pub fn mark_dirty(&mut self, id: NodeId, flags: DirtyFlags) -> CsgResult<()> {
        self.get_mut(id)?.flags |= flags;
        if flags.contains(DirtyFlags::HIERARCHY_MODIFIED) {
            self.mark_root(id);
        }
        Ok(())
    }

    /// Clears the flags of every node in the tree.
    pub fn clear_dirty(&mut self, root: NodeId) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(id) {
                node.flags = DirtyFlags::NONE;
                stack.extend(node.children.iter().copied());
            }
        }
    }

    // ----- Internal -----

    fn get(&self, id: NodeId) -> CsgResult<&Node> {
        self.nodes.get(id).ok_or(CsgError::InvalidNode { node: id })
    }

    fn get_mut(&mut self, id: NodeId) -> CsgResult<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or(CsgError::InvalidNode { node: id })
    }

    fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node_id) = current {
            if node_id == ancestor {
                return true;
            }
            current = self.nodes.get(node_id).and_then(|node| node.parent);
        }
        false
    }

    fn mark_root(&mut self, id: NodeId) {
        if let Some(root) = self.root_of(id) {
            if let Some(node) = self.nodes.get_mut(root) {
                node.flags |= DirtyFlags::HIERARCHY_MODIFIED;
            }
        }
    }
}
