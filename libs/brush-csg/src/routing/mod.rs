//! # Category Routing
//!
//! Per-brush programs that decide which polygon fragments survive.
//!
//! ## Categories
//!
//! A fragment of a brush face is categorized against every solid it meets:
//!
//! - `Inside`: strictly inside the solid
//! - `Aligned`: on the solid's boundary, facing the same way
//! - `ReverseAligned`: on the boundary, facing the opposite way
//! - `Outside`: outside the solid
//!
//! ## Programs
//!
//! A [`RoutingTable`] is a small stack program compiled from the compact
//! tree. Walking from the root along the brush's bottom-up chain, every
//! child either combines a category into the running value or, for
//! branches, pushes a fresh value, evaluates the branch and pops-combines
//! it. Subtrees that hold neither the brush nor any brush it touches fold to
//! a constant `Outside`, which is elided under union and difference. Copy
//! children off the path are skipped; a copy child on the path replaces the
//! whole sibling group.
//!
//! A fragment is kept when the program yields `Aligned`, and kept flipped
//! when it yields `ReverseAligned`. A flipped fragment lying back-to-back on
//! a face of an input brush is dropped: that brush yields `Aligned` for the
//! same surface and keeps it unflipped.


use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::compact::{CompactKind, CompactTree};
use crate::hierarchy::{NodeId, Operation};
use crate::order::BrushOrder;

// =============================================================================
// CATEGORIES
// =============================================================================

/// Position of a fragment relative to a solid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Category {
    /// Strictly inside.
    Inside = 0,
    /// On the boundary, same orientation.
    Aligned = 1,
    /// On the boundary, opposite orientation.
    ReverseAligned = 2,
    /// Outside.
    Outside = 3,
}

use Category::{Aligned as AL, Inside as IN, Outside as OUT, ReverseAligned as RV};

/// Union, indexed `[left][right]`.
const UNION: [[Category; 4]; 4] = [
    [IN, IN, IN, IN],
    [IN, AL, IN, AL],
    [IN, IN, RV, RV],
    [IN, AL, RV, OUT],
];

/// Intersection, indexed `[left][right]`.
const INTERSECTION: [[Category; 4]; 4] = [
    [IN, AL, RV, OUT],
    [AL, AL, OUT, OUT],
    [RV, OUT, RV, OUT],
    [OUT, OUT, OUT, OUT],
];

/// Difference `left - right`, indexed `[left][right]`.
const DIFFERENCE: [[Category; 4]; 4] = [
    [OUT, RV, AL, IN],
    [OUT, OUT, AL, AL],
    [OUT, RV, OUT, RV],
    [OUT, OUT, OUT, OUT],
];

impl Category {
    /// All categories in index order.
    pub const ALL: [Category; 4] = [IN, AL, RV, OUT];

    /// Category relative to the complement of the solid.
    pub fn complement(self) -> Self {
        match self {
            IN => OUT,
            AL => RV,
            RV => AL,
            OUT => IN,
        }
    }

    /// Applies the last-write-wins rule to a category against a touching brush.
    ///
    /// Only coincident faces tie. An aligned boundary counts as inside a
    /// brush later in evaluation order and as outside an earlier one.
    /// Reverse-aligned boundaries are left for the combine tables.
    pub fn resolve_tie(self, later: bool) -> Self {
        match self {
            AL if later => IN,
            AL => OUT,
            other => other,
        }
    }
}

/// Combines the running category with a child's category.
pub fn combine(operation: Operation, left: Category, right: Category) -> Category {
    let (l, r) = (left as usize, right as usize);
    match operation {
        Operation::Additive => UNION[l][r],
        Operation::Intersecting => INTERSECTION[l][r],
        Operation::Subtractive => DIFFERENCE[l][r],
        Operation::Copy => right,
    }
}

// =============================================================================
// ROUTING TABLE
// =============================================================================

/// A touching brush consulted by a routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingInput {
    /// The touching brush.
    pub brush: NodeId,
    /// True when it comes after the owning brush in evaluation order.
    pub later: bool,
}

/// Where a combine step takes its right-hand category from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingSource {
    /// The owning brush itself.
    Own,
    /// The input at this index.
    Input(u32),
    /// A fixed category.
    Constant(Category),
}

/// One instruction of a routing program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoutingStep {
    /// Saves the running value and starts a new one at `Outside`.
    Push,
    /// Combines a category into the running value.
    Combine {
        /// Operation of the combined child.
        operation: Operation,
        /// Category source.
        source: RoutingSource,
    },
    /// Restores the saved value and combines the finished one into it.
    PopCombine {
        /// Operation of the finished branch.
        operation: Operation,
    },
}

/// Compiled routing program of one brush.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    brush: NodeId,
    inputs: Vec<RoutingInput>,
    steps: Vec<RoutingStep>,
}

impl RoutingTable {
    /// Compiles the table of the brush at evaluation position `own`.
    ///
    /// `touching` lists the brushes it touches; entries missing from `order`
    /// are ignored. Returns `None` when `own` is not a brush of `tree`.
    pub fn build(
        tree: &CompactTree,
        order: &BrushOrder,
        own: u32,
        touching: &[NodeId],
    ) -> Option<Self> {
        let brush = *tree.brushes().get(own as usize)?;
        let chain = tree.chains().get(own as usize)?;

        let mut relevant: SmallVec<[u32; 16]> = touching
            .iter()
            .filter_map(|&node| order.order_of(node))
            .filter(|&o| o != own)
            .collect();
        relevant.push(own);
        relevant.sort_unstable();
        relevant.dedup();

        let mut builder = Builder {
            tree,
            own,
            path: &chain.nodes,
            relevant: &relevant,
            steps: Vec::new(),
            referenced: BTreeSet::new(),
        };
        builder.emit_children(0);

        let inputs: Vec<u32> = builder.referenced.iter().copied().collect();
        let steps = builder
            .steps
            .into_iter()
            .map(|step| match step {
                RoutingStep::Combine {
                    operation,
                    source: RoutingSource::Input(input_order),
                } => RoutingStep::Combine {
                    operation,
                    source: RoutingSource::Input(
                        inputs.binary_search(&input_order).unwrap_or_default() as u32,
                    ),
                },
                other => other,
            })
            .collect();
        let inputs = inputs
            .into_iter()
            .filter_map(|input_order| {
                Some(RoutingInput {
                    brush: *tree.brushes().get(input_order as usize)?,
                    later: input_order > own,
                })
            })
            .collect();

        Some(Self {
            brush,
            inputs,
            steps,
        })
    }

    /// Owning brush.
    pub fn brush(&self) -> NodeId {
        self.brush
    }

    /// Touching brushes the program reads, in evaluation order.
    pub fn inputs(&self) -> &[RoutingInput] {
        &self.inputs
    }

    /// Program steps.
    pub fn steps(&self) -> &[RoutingStep] {
        &self.steps
    }

    /// Runs the program.
    ///
    /// `own` is the fragment's category against its own brush and
    /// `inputs[k]` its tie-resolved category against input `k`. Missing
    /// inputs read as `Outside`.
    pub fn route(&self, own: Category, inputs: &[Category]) -> Category {
        let mut stack: SmallVec<[Category; 8]> = SmallVec::new();
        let mut current = OUT;
        for step in &self.steps {
            match *step {
                RoutingStep::Push => {
                    stack.push(current);
                    current = OUT;
                }
                RoutingStep::Combine { operation, source } => {
                    let value = match source {
                        RoutingSource::Own => own,
                        RoutingSource::Input(index) => {
                            inputs.get(index as usize).copied().unwrap_or(OUT)
                        }
                        RoutingSource::Constant(category) => category,
                    };
                    current = combine(operation, current, value);
                }
                RoutingStep::PopCombine { operation } => {
                    let finished = current;
                    current = combine(operation, stack.pop().unwrap_or(OUT), finished);
                }
            }
        }
        current
    }
}

/// Program emitter for one brush.
struct Builder<'a> {
    tree: &'a CompactTree,
    own: u32,
    path: &'a [u32],
    relevant: &'a [u32],
    steps: Vec<RoutingStep>,
    referenced: BTreeSet<u32>,
}

impl Builder<'_> {
    fn on_path(&self, index: u32) -> bool {
        self.path.contains(&index)
    }

    fn is_relevant(&self, index: u32) -> bool {
        let range = &self.tree.nodes()[index as usize].brushes;
        let start = self.relevant.partition_point(|&o| o < range.start);
        self.relevant.get(start).is_some_and(|&o| o < range.end)
    }

    fn emit_children(&mut self, parent: u32) {
        let tree = self.tree;
        let range = tree.nodes()[parent as usize].children.clone();

        let path_copy = range.clone().find(|&child| {
            self.on_path(child) && tree.nodes()[child as usize].operation == Operation::Copy
        });
        if let Some(child) = path_copy {
            self.emit_child(child);
            return;
        }

        for child in range {
            let node = &tree.nodes()[child as usize];
            if node.operation == Operation::Copy && !self.on_path(child) {
                continue;
            }
            if !self.is_relevant(child) {
                if node.operation == Operation::Intersecting {
                    self.steps.push(RoutingStep::Combine {
                        operation: Operation::Intersecting,
                        source: RoutingSource::Constant(OUT),
                    });
                }
                continue;
            }
            self.emit_child(child);
        }
    }

    fn emit_child(&mut self, child: u32) {
        let tree = self.tree;
        let node = &tree.nodes()[child as usize];
        let operation = node.operation;
        match node.kind {
            CompactKind::Brush => {
                let brush_order = node.brushes.start;
                let source = if brush_order == self.own {
                    RoutingSource::Own
                } else {
                    self.referenced.insert(brush_order);
                    RoutingSource::Input(brush_order)
                };
                self.steps.push(RoutingStep::Combine { operation, source });
            }
            CompactKind::Branch | CompactKind::Tree => {
                self.steps.push(RoutingStep::Push);
                self.emit_children(child);
                self.steps.push(RoutingStep::PopCombine { operation });
            }
        }
    }
}
