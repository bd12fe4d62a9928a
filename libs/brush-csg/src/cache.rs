//! # Order-Indexed Caches
//!
//! Per-brush caches addressed by dense order index.
//!
//! ## Features
//!
//! - **Independent lifetimes**: each cache is invalidated per entry
//! - **Revisions**: every write stamps the entry with the cache's write counter
//! - **Remapping**: entries follow their brush across order changes by
//!   cycle-following swaps, removed brushes' entries are disposed
//! - **Statistics**: write counters are exposed for change tracking

use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::warn;

use crate::brush::TreeBrush;
use crate::evaluate::BrushRender;
use crate::geometry::Aabb;
use crate::hierarchy::NodeId;
use crate::order::OrderRemap;
use crate::pipeline::BrushInput;
use crate::routing::RoutingTable;

// =============================================================================
// ORDERED CACHE
// =============================================================================

#[derive(Debug, Clone)]
struct Slot<T> {
    value: Option<T>,
    revision: u64,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            value: None,
            revision: 0,
        }
    }
}

/// Cache length did not match the order it was remapped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthMismatch {
    /// Entries the cache held.
    pub cache_len: usize,
    /// Entries the previous order expected.
    pub expected: usize,
}

/// Vector of optional entries indexed by brush order.
#[derive(Debug, Clone)]
pub struct OrderedCache<T> {
    slots: Vec<Slot<T>>,
    writes: u64,
}

impl<T> Default for OrderedCache<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            writes: 0,
        }
    }
}

impl<T> OrderedCache<T> {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Entry at `order`.
    pub fn get(&self, order: u32) -> Option<&T> {
        self.slots.get(order as usize)?.value.as_ref()
    }

    /// True when `order` holds a value.
    pub fn contains(&self, order: u32) -> bool {
        self.get(order).is_some()
    }

    /// Revision of the entry at `order`; 0 when never written.
    pub fn revision(&self, order: u32) -> Option<u64> {
        self.slots.get(order as usize).map(|slot| slot.revision)
    }

    /// Total writes since creation.
    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Stores a value, growing the cache if needed.
    pub fn set(&mut self, order: u32, value: T) {
        let index = order as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, Slot::default);
        }
        self.writes += 1;
        self.slots[index] = Slot {
            value: Some(value),
            revision: self.writes,
        };
    }

    /// Drops the value at `order`, keeping its revision.
    pub fn invalidate(&mut self, order: u32) -> Option<T> {
        self.slots.get_mut(order as usize)?.value.take()
    }

    /// Drops every value and sets the length.
    pub fn reset(&mut self, len: usize) {
        self.slots.clear();
        self.slots.resize_with(len, Slot::default);
    }

    /// Moves entries from the previous order to the current one.
    ///
    /// Entries of removed brushes are disposed. The permutation is applied
    /// in place by following cycles, then the cache is truncated to the new
    /// length.
    ///
    /// # Errors
    ///
    /// When the cache length does not match the previous order, the cache
    /// is reset to the new length and the mismatch is returned.
    pub fn remap(&mut self, plan: &OrderRemap) -> Result<(), LengthMismatch> {
        if self.slots.len() != plan.moves.len() {
            let mismatch = LengthMismatch {
                cache_len: self.slots.len(),
                expected: plan.moves.len(),
            };
            self.reset(plan.new_len);
            return Err(mismatch);
        }

        for removed in &plan.removed {
            if let Some(slot) = self.slots.get_mut(removed.order as usize) {
                *slot = Slot::default();
            }
        }

        let mut permutation = plan.permutation();
        self.slots.resize_with(permutation.len(), Slot::default);
        for start in 0..permutation.len() {
            while permutation[start] != start {
                let target = permutation[start];
                self.slots.swap(start, target);
                permutation.swap(start, target);
            }
        }
        self.slots.truncate(plan.new_len);
        Ok(())
    }

    /// Iterates `(order, value)` over filled slots.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(order, slot)| slot.value.as_ref().map(|value| (order as u32, value)))
    }
}

// =============================================================================
// BRUSH CACHES
// =============================================================================

/// Brushes a brush touches, by identity.
pub type TouchingSet = Arc<[NodeId]>;

/// Write counters of every per-brush cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Brushes in the tree.
    pub brushes: usize,
    /// Base polytope writes.
    pub base_writes: u64,
    /// Tree-space brush writes.
    pub brush_writes: u64,
    /// Bounds writes.
    pub bounds_writes: u64,
    /// Touching set writes.
    pub touching_writes: u64,
    /// Routing table writes.
    pub routing_writes: u64,
    /// Render buffer writes.
    pub render_writes: u64,
}

/// Every per-brush cache of one tree.
#[derive(Debug, Clone, Default)]
pub struct BrushCaches {
    /// Inputs the brush was last built from.
    pub base: OrderedCache<BrushInput>,
    /// Tree-space geometry.
    pub brushes: OrderedCache<Arc<TreeBrush>>,
    /// Padded tree-space bounds.
    pub bounds: OrderedCache<Aabb>,
    /// Touching sets.
    pub touching: OrderedCache<TouchingSet>,
    /// Routing tables.
    pub routing: OrderedCache<Arc<RoutingTable>>,
    /// Evaluated surfaces.
    pub render: OrderedCache<Arc<BrushRender>>,
}

impl BrushCaches {
    /// Remaps every cache.
    ///
    /// Returns the current orders that must be treated as directly dirty
    /// because a cache had to be reset.
    pub fn remap(&mut self, plan: &OrderRemap) -> FxHashSet<u32> {
        let results = [
            ("base", self.base.remap(plan)),
            ("brushes", self.brushes.remap(plan)),
            ("bounds", self.bounds.remap(plan)),
            ("touching", self.touching.remap(plan)),
            ("routing", self.routing.remap(plan)),
            ("render", self.render.remap(plan)),
        ];
        let mut reset = FxHashSet::default();
        for (name, result) in results {
            if let Err(mismatch) = result {
                warn!(
                    cache = name,
                    cache_len = mismatch.cache_len,
                    expected = mismatch.expected,
                    "cache length mismatch, cache cleared"
                );
                reset.extend(0..plan.new_len as u32);
            }
        }
        reset
    }

    /// Drops every entry of one brush.
    pub fn invalidate(&mut self, order: u32) {
        self.base.invalidate(order);
        self.brushes.invalidate(order);
        self.bounds.invalidate(order);
        self.touching.invalidate(order);
        self.routing.invalidate(order);
        self.render.invalidate(order);
    }

    /// Current write counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            brushes: self.base.len(),
            base_writes: self.base.writes(),
            brush_writes: self.brushes.writes(),
            bounds_writes: self.bounds.writes(),
            touching_writes: self.touching.writes(),
            routing_writes: self.routing.writes(),
            render_writes: self.render.writes(),
        }
    }
}
