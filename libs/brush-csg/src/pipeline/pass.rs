//! # Update Pass
//!
//! The task graph of one tree update.
//!
//! ```text
//! remap_caches → find_direct → geometry_direct → broad_phase_direct
//!     → geometry_indirect → broad_phase_indirect → intersection_loops
//!     → touching_sets → routing_tables → evaluate_brushes → assemble_meshes
//! ```
//!
//! Every shared resource sits behind its own lock in [`PassContext`]; the
//! graph orders tasks by their declared access so locks are never contended
//! across conflicting tasks. Pass-scoped buffers (dirty sets, pairs,
//! intersections) die with the context.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use super::{BrushInput, PassResult, TreeSnapshot, TreeState};
use crate::assembly::{assemble, TreeOutput};
use crate::broadphase::{canonical, find_pairs, padded_bounds, BrushPair};
use crate::brush::TreeBrush;
use crate::cache::{BrushCaches, OrderedCache, TouchingSet};
use crate::dirty::DirtySets;
use crate::error::{CsgError, CsgResult};
use crate::evaluate::{evaluate_brush, BrushRender, RoutingBrush};
use crate::geometry::Aabb;
use crate::hierarchy::NodeId;
use crate::intersection::{intersect, BrushIntersection};
use crate::order::{BrushOrder, OrderRemap};
use crate::routing::RoutingTable;
use crate::scheduler::{Resource, TaskGraph};

// =============================================================================
// CONTEXT
// =============================================================================

/// What cache remapping found out about removed brushes.
#[derive(Debug, Default)]
struct RemapOutcome {
    removed: Vec<NodeId>,
    neighbours: Vec<NodeId>,
    reset: Vec<u32>,
}

/// Shared state of one pass.
pub(crate) struct PassContext {
    snapshot: TreeSnapshot,
    previous_order: BrushOrder,
    order: BrushOrder,
    previous_output: Arc<TreeOutput>,
    passes: u64,

    base: RwLock<OrderedCache<BrushInput>>,
    brushes: RwLock<OrderedCache<Arc<TreeBrush>>>,
    bounds: RwLock<OrderedCache<Aabb>>,
    touching: RwLock<OrderedCache<TouchingSet>>,
    routing: RwLock<OrderedCache<Arc<RoutingTable>>>,
    render: RwLock<OrderedCache<Arc<BrushRender>>>,

    dirty: RwLock<DirtySets>,
    remap: RwLock<RemapOutcome>,
    pairs: RwLock<Vec<BrushPair>>,
    intersections: RwLock<FxHashMap<BrushPair, Arc<BrushIntersection>>>,
    output: RwLock<Option<Arc<TreeOutput>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn take<T: Default>(lock: &RwLock<T>) -> T {
    std::mem::take(&mut *write(lock))
}

impl PassContext {
    fn new(state: TreeState, snapshot: TreeSnapshot) -> Self {
        let TreeState {
            order: previous_order,
            caches,
            output: previous_output,
            passes,
            ..
        } = state;
        let order = if snapshot.topology_changed {
            BrushOrder::from_compact(&snapshot.compact)
        } else {
            previous_order.clone()
        };
        let dirty = DirtySets::new(order.len());
        Self {
            snapshot,
            previous_order,
            order,
            previous_output,
            passes,
            base: RwLock::new(caches.base),
            brushes: RwLock::new(caches.brushes),
            bounds: RwLock::new(caches.bounds),
            touching: RwLock::new(caches.touching),
            routing: RwLock::new(caches.routing),
            render: RwLock::new(caches.render),
            dirty: RwLock::new(dirty),
            remap: RwLock::new(RemapOutcome::default()),
            pairs: RwLock::new(Vec::new()),
            intersections: RwLock::new(FxHashMap::default()),
            output: RwLock::new(None),
        }
    }

    fn take_caches(&self) -> BrushCaches {
        BrushCaches {
            base: take(&self.base),
            brushes: take(&self.brushes),
            bounds: take(&self.bounds),
            touching: take(&self.touching),
            routing: take(&self.routing),
            render: take(&self.render),
        }
    }

    fn restore_caches(&self, caches: BrushCaches) {
        *write(&self.base) = caches.base;
        *write(&self.brushes) = caches.brushes;
        *write(&self.bounds) = caches.bounds;
        *write(&self.touching) = caches.touching;
        *write(&self.routing) = caches.routing;
        *write(&self.render) = caches.render;
    }

    /// Builds the tree's geometry for one brush from its snapshot input.
    fn build_geometry(&self, order: u32) -> (u32, Option<BrushInput>, Option<Arc<TreeBrush>>) {
        let Some(node) = self.order.node(order) else {
            return (order, None, None);
        };
        let Some(input) = self.snapshot.inputs.get(&node) else {
            return (order, None, None);
        };
        let brush = match &input.polytope {
            None => {
                warn!(brush = ?node, polytope = ?input.polytope_id, "polytope unavailable, brush skipped");
                None
            }
            Some(polytope) => match TreeBrush::shared(node, polytope, input.local_to_tree) {
                Ok(brush) => Some(brush),
                Err(error) => {
                    trace!(brush = ?node, error = %error, "degenerate brush skipped");
                    None
                }
            },
        };
        (order, Some(input.clone()), brush)
    }

    fn store_geometry(&self, built: Vec<(u32, Option<BrushInput>, Option<Arc<TreeBrush>>)>) {
        let mut base = write(&self.base);
        let mut brushes = write(&self.brushes);
        let mut bounds = write(&self.bounds);
        for (order, input, brush) in built {
            if let Some(input) = input {
                base.set(order, input);
            }
            if let Some(brush) = brush {
                bounds.set(order, padded_bounds(brush.bounds()));
                brushes.set(order, brush);
            }
        }
    }

    /// Consumes the context into the next tree state and the pass report.
    fn finish(self) -> CsgResult<(TreeState, PassResult)> {
        let caches = self.take_caches();
        let output = take(&self.output)
            .ok_or_else(|| CsgError::task_failed("assemble_meshes", "no output produced"))?;
        let dirty = take(&self.dirty);
        let remap = take(&self.remap);

        let mut stale_brushes: Vec<NodeId> = dirty
            .evaluate
            .sorted()
            .into_iter()
            .filter_map(|order| self.order.node(order))
            .collect();
        stale_brushes.extend(remap.removed);

        let passes = self.passes + 1;
        let stats = caches.stats();
        let result = PassResult {
            tree: self.snapshot.tree,
            pass: passes,
            output: output.clone(),
            stale_brushes,
            stats,
        };
        let state = TreeState {
            compact: Some(self.snapshot.compact),
            order: self.order,
            caches,
            output,
            passes,
        };
        Ok((state, result))
    }
}

// =============================================================================
// TASKS
// =============================================================================

const ALL_CACHES: [Resource; 6] = [
    Resource::BaseCache,
    Resource::BrushCache,
    Resource::BoundsCache,
    Resource::TouchingCache,
    Resource::RoutingCache,
    Resource::RenderCache,
];

/// Moves every cache to the current order.
fn remap_caches(ctx: &PassContext) -> CsgResult<()> {
    let plan = OrderRemap::plan(&ctx.previous_order, &ctx.order);
    let mut caches = ctx.take_caches();

    // Touching sets of removed brushes die with the remap
    let mut neighbours = Vec::new();
    for removed in &plan.removed {
        if let Some(set) = caches.touching.get(removed.order) {
            neighbours.extend(set.iter().copied());
        }
    }
    let mut reset: Vec<u32> = caches.remap(&plan).into_iter().collect();
    reset.sort_unstable();
    ctx.restore_caches(caches);

    debug!(
        tree = ?ctx.snapshot.tree,
        brushes = ctx.order.len(),
        added = plan.added.len(),
        removed = plan.removed.len(),
        "remapped caches"
    );
    *write(&ctx.remap) = RemapOutcome {
        removed: plan.removed.iter().map(|entry| entry.node).collect(),
        neighbours,
        reset,
    };
    Ok(())
}

/// Finds direct brushes and the indirect brushes known before geometry changes.
fn find_direct(ctx: &PassContext) -> CsgResult<()> {
    let remap = read(&ctx.remap);
    let mut base = write(&ctx.base);
    let mut brushes = write(&ctx.brushes);
    let mut bounds = write(&ctx.bounds);
    let mut touching = write(&ctx.touching);
    let mut routing = write(&ctx.routing);
    let mut render = write(&ctx.render);
    let mut dirty = write(&ctx.dirty);

    let snapshot = &ctx.snapshot;
    for entry in ctx.order.iter() {
        let changed = snapshot.force_full
            || snapshot.flagged.contains(&entry.node)
            || match (snapshot.inputs.get(&entry.node), base.get(entry.order)) {
                (Some(input), Some(cached)) => !input.same_source(cached),
                (None, None) => false,
                _ => true,
            };
        if changed {
            dirty.mark_direct(entry.order);
        }
    }
    for &order in &remap.reset {
        dirty.mark_direct(order);
    }

    let direct: Vec<u32> = dirty.direct.sorted();
    let mut neighbours = remap.neighbours.clone();
    for &order in &direct {
        if let Some(set) = touching.get(order) {
            neighbours.extend(set.iter().copied());
        }
    }
    for node in neighbours {
        if let Some(order) = ctx.order.order_of(node) {
            dirty.mark_indirect(order);
        }
    }

    for order in dirty.dirty_sorted() {
        base.invalidate(order);
        brushes.invalidate(order);
        bounds.invalidate(order);
        touching.invalidate(order);
        routing.invalidate(order);
        render.invalidate(order);
    }

    debug!(
        tree = ?snapshot.tree,
        direct = dirty.direct.len(),
        indirect = dirty.indirect.len(),
        "found direct brushes"
    );
    Ok(())
}

/// Rebuilds tree-space geometry of direct brushes.
fn geometry_direct(ctx: &PassContext) -> CsgResult<()> {
    let direct = read(&ctx.dirty).direct.sorted();
    let built: Vec<_> = direct
        .par_iter()
        .map(|&order| ctx.build_geometry(order))
        .collect();
    ctx.store_geometry(built);
    Ok(())
}

/// Tests direct brushes against every brush; new partners become indirect.
fn broad_phase_direct(ctx: &PassContext) -> CsgResult<()> {
    let direct = read(&ctx.dirty).direct.sorted();
    let pairs = find_pairs(&direct, &read(&ctx.bounds));

    let mut dirty = write(&ctx.dirty);
    for &(a, b) in &pairs {
        dirty.mark_indirect(a);
        dirty.mark_indirect(b);
    }
    debug!(
        tree = ?ctx.snapshot.tree,
        pairs = pairs.len(),
        indirect = dirty.indirect.len(),
        "direct broad phase"
    );
    *write(&ctx.pairs) = pairs;
    Ok(())
}

/// Drops every cache of indirect brushes and rebuilds their geometry.
fn geometry_indirect(ctx: &PassContext) -> CsgResult<()> {
    let indirect = read(&ctx.dirty).indirect.sorted();
    {
        let mut base = write(&ctx.base);
        let mut brushes = write(&ctx.brushes);
        let mut bounds = write(&ctx.bounds);
        let mut touching = write(&ctx.touching);
        let mut routing = write(&ctx.routing);
        let mut render = write(&ctx.render);
        for &order in &indirect {
            base.invalidate(order);
            brushes.invalidate(order);
            bounds.invalidate(order);
            touching.invalidate(order);
            routing.invalidate(order);
            render.invalidate(order);
        }
    }
    let built: Vec<_> = indirect
        .par_iter()
        .map(|&order| ctx.build_geometry(order))
        .collect();
    ctx.store_geometry(built);
    Ok(())
}

/// Tests indirect brushes against every brush.
fn broad_phase_indirect(ctx: &PassContext) -> CsgResult<()> {
    let indirect = read(&ctx.dirty).indirect.sorted();
    if indirect.is_empty() {
        return Ok(());
    }
    let extra = find_pairs(&indirect, &read(&ctx.bounds));
    let mut pairs = write(&ctx.pairs);
    pairs.extend(extra);
    pairs.sort_unstable();
    pairs.dedup();
    Ok(())
}

/// Clips every overlapping pair; keeps the pairs that touch.
fn intersection_loops(ctx: &PassContext) -> CsgResult<()> {
    let pairs = read(&ctx.pairs);
    let brushes_guard = read(&ctx.brushes);
    let brushes: &OrderedCache<Arc<TreeBrush>> = &brushes_guard;
    let found: FxHashMap<BrushPair, Arc<BrushIntersection>> = pairs
        .par_iter()
        .filter_map(|&(a, b)| {
            let result = intersect(brushes.get(a)?, brushes.get(b)?);
            result.kind.touches().then(|| ((a, b), Arc::new(result)))
        })
        .collect();
    debug!(
        tree = ?ctx.snapshot.tree,
        pairs = pairs.len(),
        touching = found.len(),
        "intersection loops"
    );
    *write(&ctx.intersections) = found;
    Ok(())
}

/// Records the touching set of every dirty brush.
fn touching_sets(ctx: &PassContext) -> CsgResult<()> {
    let dirty = read(&ctx.dirty);
    let intersections = read(&ctx.intersections);

    let mut partners: FxHashMap<u32, Vec<u32>> = FxHashMap::default();
    for &(a, b) in intersections.keys() {
        if dirty.is_dirty(a) {
            partners.entry(a).or_default().push(b);
        }
        if dirty.is_dirty(b) {
            partners.entry(b).or_default().push(a);
        }
    }

    let mut touching = write(&ctx.touching);
    for order in dirty.dirty_sorted() {
        let mut orders = partners.remove(&order).unwrap_or_default();
        orders.sort_unstable();
        let set: TouchingSet = orders
            .into_iter()
            .filter_map(|o| ctx.order.node(o))
            .collect();
        touching.set(order, set);
    }
    Ok(())
}

/// Compiles routing tables; a changed table schedules re-evaluation.
///
/// After a topology change every brush is recompiled and compared, since
/// its position in the tree may have changed even when its geometry did not.
fn routing_tables(ctx: &PassContext) -> CsgResult<()> {
    let candidates: Vec<u32> = if ctx.snapshot.topology_changed {
        (0..ctx.order.len() as u32).collect()
    } else {
        read(&ctx.dirty).dirty_sorted()
    };

    let built: Vec<(u32, Option<RoutingTable>)> = {
        let touching = read(&ctx.touching);
        candidates
            .par_iter()
            .map(|&order| {
                let set: &[NodeId] = touching.get(order).map(|set| &set[..]).unwrap_or_default();
                (
                    order,
                    RoutingTable::build(&ctx.snapshot.compact, &ctx.order, order, set),
                )
            })
            .collect()
    };

    let mut routing = write(&ctx.routing);
    let mut dirty = write(&ctx.dirty);
    let mut changed = 0usize;
    for (order, table) in built {
        match table {
            Some(table) => {
                if routing.get(order).map_or(true, |cached| **cached != table) {
                    routing.set(order, Arc::new(table));
                    dirty.evaluate.insert(order);
                    changed += 1;
                }
            }
            None => {
                routing.invalidate(order);
            }
        }
    }
    debug!(tree = ?ctx.snapshot.tree, changed, "routing tables");
    Ok(())
}

/// Evaluates every brush in the evaluate set.
fn evaluate_brushes(ctx: &PassContext) -> CsgResult<()> {
    let targets = read(&ctx.dirty).evaluate.sorted();
    let brushes_guard = read(&ctx.brushes);
    let routing_guard = read(&ctx.routing);
    let intersections_guard = read(&ctx.intersections);
    let brushes: &OrderedCache<Arc<TreeBrush>> = &brushes_guard;
    let routing: &OrderedCache<Arc<RoutingTable>> = &routing_guard;
    let intersections: &FxHashMap<BrushPair, Arc<BrushIntersection>> = &intersections_guard;

    let renders: Vec<(u32, Option<BrushRender>)> = targets
        .par_iter()
        .map(|&order| {
            let (Some(brush), Some(table)) = (brushes.get(order), routing.get(order)) else {
                return (order, None);
            };

            // Pairs not clipped this pass are clipped locally
            let mut partners = Vec::with_capacity(table.inputs().len());
            let mut local = Vec::with_capacity(table.inputs().len());
            for input in table.inputs() {
                let other_order = ctx.order.order_of(input.brush);
                let other = other_order.and_then(|o| brushes.get(o));
                let cached = other_order.and_then(|o| intersections.get(&canonical(order, o)));
                local.push(match (cached, other) {
                    (None, Some(other)) => Some(intersect(brush, other)),
                    _ => None,
                });
                partners.push((other, cached));
            }
            let inputs: Vec<RoutingBrush<'_>> = partners
                .iter()
                .zip(&local)
                .map(|(&(other, cached), local)| RoutingBrush {
                    brush: other.map(|b| &**b),
                    intersection: cached.map(|c| &**c).or(local.as_ref()),
                })
                .collect();

            (order, Some(evaluate_brush(brush, table, &inputs)))
        })
        .collect();

    drop(intersections_guard);
    drop(routing_guard);
    drop(brushes_guard);

    let mut render = write(&ctx.render);
    let mut surfaces = 0usize;
    for (order, result) in renders {
        match result {
            Some(result) => {
                surfaces += result.surfaces.len();
                render.set(order, Arc::new(result));
            }
            None => {
                render.invalidate(order);
            }
        }
    }
    debug!(
        tree = ?ctx.snapshot.tree,
        evaluated = targets.len(),
        surfaces,
        "evaluated brushes"
    );
    Ok(())
}

/// Assembles query meshes, or reuses the previous output when nothing changed.
fn assemble_meshes(ctx: &PassContext) -> CsgResult<()> {
    let changed = ctx.passes == 0
        || ctx.snapshot.topology_changed
        || ctx.snapshot.reassemble
        || !read(&ctx.dirty).evaluate.is_empty()
        || !read(&ctx.remap).removed.is_empty();

    let output = if changed {
        Arc::new(assemble(
            Some(ctx.snapshot.tree),
            &read(&ctx.render),
            &ctx.snapshot.queries,
        ))
    } else {
        ctx.previous_output.clone()
    };
    *write(&ctx.output) = Some(output);
    Ok(())
}

// =============================================================================
// PASS
// =============================================================================

fn build_graph() -> TaskGraph<'static, PassContext> {
    use crate::scheduler::Resource as R;

    let mut graph = TaskGraph::new();
    graph.add(
        "remap_caches",
        &[R::Order],
        &[
            R::BaseCache,
            R::BrushCache,
            R::BoundsCache,
            R::TouchingCache,
            R::RoutingCache,
            R::RenderCache,
            R::DirtySets,
        ],
        remap_caches,
    );
    graph.add(
        "find_direct",
        &[R::Order],
        &[
            R::BaseCache,
            R::BrushCache,
            R::BoundsCache,
            R::TouchingCache,
            R::RoutingCache,
            R::RenderCache,
            R::DirtySets,
        ],
        find_direct,
    );
    graph.add(
        "geometry_direct",
        &[R::Order, R::DirtySets],
        &[R::BaseCache, R::BrushCache, R::BoundsCache],
        geometry_direct,
    );
    graph.add(
        "broad_phase_direct",
        &[R::BoundsCache],
        &[R::DirtySets, R::Pairs],
        broad_phase_direct,
    );
    graph.add(
        "geometry_indirect",
        &[R::Order, R::DirtySets],
        &ALL_CACHES,
        geometry_indirect,
    );
    graph.add(
        "broad_phase_indirect",
        &[R::BoundsCache, R::DirtySets],
        &[R::Pairs],
        broad_phase_indirect,
    );
    graph.add(
        "intersection_loops",
        &[R::Pairs, R::BrushCache],
        &[R::Intersections],
        intersection_loops,
    );
    graph.add(
        "touching_sets",
        &[R::Order, R::DirtySets, R::Intersections],
        &[R::TouchingCache],
        touching_sets,
    );
    graph.add(
        "routing_tables",
        &[R::CompactTree, R::Order, R::TouchingCache],
        &[R::RoutingCache, R::DirtySets],
        routing_tables,
    );
    graph.add(
        "evaluate_brushes",
        &[
            R::Order,
            R::DirtySets,
            R::BrushCache,
            R::RoutingCache,
            R::Intersections,
        ],
        &[R::RenderCache],
        evaluate_brushes,
    );
    graph.add(
        "assemble_meshes",
        &[R::DirtySets, R::RenderCache],
        &[R::Output],
        assemble_meshes,
    );
    graph
}

/// Runs one pass over a tree.
///
/// Returns the next state and the pass report. A failed task drops the
/// state, so the next pass over the tree starts from scratch.
pub(crate) fn run_pass(
    state: Option<TreeState>,
    snapshot: TreeSnapshot,
) -> (Option<TreeState>, Option<PassResult>) {
    let tree = snapshot.tree;
    let context = PassContext::new(state.unwrap_or_default(), snapshot);
    let report = build_graph().run(&context);
    if !report.is_success() {
        warn!(
            tree = ?tree,
            failed = ?report.failed().collect::<Vec<_>>(),
            "pass failed, tree state dropped"
        );
        return (None, None);
    }

    match context.finish() {
        Ok((state, result)) => {
            debug!(
                tree = ?tree,
                pass = result.pass,
                stale = result.stale_brushes.len(),
                "pass finished"
            );
            (Some(state), Some(result))
        }
        Err(error) => {
            warn!(tree = ?tree, error = %error, "pass incomplete, tree state dropped");
            (None, None)
        }
    }
}
