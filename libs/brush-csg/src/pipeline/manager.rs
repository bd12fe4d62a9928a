//! # CSG Manager
//!
//! Schedules update passes for every tree of a hierarchy and collects
//! their results.
//!
//! ## Example
//!
//! ```rust
//! use brush_csg::hierarchy::{CsgHierarchy, Operation};
//! use brush_csg::pipeline::CsgManager;
//! use brush_csg::polytope::{BrushGenerator, PolytopeStore};
//! use glam::{DMat4, DVec3};
//!
//! let mut store = PolytopeStore::new();
//! let cube = store.insert(BrushGenerator::Box { size: DVec3::ONE }.generate().unwrap());
//!
//! let mut hierarchy = CsgHierarchy::new();
//! let tree = hierarchy.create_tree();
//! let brush = hierarchy.create_brush(cube, DMat4::IDENTITY, Operation::Additive);
//! hierarchy.append_child(tree, brush).unwrap();
//!
//! let mut manager = CsgManager::default();
//! let results = manager.update(&mut hierarchy, &store);
//! assert_eq!(results.len(), 1);
//! assert_eq!(manager.output(tree).unwrap().meshes[0].vertex_count(), 24);
//! ```

use std::cmp::Reverse;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, warn};

use super::pass::run_pass;
use super::{PassResult, TreeSnapshot, TreeState};
use crate::assembly::{MeshQuery, TreeOutput};
use crate::cache::CacheStats;
use crate::hierarchy::{CsgHierarchy, NodeId};
use crate::polytope::PolytopeSource;

/// Completion message of one pass.
struct PassMessage {
    tree: NodeId,
    state: Option<TreeState>,
    result: Option<PassResult>,
}

/// Per-tree bookkeeping kept by the manager.
#[derive(Debug, Default)]
struct TreeSlot {
    state: Option<TreeState>,
    output: Arc<TreeOutput>,
    force_full: bool,
    queries_revision: u64,
}

type FinishCallback = Box<dyn FnMut(&PassResult) + Send>;

/// Front door of the update pipeline.
///
/// Owns the cached state of every tree between passes. Each tree has at
/// most one pass in flight; its state is moved into the pass and returned
/// through a channel when the pass completes.
pub struct CsgManager {
    queries: Arc<[MeshQuery]>,
    queries_revision: u64,
    slots: FxHashMap<NodeId, TreeSlot>,
    in_flight: FxHashSet<NodeId>,
    sender: Sender<PassMessage>,
    receiver: Receiver<PassMessage>,
    callbacks: Vec<FinishCallback>,
}

impl Default for CsgManager {
    /// A manager answering a render query and a collision query.
    fn default() -> Self {
        Self::new(vec![MeshQuery::render(), MeshQuery::collision()])
    }
}

impl CsgManager {
    /// Creates a manager for the given queries.
    pub fn new(queries: Vec<MeshQuery>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            queries: queries.into(),
            queries_revision: 0,
            slots: FxHashMap::default(),
            in_flight: FxHashSet::default(),
            sender,
            receiver,
            callbacks: Vec::new(),
        }
    }

    /// Current queries.
    pub fn queries(&self) -> &[MeshQuery] {
        &self.queries
    }

    /// Replaces the queries; every tree is reassembled on its next pass.
    pub fn set_queries(&mut self, queries: Vec<MeshQuery>) {
        self.queries = queries.into();
        self.queries_revision += 1;
    }

    /// Registers a callback run once per completed pass.
    pub fn on_finish(&mut self, callback: impl FnMut(&PassResult) + Send + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    /// Rebuilds every tree from scratch on the next update.
    pub fn force_full_rebuild(&mut self) {
        for slot in self.slots.values_mut() {
            slot.force_full = true;
        }
    }

    /// Schedules and waits for every pass the hierarchy needs.
    pub fn update(
        &mut self,
        hierarchy: &mut CsgHierarchy,
        source: &dyn PolytopeSource,
    ) -> Vec<PassResult> {
        self.schedule_update(hierarchy, source);
        self.wait()
    }

    /// Starts a pass for every changed tree without waiting.
    ///
    /// Trees are captured on the calling thread and their flags cleared.
    /// Trees with a pass in flight are deferred. Passes are spawned
    /// largest-first. Returns the number of passes started.
    pub fn schedule_update(
        &mut self,
        hierarchy: &mut CsgHierarchy,
        source: &dyn PolytopeSource,
    ) -> usize {
        let in_flight = &self.in_flight;
        self.slots
            .retain(|tree, _| hierarchy.contains(*tree) || in_flight.contains(tree));

        let trees: Vec<NodeId> = hierarchy.trees().collect();
        let mut scheduled = Vec::new();
        for tree in trees {
            if self.in_flight.contains(&tree) {
                debug!(tree = ?tree, "pass in flight, tree deferred");
                continue;
            }
            let slot = self.slots.entry(tree).or_default();
            let reassemble = slot.queries_revision != self.queries_revision;
            let snapshot = match TreeSnapshot::capture(
                hierarchy,
                tree,
                slot.state.as_ref(),
                source,
                slot.force_full,
                reassemble,
                self.queries.clone(),
            ) {
                Ok(snapshot) => snapshot,
                Err(error) => {
                    warn!(tree = ?tree, error = %error, "tree skipped");
                    continue;
                }
            };
            hierarchy.clear_dirty(tree);
            if slot
                .state
                .as_ref()
                .is_some_and(|state| snapshot.is_unchanged(state))
            {
                continue;
            }
            slot.force_full = false;
            slot.queries_revision = self.queries_revision;
            scheduled.push((snapshot, slot.state.take()));
        }

        scheduled.sort_by_key(|(snapshot, _)| Reverse(snapshot.compact.brush_count()));
        let count = scheduled.len();
        for (snapshot, state) in scheduled {
            let tree = snapshot.tree;
            self.in_flight.insert(tree);
            let sender = self.sender.clone();
            rayon::spawn(move || {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| run_pass(state, snapshot)));
                let message = match outcome {
                    Ok((state, result)) => PassMessage {
                        tree,
                        state,
                        result,
                    },
                    Err(_) => {
                        warn!(tree = ?tree, "pass panicked, tree state dropped");
                        PassMessage {
                            tree,
                            state: None,
                            result: None,
                        }
                    }
                };
                // The manager may be gone; nothing left to report to
                let _ = sender.send(message);
            });
        }
        count
    }

    /// Collects finished passes without blocking.
    pub fn poll(&mut self) -> Vec<PassResult> {
        let mut results = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            results.extend(self.complete(message));
        }
        results
    }

    /// Blocks until every in-flight pass has finished.
    pub fn wait(&mut self) -> Vec<PassResult> {
        let mut results = Vec::new();
        while !self.in_flight.is_empty() {
            match self.receiver.recv() {
                Ok(message) => results.extend(self.complete(message)),
                Err(_) => break,
            }
        }
        results
    }

    /// True when any pass is in flight.
    pub fn is_busy(&self) -> bool {
        !self.in_flight.is_empty()
    }

    /// Last completed output of a tree.
    pub fn output(&self, tree: NodeId) -> Option<Arc<TreeOutput>> {
        self.slots.get(&tree).map(|slot| slot.output.clone())
    }

    /// Cache write counters of a tree that is not in flight.
    pub fn cache_stats(&self, tree: NodeId) -> Option<CacheStats> {
        let state = self.slots.get(&tree)?.state.as_ref()?;
        Some(state.caches.stats())
    }

    /// Render cache revision of a brush, for change tracking.
    pub fn render_revision(&self, tree: NodeId, brush: NodeId) -> Option<u64> {
        self.slots.get(&tree)?.state.as_ref()?.render_revision(brush)
    }

    fn complete(&mut self, message: PassMessage) -> Option<PassResult> {
        self.in_flight.remove(&message.tree);
        let slot = self.slots.entry(message.tree).or_default();
        slot.state = message.state;
        let result = message.result?;
        slot.output = result.output.clone();
        for callback in &mut self.callbacks {
            callback(&result);
        }
        Some(result)
    }
}
