//! # Pipeline Tests
//!
//! Snapshot capture and single passes, driven without the manager.

use super::pass::run_pass;
use super::*;
use crate::hierarchy::Operation;
use crate::polytope::{BrushGenerator, PolytopeStore};
use glam::DVec3;

struct Fixture {
    hierarchy: CsgHierarchy,
    store: PolytopeStore,
    tree: NodeId,
    cube: PolytopeId,
    queries: Arc<[MeshQuery]>,
}

impl Fixture {
    fn new() -> Self {
        let mut store = PolytopeStore::new();
        let cube = store.insert(
            BrushGenerator::Box { size: DVec3::ONE }
                .generate()
                .unwrap(),
        );
        let mut hierarchy = CsgHierarchy::new();
        let tree = hierarchy.create_tree();
        Self {
            hierarchy,
            store,
            tree,
            cube,
            queries: vec![MeshQuery::render()].into(),
        }
    }

    fn add(&mut self, offset: DVec3) -> NodeId {
        let brush = self.hierarchy.create_brush(
            self.cube,
            DMat4::from_translation(offset),
            Operation::Additive,
        );
        self.hierarchy.append_child(self.tree, brush).unwrap();
        brush
    }

    fn capture(&self, state: Option<&TreeState>) -> TreeSnapshot {
        TreeSnapshot::capture(
            &self.hierarchy,
            self.tree,
            state,
            &self.store,
            false,
            false,
            self.queries.clone(),
        )
        .unwrap()
    }

    /// Captures, clears flags and runs one pass.
    fn pass(&mut self, state: Option<TreeState>) -> (TreeState, PassResult) {
        let snapshot = self.capture(state.as_ref());
        self.hierarchy.clear_dirty(self.tree);
        let (state, result) = run_pass(state, snapshot);
        (state.unwrap(), result.unwrap())
    }
}

#[test]
fn test_first_capture_builds_topology() {
    let mut f = Fixture::new();
    let a = f.add(DVec3::ZERO);
    let snapshot = f.capture(None);

    assert!(snapshot.topology_changed);
    assert_eq!(snapshot.compact.brush_count(), 1);
    assert!(snapshot.flagged.contains(&a));
    let input = &snapshot.inputs[&a];
    assert_eq!(input.polytope_id, f.cube);
    assert_eq!(input.generation, Some(1));
    assert!(input.polytope.is_some());
}

#[test]
fn test_unchanged_after_pass() {
    let mut f = Fixture::new();
    f.add(DVec3::ZERO);
    let (state, result) = f.pass(None);
    assert_eq!(result.pass, 1);

    let snapshot = f.capture(Some(&state));
    assert!(!snapshot.topology_changed);
    assert!(snapshot.flagged.is_empty());
    assert!(snapshot.is_unchanged(&state));
}

#[test]
fn test_transform_change_is_detected() {
    let mut f = Fixture::new();
    let a = f.add(DVec3::ZERO);
    let (state, _) = f.pass(None);

    f.hierarchy
        .set_transform(a, DMat4::from_translation(DVec3::X))
        .unwrap();
    let snapshot = f.capture(Some(&state));
    assert!(!snapshot.topology_changed);
    assert!(snapshot.flagged.contains(&a));
    assert!(!snapshot.is_unchanged(&state));
}

#[test]
fn test_polytope_generation_is_detected_without_flags() {
    let mut f = Fixture::new();
    f.add(DVec3::ZERO);
    let (state, _) = f.pass(None);

    let bigger = BrushGenerator::Box {
        size: DVec3::splat(2.0),
    }
    .generate()
    .unwrap();
    f.store.replace(f.cube, bigger).unwrap();

    let snapshot = f.capture(Some(&state));
    assert!(snapshot.flagged.is_empty());
    assert!(!snapshot.is_unchanged(&state));
}

#[test]
fn test_same_source_compares_generation() {
    let mut f = Fixture::new();
    let a = f.add(DVec3::ZERO);
    let input = f.capture(None).inputs[&a].clone();

    let mut newer = input.clone();
    newer.generation = Some(2);
    assert!(input.same_source(&input.clone()));
    assert!(!input.same_source(&newer));

    let mut moved = input.clone();
    moved.local_to_tree = DMat4::from_translation(DVec3::Y);
    assert!(!input.same_source(&moved));
}

#[test]
fn test_moving_one_brush_only_rebuilds_it() {
    let mut f = Fixture::new();
    let a = f.add(DVec3::ZERO);
    let b = f.add(DVec3::new(5.0, 0.0, 0.0));
    let (state, first) = f.pass(None);
    assert_eq!(first.stale_brushes.len(), 2);
    assert_eq!(first.stats.render_writes, 2);
    let revision_a = state.render_revision(a);

    f.hierarchy
        .set_transform(b, DMat4::from_translation(DVec3::new(6.0, 0.0, 0.0)))
        .unwrap();
    let (state, second) = f.pass(Some(state));

    assert_eq!(second.pass, 2);
    assert_eq!(second.stale_brushes, vec![b]);
    assert_eq!(second.stats.render_writes, 3);
    assert_eq!(state.render_revision(a), revision_a);
}

#[test]
fn test_missing_polytope_yields_no_geometry() {
    let mut f = Fixture::new();
    f.add(DVec3::ZERO);
    f.store.remove(f.cube);

    let (_, result) = f.pass(None);
    assert_eq!(result.output.vertex_count(), 0);
    assert_eq!(result.stats.render_writes, 0);
}

#[test]
fn test_empty_tree_passes() {
    let mut f = Fixture::new();
    let (state, result) = f.pass(None);
    assert_eq!(result.output.tree, Some(f.tree));
    assert!(result.output.meshes.is_empty());
    assert_eq!(state.passes, 1);
}
