mod common;

use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use brush_csg::{BrushGenerator, MeshQuery, Operation};
use common::{fingerprint, volume, Scene};
use glam::{DMat4, DVec3};

/// Overlapping brushes of every operation.
fn build_mixed(scene: &mut Scene, moved_offset: DVec3) -> Vec<brush_csg::NodeId> {
    vec![
        scene.add_cube(2.0, DVec3::ZERO, Operation::Additive),
        scene.add_cube(1.0, DVec3::new(1.0, 0.0, 0.0), Operation::Additive),
        scene.add_cube(1.0, moved_offset, Operation::Subtractive),
        scene.add_cube(3.0, DVec3::new(0.25, 0.25, 0.25), Operation::Intersecting),
        scene.add_cube(1.0, DVec3::new(6.0, 0.0, 0.0), Operation::Additive),
    ]
}

#[test]
fn repeated_builds_are_identical() {
    let mut first = Scene::new();
    let mut second = Scene::new();
    build_mixed(&mut first, DVec3::new(-1.0, 0.5, 0.0));
    build_mixed(&mut second, DVec3::new(-1.0, 0.5, 0.0));
    first.update();
    second.update();
    assert_eq!(*first.output(), *second.output());
}

#[test]
fn incremental_matches_fresh_build() {
    let target = DVec3::new(0.75, -0.5, 0.25);

    let mut incremental = Scene::new();
    let brushes = build_mixed(&mut incremental, DVec3::new(-1.0, 0.5, 0.0));
    incremental.update();
    incremental
        .hierarchy
        .set_transform(brushes[2], DMat4::from_translation(target))
        .unwrap();
    let results = incremental.update();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].pass, 2);

    let mut fresh = Scene::new();
    build_mixed(&mut fresh, target);
    fresh.update();

    assert_eq!(fingerprint(&incremental.output()), fingerprint(&fresh.output()));
    assert_relative_eq!(
        volume(&incremental.output()),
        volume(&fresh.output()),
        epsilon = 1e-5
    );
}

#[test]
fn unchanged_update_runs_no_pass() {
    let mut scene = Scene::new();
    build_mixed(&mut scene, DVec3::new(-1.0, 0.5, 0.0));
    scene.update();
    let before = scene.output();
    let stats = scene.manager.cache_stats(scene.tree).unwrap();

    assert!(scene.update().is_empty());
    assert!(Arc::ptr_eq(&before, &scene.output()));
    assert_eq!(scene.manager.cache_stats(scene.tree), Some(stats));
}

#[test]
fn added_brush_only_writes_its_own_caches() {
    let mut scene = Scene::new();
    let a = scene.add_cube(1.0, DVec3::ZERO, Operation::Additive);
    let b = scene.add_cube(1.0, DVec3::new(0.5, 0.0, 0.0), Operation::Additive);
    scene.update();
    let before = scene.manager.cache_stats(scene.tree).unwrap();
    let revision_a = scene.manager.render_revision(scene.tree, a);
    let revision_b = scene.manager.render_revision(scene.tree, b);

    let c = scene.add_cube(1.0, DVec3::new(10.0, 0.0, 0.0), Operation::Additive);
    let results = scene.update();
    let after = scene.manager.cache_stats(scene.tree).unwrap();

    assert_eq!(results[0].stale_brushes, vec![c]);
    assert_eq!(after.brushes, 3);
    assert_eq!(after.render_writes, before.render_writes + 1);
    assert_eq!(after.brush_writes, before.brush_writes + 1);
    assert_eq!(scene.manager.render_revision(scene.tree, a), revision_a);
    assert_eq!(scene.manager.render_revision(scene.tree, b), revision_b);
}

#[test]
fn polytope_replacement_triggers_reevaluation() {
    let mut scene = Scene::new();
    let cube = scene.cube(1.0);
    let brush = scene.add(cube, DVec3::ZERO, Operation::Additive);
    scene.update();
    assert_relative_eq!(volume(&scene.output()), 1.0, epsilon = 1e-5);

    scene
        .store
        .replace(
            cube,
            BrushGenerator::Box {
                size: DVec3::splat(2.0),
            }
            .generate()
            .unwrap(),
        )
        .unwrap();
    let results = scene.update();
    assert_eq!(results[0].stale_brushes, vec![brush]);
    assert_relative_eq!(volume(&scene.output()), 8.0, epsilon = 1e-5);
}

#[test]
fn destroyed_brush_is_removed() {
    let mut scene = Scene::new();
    let solid = scene.add_cube(1.0, DVec3::ZERO, Operation::Additive);
    let hole = scene.add_cube(1.0, DVec3::new(0.5, 0.5, 0.0), Operation::Subtractive);
    scene.update();
    assert_relative_eq!(volume(&scene.output()), 0.75, epsilon = 1e-5);

    scene.hierarchy.destroy(hole).unwrap();
    let results = scene.update();
    let stale = &results[0].stale_brushes;
    assert!(stale.contains(&solid));
    assert!(stale.contains(&hole));

    let output = scene.output();
    assert_eq!(output.vertex_count(), 24);
    assert_relative_eq!(volume(&output), 1.0, epsilon = 1e-5);
}

#[test]
fn operation_change_reroutes() {
    let mut scene = Scene::new();
    scene.add_cube(1.0, DVec3::ZERO, Operation::Additive);
    let second = scene.add_cube(1.0, DVec3::new(0.5, 0.0, 0.0), Operation::Additive);
    scene.update();
    assert_relative_eq!(volume(&scene.output()), 1.5, epsilon = 1e-5);

    scene
        .hierarchy
        .set_operation(second, Operation::Subtractive)
        .unwrap();
    scene.update();
    assert_relative_eq!(volume(&scene.output()), 0.5, epsilon = 1e-5);
}

#[test]
fn destroyed_tree_drops_output() {
    let mut scene = Scene::new();
    scene.add_cube(1.0, DVec3::ZERO, Operation::Additive);
    scene.update();
    assert!(scene.manager.output(scene.tree).is_some());

    scene.hierarchy.destroy(scene.tree).unwrap();
    assert!(scene.update().is_empty());
    assert!(scene.manager.output(scene.tree).is_none());
}

#[test]
fn query_change_reassembles() {
    let mut scene = Scene::new();
    scene.add_cube(1.0, DVec3::ZERO, Operation::Additive);
    scene.update();
    assert_eq!(scene.output().meshes.len(), 1);

    scene
        .manager
        .set_queries(vec![MeshQuery::render(), MeshQuery::collision()]);
    let results = scene.update();
    assert_eq!(results.len(), 1);
    assert!(results[0].stale_brushes.is_empty());
    assert_eq!(scene.output().meshes.len(), 2);
}

#[test]
fn force_full_rebuild_reevaluates_everything() {
    let mut scene = Scene::new();
    let brushes = build_mixed(&mut scene, DVec3::new(-1.0, 0.5, 0.0));
    scene.update();
    let before = fingerprint(&scene.output());

    scene.manager.force_full_rebuild();
    let results = scene.update();
    assert_eq!(results[0].stale_brushes.len(), brushes.len());
    assert_eq!(fingerprint(&scene.output()), before);
}

#[test]
fn finish_callback_sees_every_pass() {
    let mut scene = Scene::new();
    scene.add_cube(1.0, DVec3::ZERO, Operation::Additive);
    let passes = Arc::new(Mutex::new(Vec::new()));
    let seen = passes.clone();
    scene
        .manager
        .on_finish(move |result| seen.lock().unwrap().push(result.pass));

    scene.update();
    scene.update();
    scene.manager.force_full_rebuild();
    scene.update();
    assert_eq!(*passes.lock().unwrap(), vec![1, 2]);
}

#[test]
fn independent_trees_update_together() {
    let mut scene = Scene::new();
    scene.add_cube(1.0, DVec3::ZERO, Operation::Additive);
    let other = scene.hierarchy.create_tree();
    let cube = scene.cube(2.0);
    let brush = scene
        .hierarchy
        .create_brush(cube, DMat4::IDENTITY, Operation::Additive);
    scene.hierarchy.append_child(other, brush).unwrap();

    let results = scene.update();
    assert_eq!(results.len(), 2);
    assert_relative_eq!(volume(&scene.output()), 1.0, epsilon = 1e-5);
    let other_output = scene.manager.output(other).unwrap();
    assert_relative_eq!(volume(&other_output), 8.0, epsilon = 1e-5);
}
