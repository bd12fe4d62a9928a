//! # Evaluation Tests
//!
//! Small scenes evaluated end to end without the pass machinery.

use super::*;
use crate::compact::CompactTree;
use crate::hierarchy::{CsgHierarchy, Operation};
use crate::intersection::intersect;
use crate::order::BrushOrder;
use crate::polytope::{BrushGenerator, PolytopeId};
use approx::assert_relative_eq;
use glam::{DMat4, DVec3, Vec3};

// =============================================================================
// HELPERS
// =============================================================================

struct BrushSpec {
    size: f64,
    offset: DVec3,
    operation: Operation,
}

fn spec(size: f64, offset: DVec3, operation: Operation) -> BrushSpec {
    BrushSpec {
        size,
        offset,
        operation,
    }
}

/// Evaluates every brush of a flat tree, returning renders in order.
fn evaluate_scene(specs: &[BrushSpec]) -> Vec<BrushRender> {
    let mut hierarchy = CsgHierarchy::new();
    let tree = hierarchy.create_tree();
    let mut brushes = Vec::new();
    for spec in specs {
        let transform = DMat4::from_translation(spec.offset);
        let id = hierarchy.create_brush(PolytopeId(0), transform, spec.operation);
        hierarchy.append_child(tree, id).unwrap();
        let polytope = BrushGenerator::Box {
            size: DVec3::splat(spec.size),
        }
        .generate()
        .unwrap();
        brushes.push(TreeBrush::new(id, &polytope, transform).unwrap());
    }

    let compact = CompactTree::build(&hierarchy, tree).unwrap();
    let order = BrushOrder::from_compact(&compact);

    let mut intersections = Vec::new();
    for i in 0..brushes.len() {
        for j in (i + 1)..brushes.len() {
            let result = intersect(&brushes[i], &brushes[j]);
            if result.kind.touches() {
                intersections.push(result);
            }
        }
    }

    brushes
        .iter()
        .map(|brush| {
            let touching: Vec<NodeId> = intersections
                .iter()
                .filter_map(|i| {
                    if i.brush_a == brush.node() {
                        Some(i.brush_b)
                    } else if i.brush_b == brush.node() {
                        Some(i.brush_a)
                    } else {
                        None
                    }
                })
                .collect();
            let own = order.order_of(brush.node()).unwrap();
            let table = RoutingTable::build(&compact, &order, own, &touching).unwrap();
            let inputs: Vec<RoutingBrush<'_>> = table
                .inputs()
                .iter()
                .map(|input| RoutingBrush {
                    brush: brushes.iter().find(|b| b.node() == input.brush),
                    intersection: intersections.iter().find(|i| {
                        (i.brush_a == brush.node() && i.brush_b == input.brush)
                            || (i.brush_b == brush.node() && i.brush_a == input.brush)
                    }),
                })
                .collect();
            evaluate_brush(brush, &table, &inputs)
        })
        .collect()
}

fn surfaces(renders: &[BrushRender]) -> Vec<&RenderSurface> {
    renders.iter().flat_map(|r| r.surfaces.iter()).collect()
}

/// Signed volume enclosed by every triangle.
fn volume(renders: &[BrushRender]) -> f64 {
    let mut total = 0.0;
    for surface in surfaces(renders) {
        for tri in surface.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| {
                Vec3::from_array(surface.positions[tri[k] as usize]).as_dvec3()
            });
            total += a.dot(b.cross(c)) / 6.0;
        }
    }
    total
}

fn area(renders: &[BrushRender]) -> f64 {
    let mut total = 0.0;
    for surface in surfaces(renders) {
        for tri in surface.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| {
                Vec3::from_array(surface.positions[tri[k] as usize]).as_dvec3()
            });
            total += 0.5 * (b - a).cross(c - a).length();
        }
    }
    total
}

// =============================================================================
// SCENES
// =============================================================================

#[test]
fn test_single_brush_keeps_all_faces() {
    let renders = evaluate_scene(&[spec(1.0, DVec3::ZERO, Operation::Additive)]);
    assert_eq!(renders[0].surfaces.len(), 6);
    assert_eq!(renders[0].vertex_count(), 24);
    assert_relative_eq!(volume(&renders), 1.0, epsilon = 1e-5);
}

#[test]
fn test_subtract_l_shape() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::new(0.5, 0.5, 0.0), Operation::Subtractive),
    ]);
    assert_eq!(renders[0].surfaces.len(), 8);
    assert_eq!(renders[1].surfaces.len(), 2);
    assert_relative_eq!(volume(&renders), 0.75, epsilon = 1e-5);

    // Notch walls face into the removed quadrant
    for surface in &renders[1].surfaces {
        let normal = Vec3::from_array(surface.normals[0]);
        assert!(normal.x > 0.99 || normal.y > 0.99, "normal {normal:?}");
    }
}

#[test]
fn test_side_by_side_union_drops_shared_faces() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::X, Operation::Additive),
    ]);
    assert_eq!(surfaces(&renders).len(), 10);
    assert_relative_eq!(area(&renders), 10.0, epsilon = 1e-5);
    assert_relative_eq!(volume(&renders), 2.0, epsilon = 1e-5);
}

#[test]
fn test_coincident_union_keeps_one_copy() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::ZERO, Operation::Additive),
    ]);
    assert!(renders[0].surfaces.is_empty());
    assert_eq!(renders[1].surfaces.len(), 6);
}

#[test]
fn test_coincident_intersection_keeps_one_copy() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::ZERO, Operation::Intersecting),
    ]);
    assert_eq!(renders[0].surfaces.len(), 6);
    assert!(renders[1].surfaces.is_empty());
}

#[test]
fn test_intersection_of_overlapping_cubes() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::new(0.5, 0.5, 0.5), Operation::Intersecting),
    ]);
    assert_relative_eq!(volume(&renders), 0.125, epsilon = 1e-5);
}

#[test]
fn test_subtract_through_hole_volume() {
    let renders = evaluate_scene(&[
        spec(2.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::ZERO, Operation::Subtractive),
    ]);
    // Fully enclosed cavity: outer shell plus inverted inner shell
    assert_eq!(renders[1].surfaces.len(), 6);
    assert_relative_eq!(volume(&renders), 7.0, epsilon = 1e-5);
}

#[test]
fn test_face_touching_subtraction_leaves_solid_intact() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::X, Operation::Subtractive),
    ]);
    assert_eq!(renders[0].surfaces.len(), 6);
    assert!(renders[1].surfaces.is_empty());
    assert_relative_eq!(volume(&renders), 1.0, epsilon = 1e-5);
}

#[test]
fn test_face_touching_intersection_is_empty() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::X, Operation::Intersecting),
    ]);
    assert!(surfaces(&renders).is_empty());
}

#[test]
fn test_cavity_wall_against_solid_kept_once() {
    let renders = evaluate_scene(&[
        spec(4.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::new(0.5, 0.0, 0.0), Operation::Additive),
        spec(1.0, DVec3::new(-0.5, 0.0, 0.0), Operation::Subtractive),
    ]);
    assert_eq!(renders[0].surfaces.len(), 6);
    assert_eq!(renders[2].surfaces.len(), 5);

    // The shared wall comes from the solid side, facing into the cavity
    assert_eq!(renders[1].surfaces.len(), 1);
    let normal = Vec3::from_array(renders[1].surfaces[0].normals[0]);
    assert_relative_eq!(normal.x, -1.0, epsilon = 1e-5);
    assert_relative_eq!(volume(&renders), 63.0, epsilon = 1e-4);
}

#[test]
fn test_attributes_are_consistent() {
    let renders = evaluate_scene(&[
        spec(1.0, DVec3::ZERO, Operation::Additive),
        spec(1.0, DVec3::new(0.5, 0.5, 0.0), Operation::Subtractive),
    ]);
    for surface in surfaces(&renders) {
        let n = surface.vertex_count();
        assert_eq!(surface.normals.len(), n);
        assert_eq!(surface.tangents.len(), n);
        assert_eq!(surface.uv0.len(), n);
        assert!(surface.indices.iter().all(|&i| (i as usize) < n));
        let normal = Vec3::from_array(surface.normals[0]);
        let tangent = Vec3::from_array([
            surface.tangents[0][0],
            surface.tangents[0][1],
            surface.tangents[0][2],
        ]);
        assert_relative_eq!(normal.length(), 1.0, epsilon = 1e-5);
        assert_relative_eq!(normal.dot(tangent), 0.0, epsilon = 1e-5);
        assert!(surface.tangents[0][3].abs() == 1.0);
    }
}

#[test]
fn test_missing_input_geometry_reads_outside() {
    let mut hierarchy = CsgHierarchy::new();
    let tree = hierarchy.create_tree();
    let a = hierarchy.create_brush(PolytopeId(0), DMat4::IDENTITY, Operation::Additive);
    let b = hierarchy.create_brush(PolytopeId(0), DMat4::IDENTITY, Operation::Subtractive);
    hierarchy.append_child(tree, a).unwrap();
    hierarchy.append_child(tree, b).unwrap();
    let compact = CompactTree::build(&hierarchy, tree).unwrap();
    let order = BrushOrder::from_compact(&compact);
    let table = RoutingTable::build(&compact, &order, 0, &[b]).unwrap();

    let polytope = BrushGenerator::Box { size: DVec3::ONE }.generate().unwrap();
    let brush = TreeBrush::new(a, &polytope, DMat4::IDENTITY).unwrap();
    let render = evaluate_brush(&brush, &table, &[RoutingBrush::default()]);
    assert_eq!(render.surfaces.len(), 6);
}
