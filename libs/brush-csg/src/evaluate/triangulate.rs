//! # Surface Triangulation
//!
//! Turns a kept convex fragment into render buffers.
//!
//! Fragments are welded on the merge grid, cleaned of collinear vertices and
//! fan-triangulated; triangles below the area epsilon are dropped. Normals
//! come from the carrier plane, tangents from the face's UV projection.

use config::constants::{quantize, AREA_EPSILON, MERGE_EPSILON};
use glam::DVec3;
use tracing::trace;
use xxhash_rust::xxh3::Xxh3;

use super::RenderSurface;
use crate::brush::{TreeBrush, TreeFace};
use crate::geometry::clip::clean_loop;
use crate::geometry::Loop;
use crate::polytope::SurfaceLayers;

/// Builds the render surface of one kept fragment.
///
/// `flipped` reverses the winding and the normal, for fragments kept as
/// reverse-aligned. Returns `None` for fragments that degenerate while
/// cleaning.
pub(crate) fn build_surface(
    brush: &TreeBrush,
    face: &TreeFace,
    fragment: &[DVec3],
    flipped: bool,
    surface_index: u32,
) -> Option<RenderSurface> {
    let (normal, oriented): (DVec3, Loop) = if flipped {
        (-face.plane.normal(), fragment.iter().rev().copied().collect())
    } else {
        (face.plane.normal(), fragment.iter().copied().collect())
    };

    let Some(cleaned) = clean_loop(&oriented, normal, MERGE_EPSILON) else {
        trace!(brush = ?brush.node(), "fragment degenerated while welding");
        return None;
    };

    let indices = fan_indices(&cleaned);
    if indices.is_empty() {
        trace!(brush = ?brush.node(), "fragment produced no triangles");
        return None;
    }

    let tangent = tangent_frame(brush, face, normal);
    let tree_to_local = brush.tree_to_local();
    let uv0 = cleaned
        .iter()
        .map(|&position| {
            let [u, v] = face.surface.uv.project(tree_to_local.transform_point3(position));
            [u as f32, v as f32]
        })
        .collect();

    Some(RenderSurface {
        brush: brush.node(),
        surface_index,
        layers: face.surface.layers,
        positions: cleaned.iter().map(|p| p.as_vec3().to_array()).collect(),
        normals: vec![normal.as_vec3().to_array(); cleaned.len()],
        tangents: vec![tangent; cleaned.len()],
        uv0,
        indices,
        content_hash: content_hash(&cleaned, normal, face.surface.layers),
    })
}

/// Fan triangulation of a convex loop, skipping slivers.
fn fan_indices(vertices: &[DVec3]) -> Vec<u32> {
    let mut indices = Vec::with_capacity(vertices.len().saturating_sub(2) * 3);
    for i in 1..vertices.len().saturating_sub(1) {
        let (a, b, c) = (vertices[0], vertices[i], vertices[i + 1]);
        if 0.5 * (b - a).cross(c - a).length() < AREA_EPSILON {
            continue;
        }
        indices.extend_from_slice(&[0, i as u32, i as u32 + 1]);
    }
    indices
}

/// Tangent in tree space with handedness in `w`.
///
/// The UV u axis is carried into tree space and projected onto the surface
/// plane. Faces whose u axis is parallel to the normal fall back to an
/// arbitrary in-plane direction.
fn tangent_frame(brush: &TreeBrush, face: &TreeFace, normal: DVec3) -> [f32; 4] {
    let u = brush.direction_to_tree(face.surface.uv.u_direction());
    let tangent = (u - normal * u.dot(normal))
        .try_normalize()
        .unwrap_or_else(|| normal.any_orthonormal_vector());
    let v = brush.direction_to_tree(face.surface.uv.v_direction());
    let handedness = if normal.cross(tangent).dot(v) < 0.0 {
        -1.0
    } else {
        1.0
    };
    tangent.as_vec3().extend(handedness).to_array()
}

/// Hash over quantized positions, the quantized normal and the surface layers.
///
/// Geometry edits below the merge epsilon leave the hash unchanged unless a
/// coordinate crosses a half-cell boundary of [`quantize`]. Stability is
/// best effort there: a sub-epsilon move can still change the hash.
pub fn content_hash(positions: &[DVec3], normal: DVec3, layers: SurfaceLayers) -> u64 {
    let mut hasher = Xxh3::new();
    for position in positions {
        for component in position.to_array() {
            hasher.update(&quantize(component).to_le_bytes());
        }
    }
    for component in normal.to_array() {
        hasher.update(&quantize(component).to_le_bytes());
    }
    hasher.update(&[layers.usage.bits()]);
    hasher.update(&layers.render_material.to_le_bytes());
    hasher.update(&layers.physics_material.to_le_bytes());
    hasher.digest()
}
