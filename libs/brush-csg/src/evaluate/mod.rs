//! # Brush Evaluation
//!
//! Splits the faces of one brush into fragments, categorizes every fragment
//! against the brushes it touches and keeps what the routing program says
//! survives.
//!
//! ## Per face
//!
//! 1. Start from the face loop
//! 2. For each routing input in evaluation order, split the fragments by the
//!    input's planes and record each piece's category against it
//! 3. Run the routing program on every fragment
//! 4. Keep `Aligned` fragments, keep `ReverseAligned` fragments flipped
//!    unless they lie back-to-back on an input's face
//!
//! Faces that the pair's intersection data shows never reach into an input
//! are not split by it at all.

mod triangulate;

#[cfg(test)]
mod tests;

pub use triangulate::content_hash;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::brush::{TreeBrush, TreeFace};
use crate::geometry::clip::split_by_brush;
use crate::geometry::{Coincidence, Loop, Plane};
use crate::hierarchy::NodeId;
use crate::intersection::BrushIntersection;
use crate::polytope::SurfaceLayers;
use crate::routing::{Category, RoutingTable};

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// Triangulated fragment of one brush face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSurface {
    /// Brush the fragment belongs to.
    pub brush: NodeId,
    /// Index among the brush's surfaces.
    pub surface_index: u32,
    /// Layers and materials of the source face.
    pub layers: SurfaceLayers,
    /// Tree-space positions.
    pub positions: Vec<[f32; 3]>,
    /// Unit normals.
    pub normals: Vec<[f32; 3]>,
    /// Tangents with handedness in `w`.
    pub tangents: Vec<[f32; 4]>,
    /// Texture coordinates.
    pub uv0: Vec<[f32; 2]>,
    /// Triangle list, local to this surface.
    pub indices: Vec<u32>,
    /// Hash of quantized geometry and layers.
    pub content_hash: u64,
}

impl RenderSurface {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Every surface one brush contributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BrushRender {
    /// Surfaces in face order.
    pub surfaces: Vec<RenderSurface>,
}

impl BrushRender {
    /// Total vertices over all surfaces.
    pub fn vertex_count(&self) -> usize {
        self.surfaces.iter().map(RenderSurface::vertex_count).sum()
    }
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Geometry of one routing input.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingBrush<'a> {
    /// The touching brush; `None` when it has no geometry this pass.
    pub brush: Option<&'a TreeBrush>,
    /// Intersection of the pair, if already computed.
    pub intersection: Option<&'a BrushIntersection>,
}

/// How far a face reaches into an input brush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    None,
    Partial,
    Whole,
}

struct Fragment {
    vertices: Loop,
    categories: SmallVec<[Category; 8]>,
}

/// Evaluates every face of `brush`.
///
/// `inputs` runs parallel to [`RoutingTable::inputs`]; missing entries read
/// as brushes without geometry, whose category is always `Outside`.
pub fn evaluate_brush(
    brush: &TreeBrush,
    table: &RoutingTable,
    inputs: &[RoutingBrush<'_>],
) -> BrushRender {
    let mut surfaces = Vec::new();
    for (face_index, face) in brush.faces().iter().enumerate() {
        let mut fragments = vec![Fragment {
            vertices: face.vertices.clone(),
            categories: SmallVec::new(),
        }];

        for (k, routing_input) in table.inputs().iter().enumerate() {
            let input = inputs.get(k).copied().unwrap_or_default();
            fragments = split_fragments(
                fragments,
                brush,
                face_index as u32,
                face,
                input,
                routing_input.later,
            );
        }

        for fragment in fragments {
            let flipped = match table.route(Category::Aligned, &fragment.categories) {
                Category::Aligned => false,
                // The back-to-back input keeps this surface unflipped
                Category::ReverseAligned
                    if fragment.categories.contains(&Category::ReverseAligned) =>
                {
                    continue
                }
                Category::ReverseAligned => true,
                Category::Inside | Category::Outside => continue,
            };
            let index = surfaces.len() as u32;
            if let Some(surface) =
                triangulate::build_surface(brush, face, &fragment.vertices, flipped, index)
            {
                surfaces.push(surface);
            }
        }
    }
    BrushRender { surfaces }
}

/// Splits fragments by one input brush and records their categories.
fn split_fragments(
    fragments: Vec<Fragment>,
    brush: &TreeBrush,
    face_index: u32,
    face: &TreeFace,
    input: RoutingBrush<'_>,
    later: bool,
) -> Vec<Fragment> {
    let Some(other) = input.brush else {
        return with_category(fragments, Category::Outside);
    };
    let reach = match input.intersection {
        Some(intersection) => match intersection.loop_for(brush.node(), face_index) {
            None => Reach::None,
            Some(found) if found.whole => Reach::Whole,
            Some(_) => Reach::Partial,
        },
        None => Reach::Partial,
    };
    let inside = boundary_category(&face.plane, other).resolve_tie(later);

    match reach {
        Reach::None => with_category(fragments, Category::Outside),
        Reach::Whole => with_category(fragments, inside),
        Reach::Partial => {
            let mut result = Vec::with_capacity(fragments.len() + 2);
            for fragment in fragments {
                let split = split_by_brush(&fragment.vertices, &face.plane, other.planes());
                for piece in split.outside {
                    let mut categories = fragment.categories.clone();
                    categories.push(Category::Outside);
                    result.push(Fragment {
                        vertices: piece,
                        categories,
                    });
                }
                if let Some(piece) = split.inside {
                    let mut categories = fragment.categories;
                    categories.push(inside);
                    result.push(Fragment {
                        vertices: piece,
                        categories,
                    });
                }
            }
            result
        }
    }
}

fn with_category(mut fragments: Vec<Fragment>, category: Category) -> Vec<Fragment> {
    for fragment in &mut fragments {
        fragment.categories.push(category);
    }
    fragments
}

/// Category of a face part lying inside-or-on `other`.
///
/// The part is on the boundary when the face's carrier coincides with one of
/// the brush's planes.
fn boundary_category(carrier: &Plane, other: &TreeBrush) -> Category {
    for plane in other.planes() {
        match carrier.coincidence(plane) {
            Coincidence::Aligned => return Category::Aligned,
            Coincidence::Reversed => return Category::ReverseAligned,
            Coincidence::None => {}
        }
    }
    Category::Inside
}
