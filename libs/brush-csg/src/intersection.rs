//! # Brush Intersection
//!
//! Clips the faces of two convex brushes against each other.
//!
//! For a pair (A, B) every face of A is clipped to the inside of B and every
//! face of B to the inside of A. Faces lying on the other brush's boundary
//! count as inside, so brushes sharing a face touch. The surviving loops
//! tell the evaluator which faces need splitting, and their presence decides
//! whether the pair touches at all.

use config::constants::DISTANCE_EPSILON;
use serde::{Deserialize, Serialize};

use crate::brush::TreeBrush;
use crate::geometry::clip::clip_to_brush;
use crate::geometry::Loop;
use crate::hierarchy::NodeId;

/// How two brushes relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntersectionType {
    /// No face of either brush reaches into the other.
    NoIntersection,
    /// Boundaries cross or touch.
    Intersection,
    /// A lies entirely within B.
    AInsideB,
    /// B lies entirely within A.
    BInsideA,
}

impl IntersectionType {
    /// The same relation seen from the other brush.
    pub fn flipped(self) -> Self {
        match self {
            IntersectionType::AInsideB => IntersectionType::BInsideA,
            IntersectionType::BInsideA => IntersectionType::AInsideB,
            other => other,
        }
    }

    /// True for every type except [`IntersectionType::NoIntersection`].
    pub fn touches(self) -> bool {
        self != IntersectionType::NoIntersection
    }
}

/// Part of one face lying inside the other brush.
#[derive(Debug, Clone, PartialEq)]
pub struct IntersectionLoop {
    /// Face index within its brush.
    pub face: u32,
    /// Clipped loop in tree space.
    pub vertices: Loop,
    /// True when the whole face lies inside the other brush.
    pub whole: bool,
}

/// Intersection data of one brush pair.
#[derive(Debug, Clone, PartialEq)]
pub struct BrushIntersection {
    /// First brush.
    pub brush_a: NodeId,
    /// Second brush.
    pub brush_b: NodeId,
    /// Relation between them.
    pub kind: IntersectionType,
    /// A's faces clipped to B.
    pub loops_a: Vec<IntersectionLoop>,
    /// B's faces clipped to A.
    pub loops_b: Vec<IntersectionLoop>,
}

impl BrushIntersection {
    /// The same intersection seen from B.
    pub fn flipped(&self) -> Self {
        Self {
            brush_a: self.brush_b,
            brush_b: self.brush_a,
            kind: self.kind.flipped(),
            loops_a: self.loops_b.clone(),
            loops_b: self.loops_a.clone(),
        }
    }

    /// Loop of face `face` of `brush`, if that face reaches into the other brush.
    pub fn loop_for(&self, brush: NodeId, face: u32) -> Option<&IntersectionLoop> {
        let loops = if brush == self.brush_a {
            &self.loops_a
        } else if brush == self.brush_b {
            &self.loops_b
        } else {
            return None;
        };
        loops.iter().find(|l| l.face == face)
    }
}

/// Clips the faces of `brush` to the inside of `other`.
fn clip_faces(brush: &TreeBrush, other: &TreeBrush) -> Vec<IntersectionLoop> {
    let other_bounds = other.bounds().padded(DISTANCE_EPSILON);
    brush
        .faces()
        .iter()
        .enumerate()
        .filter_map(|(index, face)| {
            let face_bounds = crate::geometry::Aabb::from_points(face.vertices.iter());
            if !face_bounds.overlaps(&other_bounds) {
                return None;
            }
            let whole = face
                .vertices
                .iter()
                .all(|&vertex| other.contains_point(vertex));
            let vertices = if whole {
                face.vertices.clone()
            } else {
                clip_to_brush(&face.vertices, &face.plane, other.planes())?
            };
            Some(IntersectionLoop {
                face: index as u32,
                vertices,
                whole,
            })
        })
        .collect()
}

/// True when every vertex of `inner` is inside `outer` and its bounds are contained.
fn inside(inner: &TreeBrush, outer: &TreeBrush) -> bool {
    outer.bounds().contains(&inner.bounds(), DISTANCE_EPSILON)
        && inner
            .vertices()
            .iter()
            .all(|&vertex| outer.contains_point(vertex))
}

/// Computes the intersection of two brushes.
///
/// The result for `(b, a)` equals the [`BrushIntersection::flipped`] result
/// for `(a, b)`.
pub fn intersect(a: &TreeBrush, b: &TreeBrush) -> BrushIntersection {
    let loops_a = clip_faces(a, b);
    let loops_b = clip_faces(b, a);

    let a_inside_b = inside(a, b);
    let b_inside_a = inside(b, a);
    let kind = if loops_a.is_empty() && loops_b.is_empty() {
        IntersectionType::NoIntersection
    } else if a_inside_b && b_inside_a {
        IntersectionType::Intersection
    } else if a_inside_b {
        IntersectionType::AInsideB
    } else if b_inside_a {
        IntersectionType::BInsideA
    } else {
        IntersectionType::Intersection
    };

    BrushIntersection {
        brush_a: a.node(),
        brush_b: b.node(),
        kind,
        loops_a,
        loops_b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polytope::{BrushGenerator, Polytope};
    use glam::{DMat4, DVec3};
    use slotmap::SlotMap;

    fn cube(size: f64) -> Polytope {
        BrushGenerator::Box {
            size: DVec3::splat(size),
        }
        .generate()
        .unwrap()
    }

    fn pair(size_a: f64, offset_a: DVec3, size_b: f64, offset_b: DVec3) -> (TreeBrush, TreeBrush) {
        let mut ids: SlotMap<NodeId, ()> = SlotMap::with_key();
        let a = TreeBrush::new(ids.insert(()), &cube(size_a), DMat4::from_translation(offset_a)).unwrap();
        let b = TreeBrush::new(ids.insert(()), &cube(size_b), DMat4::from_translation(offset_b)).unwrap();
        (a, b)
    }

    #[test]
    fn test_overlapping_cubes_intersect() {
        let (a, b) = pair(1.0, DVec3::ZERO, 1.0, DVec3::new(0.5, 0.5, 0.0));
        let result = intersect(&a, &b);
        assert_eq!(result.kind, IntersectionType::Intersection);
        assert!(!result.loops_a.is_empty());
        assert!(!result.loops_b.is_empty());
    }

    #[test]
    fn test_separated_cubes() {
        let (a, b) = pair(1.0, DVec3::ZERO, 1.0, DVec3::new(3.0, 0.0, 0.0));
        let result = intersect(&a, &b);
        assert_eq!(result.kind, IntersectionType::NoIntersection);
        assert!(result.loops_a.is_empty() && result.loops_b.is_empty());
    }

    #[test]
    fn test_containment() {
        let (a, b) = pair(1.0, DVec3::ZERO, 3.0, DVec3::ZERO);
        let result = intersect(&a, &b);
        assert_eq!(result.kind, IntersectionType::AInsideB);
        assert_eq!(result.loops_a.len(), 6);
        assert!(result.loops_a.iter().all(|l| l.whole));
        assert!(result.loops_b.is_empty());
        assert_eq!(intersect(&b, &a).kind, IntersectionType::BInsideA);
    }

    #[test]
    fn test_coincident_brushes_intersect() {
        let (a, b) = pair(1.0, DVec3::ZERO, 1.0, DVec3::ZERO);
        assert_eq!(intersect(&a, &b).kind, IntersectionType::Intersection);
    }

    #[test]
    fn test_face_contact_touches() {
        let (a, b) = pair(1.0, DVec3::ZERO, 1.0, DVec3::new(1.0, 0.0, 0.0));
        let result = intersect(&a, &b);
        assert_eq!(result.kind, IntersectionType::Intersection);
        // Only the shared faces reach into the other brush
        assert_eq!(result.loops_a.len(), 1);
        assert_eq!(result.loops_b.len(), 1);
    }

    #[test]
    fn test_edge_contact_does_not_touch() {
        let (a, b) = pair(1.0, DVec3::ZERO, 1.0, DVec3::new(1.0, 1.0, 0.0));
        assert_eq!(intersect(&a, &b).kind, IntersectionType::NoIntersection);
    }

    #[test]
    fn test_symmetry() {
        let (a, b) = pair(1.0, DVec3::new(0.1, 0.2, 0.3), 0.7, DVec3::new(0.5, 0.4, -0.2));
        assert_eq!(intersect(&a, &b).flipped(), intersect(&b, &a));
    }

    #[test]
    fn test_loop_for() {
        let (a, b) = pair(1.0, DVec3::ZERO, 3.0, DVec3::ZERO);
        let result = intersect(&a, &b);
        assert!(result.loop_for(a.node(), 0).is_some());
        assert!(result.loop_for(b.node(), 0).is_none());
    }
}
