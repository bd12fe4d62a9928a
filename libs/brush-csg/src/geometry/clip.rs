//! # Convex Loop Clipping
//!
//! Splitting of convex polygon loops by planes and by whole brushes.
//!
//! A loop is a counter-clockwise vertex list lying on a carrier plane. New
//! vertices produced by a split are snapped onto the splitting plane while
//! staying on the carrier, so later splits against neighbouring planes see
//! consistent distances.

use config::constants::{AREA_EPSILON, DISTANCE_EPSILON};
use glam::DVec3;
use smallvec::SmallVec;

use super::plane::{Classification, Plane};

/// Inline capacity for polygon loops. Box faces and most clipped
/// fragments fit without allocating.
pub const LOOP_CAPACITY: usize = 8;

/// A convex vertex loop.
pub type Loop = SmallVec<[DVec3; LOOP_CAPACITY]>;

// =============================================================================
// SINGLE PLANE
// =============================================================================

/// Result of splitting a loop by one plane.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopSplit {
    /// Entirely in front.
    Front,
    /// Entirely behind.
    Back,
    /// Lies on the plane.
    Coplanar,
    /// Straddles the plane.
    Spanning {
        /// Part in front of the plane.
        front: Loop,
        /// Part behind the plane.
        back: Loop,
    },
}

/// Classifies a loop relative to a plane.
pub fn classify_loop(vertices: &[DVec3], plane: &Plane) -> Classification {
    let mut front_count = 0;
    let mut back_count = 0;

    for vertex in vertices {
        match plane.classify_point(*vertex) {
            Classification::Front => front_count += 1,
            Classification::Back => back_count += 1,
            _ => {}
        }
    }

    if front_count > 0 && back_count > 0 {
        Classification::Spanning
    } else if front_count > 0 {
        Classification::Front
    } else if back_count > 0 {
        Classification::Back
    } else {
        Classification::Coplanar
    }
}

/// Splits a loop lying on `carrier` by `plane`.
///
/// A side whose piece degenerates below [`AREA_EPSILON`] is dropped and the
/// loop is reported as lying wholly on the other side.
pub fn split_loop(vertices: &[DVec3], carrier: &Plane, plane: &Plane) -> LoopSplit {
    match classify_loop(vertices, plane) {
        Classification::Front => LoopSplit::Front,
        Classification::Back => LoopSplit::Back,
        Classification::Coplanar => LoopSplit::Coplanar,
        Classification::Spanning => {
            let mut front = Loop::new();
            let mut back = Loop::new();

            for i in 0..vertices.len() {
                let j = (i + 1) % vertices.len();
                let vi = vertices[i];
                let vj = vertices[j];

                let ti = plane.classify_point(vi);
                let tj = plane.classify_point(vj);

                if ti != Classification::Back {
                    front.push(vi);
                }
                if ti != Classification::Front {
                    back.push(vi);
                }

                if (ti == Classification::Front && tj == Classification::Back)
                    || (ti == Classification::Back && tj == Classification::Front)
                {
                    let di = plane.signed_distance(vi);
                    let dj = plane.signed_distance(vj);
                    let t = di / (di - dj);
                    let crossing = plane.snap_within(carrier, vi.lerp(vj, t));
                    front.push(crossing);
                    back.push(crossing);
                }
            }

            let normal = carrier.normal();
            let front = clean_loop(&front, normal, DISTANCE_EPSILON);
            let back = clean_loop(&back, normal, DISTANCE_EPSILON);
            match (front, back) {
                (Some(front), Some(back)) => LoopSplit::Spanning { front, back },
                (Some(_), None) => LoopSplit::Front,
                (None, Some(_)) => LoopSplit::Back,
                (None, None) => LoopSplit::Back,
            }
        }
    }
}

// =============================================================================
// WHOLE BRUSH
// =============================================================================

/// Pieces of a loop after splitting it by every plane of a convex brush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrushSplit {
    /// Piece behind or on every plane, if any.
    pub inside: Option<Loop>,
    /// Pieces in front of at least one plane.
    pub outside: Vec<Loop>,
}

/// Clips a loop to the inside of a convex brush.
///
/// Parts lying on a brush plane count as inside. Returns `None` when nothing
/// with area survives.
pub fn clip_to_brush(vertices: &[DVec3], carrier: &Plane, planes: &[Plane]) -> Option<Loop> {
    let mut current: Loop = vertices.iter().copied().collect();
    for plane in planes {
        match split_loop(&current, carrier, plane) {
            LoopSplit::Front => return None,
            LoopSplit::Back | LoopSplit::Coplanar => {}
            LoopSplit::Spanning { back, .. } => current = back,
        }
    }
    (loop_area(&current, carrier.normal()) >= AREA_EPSILON).then_some(current)
}

/// Splits a loop into the piece inside a convex brush and the pieces outside it.
pub fn split_by_brush(vertices: &[DVec3], carrier: &Plane, planes: &[Plane]) -> BrushSplit {
    let mut result = BrushSplit::default();
    let mut current: Loop = vertices.iter().copied().collect();

    for plane in planes {
        match split_loop(&current, carrier, plane) {
            LoopSplit::Front => {
                result.outside.push(current);
                return result;
            }
            LoopSplit::Back | LoopSplit::Coplanar => {}
            LoopSplit::Spanning { front, back } => {
                result.outside.push(front);
                current = back;
            }
        }
    }

    if loop_area(&current, carrier.normal()) >= AREA_EPSILON {
        result.inside = Some(current);
    }
    result
}

// =============================================================================
// LOOP HELPERS
// =============================================================================

/// Area of a planar loop measured along `normal`.
pub fn loop_area(vertices: &[DVec3], normal: DVec3) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }
    let mut sum = DVec3::ZERO;
    for i in 0..vertices.len() {
        let j = (i + 1) % vertices.len();
        sum += vertices[i].cross(vertices[j]);
    }
    0.5 * sum.dot(normal).abs()
}

/// Newell normal of a loop, unnormalized.
pub fn newell_normal(vertices: &[DVec3]) -> DVec3 {
    let mut normal = DVec3::ZERO;
    for i in 0..vertices.len() {
        let current = vertices[i];
        let next = vertices[(i + 1) % vertices.len()];
        normal.x += (current.y - next.y) * (current.z + next.z);
        normal.y += (current.z - next.z) * (current.x + next.x);
        normal.z += (current.x - next.x) * (current.y + next.y);
    }
    normal
}

/// Welds neighbours closer than `merge_distance` and drops collinear vertices.
///
/// Returns `None` when fewer than three vertices or less than
/// [`AREA_EPSILON`] of area remain.
pub fn clean_loop(vertices: &[DVec3], normal: DVec3, merge_distance: f64) -> Option<Loop> {
    let mut welded = Loop::new();
    for vertex in vertices {
        if welded
            .last()
            .map_or(true, |last: &DVec3| last.distance(*vertex) >= merge_distance)
        {
            welded.push(*vertex);
        }
    }
    while welded.len() > 1 {
        let (first, last) = (welded[0], welded[welded.len() - 1]);
        if first.distance(last) >= merge_distance {
            break;
        }
        welded.pop();
    }

    // Repeat until stable since removing one vertex can expose another.
    let mut changed = true;
    while changed && welded.len() >= 3 {
        changed = false;
        let count = welded.len();
        for i in 0..count {
            let prev = welded[(i + count - 1) % count];
            let current = welded[i];
            let next = welded[(i + 1) % count];
            let span = next - prev;
            let length = span.length();
            let offset = if length > 0.0 {
                (current - prev).cross(span).length() / length
            } else {
                0.0
            };
            if offset < DISTANCE_EPSILON {
                welded.remove(i);
                changed = true;
                break;
            }
        }
    }

    if welded.len() < 3 || loop_area(&welded, normal) < AREA_EPSILON {
        return None;
    }
    Some(welded)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use config::constants::MERGE_EPSILON;

    fn unit_square() -> Loop {
        Loop::from_slice(&[
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
        ])
    }

    fn floor() -> Plane {
        Plane::new(DVec3::Z, 0.0).unwrap()
    }

    /// Planes of the box `[min, max]`.
    fn box_planes(min: DVec3, max: DVec3) -> Vec<Plane> {
        vec![
            Plane::new(DVec3::X, max.x).unwrap(),
            Plane::new(-DVec3::X, -min.x).unwrap(),
            Plane::new(DVec3::Y, max.y).unwrap(),
            Plane::new(-DVec3::Y, -min.y).unwrap(),
            Plane::new(DVec3::Z, max.z).unwrap(),
            Plane::new(-DVec3::Z, -min.z).unwrap(),
        ]
    }

    #[test]
    fn test_classify_loop() {
        let square = unit_square();
        assert_eq!(classify_loop(&square, &floor()), Classification::Coplanar);
        let cut = Plane::new(DVec3::X, 0.5).unwrap();
        assert_eq!(classify_loop(&square, &cut), Classification::Spanning);
        let beyond = Plane::new(DVec3::X, 2.0).unwrap();
        assert_eq!(classify_loop(&square, &beyond), Classification::Back);
    }

    #[test]
    fn test_split_loop_halves() {
        let cut = Plane::new(DVec3::X, 0.5).unwrap();
        match split_loop(&unit_square(), &floor(), &cut) {
            LoopSplit::Spanning { front, back } => {
                assert_relative_eq!(loop_area(&front, DVec3::Z), 0.5, epsilon = 1e-12);
                assert_relative_eq!(loop_area(&back, DVec3::Z), 0.5, epsilon = 1e-12);
                assert!(front.iter().all(|v| v.x >= 0.5 - 1e-12));
                assert!(back.iter().all(|v| v.x <= 0.5 + 1e-12));
            }
            other => panic!("expected spanning split, got {other:?}"),
        }
    }

    #[test]
    fn test_split_loop_within_epsilon_is_one_sided() {
        let cut = Plane::new(DVec3::X, 1.0 - DISTANCE_EPSILON * 0.5).unwrap();
        assert_eq!(split_loop(&unit_square(), &floor(), &cut), LoopSplit::Back);
    }

    #[test]
    fn test_clip_to_brush_inside_part() {
        let planes = box_planes(DVec3::new(0.5, 0.5, -1.0), DVec3::new(2.0, 2.0, 1.0));
        let clipped = clip_to_brush(&unit_square(), &floor(), &planes).unwrap();
        assert_relative_eq!(loop_area(&clipped, DVec3::Z), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn test_clip_to_brush_disjoint() {
        let planes = box_planes(DVec3::splat(3.0), DVec3::splat(4.0));
        assert!(clip_to_brush(&unit_square(), &floor(), &planes).is_none());
    }

    #[test]
    fn test_clip_to_brush_on_face_counts_inside() {
        // Square lies exactly on the brush's bottom face
        let planes = box_planes(DVec3::ZERO, DVec3::ONE);
        let clipped = clip_to_brush(&unit_square(), &floor(), &planes).unwrap();
        assert_relative_eq!(loop_area(&clipped, DVec3::Z), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_split_by_brush_preserves_area() {
        let planes = box_planes(DVec3::new(0.25, 0.25, -1.0), DVec3::new(0.75, 0.75, 1.0));
        let split = split_by_brush(&unit_square(), &floor(), &planes);
        let inside = split.inside.as_ref().map_or(0.0, |l| loop_area(l, DVec3::Z));
        let outside: f64 = split.outside.iter().map(|l| loop_area(l, DVec3::Z)).sum();
        assert_relative_eq!(inside, 0.25, epsilon = 1e-12);
        assert_relative_eq!(inside + outside, 1.0, epsilon = 1e-12);
        assert_eq!(split.outside.len(), 4);
    }

    #[test]
    fn test_clean_loop_removes_collinear_and_duplicates() {
        let noisy = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.5, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0001, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 0.0),
        ];
        let cleaned = clean_loop(&noisy, DVec3::Z, MERGE_EPSILON).unwrap();
        assert_eq!(cleaned.len(), 4);
        assert_relative_eq!(loop_area(&cleaned, DVec3::Z), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_clean_loop_rejects_sliver() {
        let sliver = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(2.0, 0.00001, 0.0),
        ];
        assert!(clean_loop(&sliver, DVec3::Z, MERGE_EPSILON).is_none());
    }

    #[test]
    fn test_newell_normal_orientation() {
        let normal = newell_normal(&unit_square()).normalize();
        assert_relative_eq!(normal.z, 1.0, epsilon = 1e-12);
    }
}
