//! # Plane
//!
//! Oriented plane with point classification. The normal points out of the
//! solid the plane bounds, so negative signed distances are inside.

use config::constants::{DISTANCE_EPSILON, NORMAL_EPSILON};
use glam::{DMat3, DMat4, DVec3};
use serde::{Deserialize, Serialize};

// =============================================================================
// CLASSIFICATION
// =============================================================================

/// Classification of a point or loop relative to a plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// In front of the plane (outside the solid).
    Front,
    /// Behind the plane (inside the solid).
    Back,
    /// Within [`DISTANCE_EPSILON`] of the plane.
    Coplanar,
    /// Loop has vertices on both sides.
    Spanning,
}

/// How two planes coincide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coincidence {
    /// Different planes.
    None,
    /// Same plane, same orientation.
    Aligned,
    /// Same plane, opposite orientation.
    Reversed,
}

// =============================================================================
// PLANE
// =============================================================================

/// A plane `normal · p = w` with a unit normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    normal: DVec3,
    w: f64,
}

impl Plane {
    /// Creates a plane from a normal and distance, normalizing both.
    ///
    /// Returns `None` for a zero-length normal.
    pub fn new(normal: DVec3, w: f64) -> Option<Self> {
        let length = normal.length();
        if length < DISTANCE_EPSILON || !length.is_finite() {
            return None;
        }
        Some(Self {
            normal: normal / length,
            w: w / length,
        })
    }

    /// Creates a plane through `point` facing `normal`.
    pub fn from_normal_and_point(normal: DVec3, point: DVec3) -> Option<Self> {
        let normal = normal.try_normalize()?;
        Some(Self {
            normal,
            w: normal.dot(point),
        })
    }

    /// Creates a plane from three counter-clockwise points.
    pub fn from_points(a: DVec3, b: DVec3, c: DVec3) -> Option<Self> {
        Self::from_normal_and_point((b - a).cross(c - a), a)
    }

    /// Unit normal.
    #[inline]
    pub fn normal(&self) -> DVec3 {
        self.normal
    }

    /// Distance from the origin along the normal.
    #[inline]
    pub fn w(&self) -> f64 {
        self.w
    }

    /// Reverses the orientation.
    pub fn flip(&self) -> Plane {
        Plane {
            normal: -self.normal,
            w: -self.w,
        }
    }

    /// Signed distance: positive in front, negative behind.
    #[inline]
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) - self.w
    }

    /// Classifies a point with [`DISTANCE_EPSILON`] tolerance.
    pub fn classify_point(&self, point: DVec3) -> Classification {
        let distance = self.signed_distance(point);
        if distance > DISTANCE_EPSILON {
            Classification::Front
        } else if distance < -DISTANCE_EPSILON {
            Classification::Back
        } else {
            Classification::Coplanar
        }
    }

    /// Orthogonal projection of a point onto the plane.
    pub fn project(&self, point: DVec3) -> DVec3 {
        point - self.normal * self.signed_distance(point)
    }

    /// Moves `point` onto this plane while keeping it on `carrier`.
    ///
    /// Used for clip vertices so they sit exactly on both the polygon's own
    /// plane and the clipping plane. Parallel planes leave the point alone.
    pub fn snap_within(&self, carrier: &Plane, point: DVec3) -> DVec3 {
        let direction = self.normal - carrier.normal * self.normal.dot(carrier.normal);
        let denominator = direction.dot(self.normal);
        if denominator.abs() < NORMAL_EPSILON {
            return point;
        }
        point - direction * (self.signed_distance(point) / denominator)
    }

    /// Tests whether two planes are the same surface.
    pub fn coincidence(&self, other: &Plane) -> Coincidence {
        let dot = self.normal.dot(other.normal);
        if dot > 1.0 - NORMAL_EPSILON && (self.w - other.w).abs() < DISTANCE_EPSILON {
            Coincidence::Aligned
        } else if dot < -1.0 + NORMAL_EPSILON && (self.w + other.w).abs() < DISTANCE_EPSILON {
            Coincidence::Reversed
        } else {
            Coincidence::None
        }
    }

    /// Transforms the plane by an affine matrix.
    ///
    /// `normal_matrix` must be the inverse transpose of the matrix's linear part.
    pub fn transformed(&self, matrix: &DMat4, normal_matrix: &DMat3) -> Option<Plane> {
        let point = matrix.transform_point3(self.normal * self.w);
        Plane::from_normal_and_point(*normal_matrix * self.normal, point)
    }
}

/// Intersects three planes, returning `None` when they are nearly dependent.
pub fn intersect_planes(a: &Plane, b: &Plane, c: &Plane, min_determinant: f64) -> Option<DVec3> {
    let rows = DMat3::from_cols(a.normal, b.normal, c.normal).transpose();
    let determinant = rows.determinant();
    if determinant.abs() < min_determinant {
        return None;
    }
    let point = rows.inverse() * DVec3::new(a.w, b.w, c.w);
    point.is_finite().then_some(point)
}

// =============================================================================
// TESTS
// =============================================================================
