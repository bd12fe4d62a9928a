//! # Axis-Aligned Bounding Box
//!
//! Tree-space bounds used by the broad phase.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner (x, y, z)
    pub min: DVec3,
    /// Maximum corner (x, y, z)
    pub max: DVec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// Creates a new bounding box from min/max corners.
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    /// Creates an empty (invalid) bounding box.
    pub fn empty() -> Self {
        Self {
            min: DVec3::splat(f64::INFINITY),
            max: DVec3::splat(f64::NEG_INFINITY),
        }
    }

    /// Computes the bounds of a point set. Empty input gives an invalid box.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a DVec3>) -> Self {
        points.into_iter().fold(Self::empty(), |bounds, point| Self {
            min: bounds.min.min(*point),
            max: bounds.max.max(*point),
        })
    }

    /// Checks if the bounding box is valid (non-empty).
    pub fn is_valid(&self) -> bool {
        self.min.x <= self.max.x && self.min.y <= self.max.y && self.min.z <= self.max.z
    }

    /// Checks if this bounding box overlaps with another.
    ///
    /// Touching boxes count as overlapping.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Checks if `other` lies within this box, allowing `tolerance` slack.
    pub fn contains(&self, other: &Aabb, tolerance: f64) -> bool {
        other.min.cmpge(self.min - DVec3::splat(tolerance)).all()
            && other.max.cmple(self.max + DVec3::splat(tolerance)).all()
    }

    /// Grows the box by `amount` on every side.
    pub fn padded(&self, amount: f64) -> Aabb {
        Aabb {
            min: self.min - DVec3::splat(amount),
            max: self.max + DVec3::splat(amount),
        }
    }

    /// Expands this bounding box to include another.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Center point.
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box(offset: DVec3) -> Aabb {
        Aabb::new(offset, offset + DVec3::ONE)
    }

    #[test]
    fn test_from_points() {
        let points = [DVec3::new(1.0, -2.0, 3.0), DVec3::new(-1.0, 4.0, 0.0)];
        let bounds = Aabb::from_points(points.iter());
        assert_eq!(bounds.min, DVec3::new(-1.0, -2.0, 0.0));
        assert_eq!(bounds.max, DVec3::new(1.0, 4.0, 3.0));
        assert!(!Aabb::from_points(std::iter::empty()).is_valid());
    }

    #[test]
    fn test_overlaps() {
        let a = unit_box(DVec3::ZERO);
        assert!(a.overlaps(&unit_box(DVec3::splat(0.5))));
        assert!(a.overlaps(&unit_box(DVec3::X)));
        assert!(!a.overlaps(&unit_box(DVec3::new(1.5, 0.0, 0.0))));
    }

    #[test]
    fn test_padded_overlap() {
        let a = unit_box(DVec3::ZERO);
        let b = unit_box(DVec3::new(1.00005, 0.0, 0.0));
        assert!(!a.overlaps(&b));
        assert!(a.padded(1e-4).overlaps(&b.padded(1e-4)));
    }

    #[test]
    fn test_contains() {
        let outer = Aabb::new(DVec3::splat(-1.0), DVec3::splat(2.0));
        let inner = unit_box(DVec3::ZERO);
        assert!(outer.contains(&inner, 0.0));
        assert!(!inner.contains(&outer, 0.0));
        assert!(inner.contains(&inner, 0.0));
    }

    #[test]
    fn test_union() {
        let a = unit_box(DVec3::ZERO);
        let b = unit_box(DVec3::splat(2.0));
        let merged = a.union(&b);
        assert_eq!(merged.min, DVec3::ZERO);
        assert_eq!(merged.max, DVec3::splat(3.0));
        assert_eq!(merged.center(), DVec3::splat(1.5));
    }
}
