//! # Surface Descriptions
//!
//! Per-face layer usage, materials and UV projection.

use std::ops::{BitOr, BitOrAssign};

use glam::{DVec3, DVec4};
use serde::{Deserialize, Serialize};

// =============================================================================
// LAYER USAGE
// =============================================================================

/// Bit set of the output layers a surface participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerUsage(u8);

impl LayerUsage {
    /// No layers.
    pub const NONE: Self = Self(0);
    /// Drawn by the renderer.
    pub const RENDERABLE: Self = Self(1);
    /// Part of the physics collider.
    pub const COLLIDABLE: Self = Self(1 << 1);
    /// Casts shadows.
    pub const CASTS_SHADOWS: Self = Self(1 << 2);
    /// Receives shadows.
    pub const RECEIVES_SHADOWS: Self = Self(1 << 3);
    /// Every layer.
    pub const ALL: Self = Self(0b1111);

    /// Creates a usage set from raw bits, dropping unknown bits.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when no bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for LayerUsage {
    fn default() -> Self {
        Self::ALL
    }
}

impl BitOr for LayerUsage {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for LayerUsage {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// SURFACE LAYERS
// =============================================================================

/// Layer usage plus the material ids a surface carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SurfaceLayers {
    /// Which outputs the surface appears in.
    pub usage: LayerUsage,
    /// Render material id.
    pub render_material: u32,
    /// Physics material id.
    pub physics_material: u32,
}

impl SurfaceLayers {
    /// Layers with the given usage and material 0.
    pub fn with_usage(usage: LayerUsage) -> Self {
        Self {
            usage,
            ..Self::default()
        }
    }
}

// =============================================================================
// UV MATRIX
// =============================================================================

/// Affine projection from brush-local positions to texture coordinates.
///
/// `u = u_axis · (p, 1)` and `v = v_axis · (p, 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UvMatrix {
    /// Row producing the u coordinate.
    pub u_axis: DVec4,
    /// Row producing the v coordinate.
    pub v_axis: DVec4,
}

impl Default for UvMatrix {
    fn default() -> Self {
        Self::planar(DVec3::Z)
    }
}

impl UvMatrix {
    /// Planar projection onto the face plane with unit texel scale.
    ///
    /// Floors and ceilings map x/y directly; walls keep v pointing up.
    pub fn planar(normal: DVec3) -> Self {
        let (u, v) = if normal.z.abs() > 0.7 {
            let u = (DVec3::X - normal * normal.x).normalize_or_zero();
            (u, normal.cross(u))
        } else {
            let u = DVec3::Z.cross(normal).normalize_or_zero();
            (u, normal.cross(u))
        };
        Self {
            u_axis: u.extend(0.0),
            v_axis: v.extend(0.0),
        }
    }

    /// Texture coordinate of a brush-local point.
    pub fn project(&self, point: DVec3) -> [f64; 2] {
        let p = point.extend(1.0);
        [self.u_axis.dot(p), self.v_axis.dot(p)]
    }

    /// Direction of increasing u in brush-local space.
    pub fn u_direction(&self) -> DVec3 {
        self.u_axis.truncate()
    }

    /// Direction of increasing v in brush-local space.
    pub fn v_direction(&self) -> DVec3 {
        self.v_axis.truncate()
    }
}

// =============================================================================
// SURFACE DESCRIPTION
// =============================================================================

/// Everything a face carries besides its geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceDescription {
    /// Layers and materials.
    pub layers: SurfaceLayers,
    /// UV projection.
    pub uv: UvMatrix,
}

impl SurfaceDescription {
    /// Description with a planar UV projection for `normal`.
    pub fn planar(layers: SurfaceLayers, normal: DVec3) -> Self {
        Self {
            layers,
            uv: UvMatrix::planar(normal),
        }
    }
}
