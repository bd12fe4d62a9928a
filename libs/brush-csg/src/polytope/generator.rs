//! # Brush Generators
//!
//! Closed set of convex shapes that can be turned into a [`Polytope`].

use std::f64::consts::TAU;

use config::constants::{DISTANCE_EPSILON, MAX_CYLINDER_SIDES, MIN_CYLINDER_SIDES};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{Face, Polytope, SurfaceDescription, SurfaceLayers};
use crate::error::{CsgError, CsgResult};
use crate::geometry::clip::newell_normal;
use crate::geometry::Plane;

/// Convex shape parameters.
///
/// All shapes are centered on the local origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BrushGenerator {
    /// Axis-aligned box.
    Box {
        /// Edge lengths along x, y and z.
        size: DVec3,
    },
    /// Prism approximating a cylinder along z.
    Cylinder {
        /// Circumradius of the cross-section.
        radius: f64,
        /// Extent along z.
        height: f64,
        /// Number of side faces.
        sides: u32,
    },
    /// Intersection of arbitrary half-spaces.
    Planes {
        /// Outward-facing planes.
        planes: Vec<Plane>,
    },
}

impl BrushGenerator {
    /// Generates the polytope with default surface layers.
    pub fn generate(&self) -> CsgResult<Polytope> {
        self.generate_with_layers(SurfaceLayers::default())
    }

    /// Generates the polytope with `layers` on every face.
    ///
    /// # Errors
    ///
    /// Returns [`CsgError::InvalidParameters`] for non-positive sizes or a
    /// side count outside the supported range, and
    /// [`CsgError::DegenerateGeometry`] when custom planes bound no volume.
    pub fn generate_with_layers(&self, layers: SurfaceLayers) -> CsgResult<Polytope> {
        match self {
            BrushGenerator::Box { size } => box_polytope(*size, layers),
            BrushGenerator::Cylinder {
                radius,
                height,
                sides,
            } => cylinder_polytope(*radius, *height, *sides, layers),
            BrushGenerator::Planes { planes } => Polytope::from_planes(planes, layers),
        }
    }
}

fn check_extent(name: &str, value: f64) -> CsgResult<()> {
    if value.is_finite() && value > DISTANCE_EPSILON {
        Ok(())
    } else {
        Err(CsgError::invalid_parameters(format!(
            "{name} must be positive, got {value}"
        )))
    }
}

fn face(vertices: &[DVec3], indices: &[u32], layers: SurfaceLayers) -> Face {
    let positions: SmallVec<[DVec3; 8]> =
        indices.iter().map(|&i| vertices[i as usize]).collect();
    let normal = newell_normal(&positions).normalize_or_zero();
    Face {
        vertices: indices.iter().copied().collect(),
        surface: SurfaceDescription::planar(layers, normal),
    }
}

fn box_polytope(size: DVec3, layers: SurfaceLayers) -> CsgResult<Polytope> {
    check_extent("box width", size.x)?;
    check_extent("box depth", size.y)?;
    check_extent("box height", size.z)?;

    let half = size * 0.5;
    // Corner index bits: 1 = +x, 2 = +y, 4 = +z
    let vertices: Vec<DVec3> = (0..8u32)
        .map(|corner| {
            DVec3::new(
                if corner & 1 != 0 { half.x } else { -half.x },
                if corner & 2 != 0 { half.y } else { -half.y },
                if corner & 4 != 0 { half.z } else { -half.z },
            )
        })
        .collect();

    const LOOPS: [[u32; 4]; 6] = [
        [1, 3, 7, 5],
        [0, 4, 6, 2],
        [2, 6, 7, 3],
        [0, 1, 5, 4],
        [4, 5, 7, 6],
        [0, 2, 3, 1],
    ];
    let faces = LOOPS
        .iter()
        .map(|indices| face(&vertices, indices, layers))
        .collect();
    Polytope::from_faces(vertices, faces)
}

fn cylinder_polytope(radius: f64, height: f64, sides: u32, layers: SurfaceLayers) -> CsgResult<Polytope> {
    check_extent("cylinder radius", radius)?;
    check_extent("cylinder height", height)?;
    if !(MIN_CYLINDER_SIDES..=MAX_CYLINDER_SIDES).contains(&sides) {
        return Err(CsgError::invalid_parameters(format!(
            "cylinder sides must be in {MIN_CYLINDER_SIDES}..={MAX_CYLINDER_SIDES}, got {sides}"
        )));
    }

    let half = height * 0.5;
    let mut vertices = Vec::with_capacity(sides as usize * 2);
    for z in [-half, half] {
        for i in 0..sides {
            let angle = TAU * f64::from(i) / f64::from(sides);
            vertices.push(DVec3::new(radius * angle.cos(), radius * angle.sin(), z));
        }
    }

    let mut faces = Vec::with_capacity(sides as usize + 2);
    for i in 0..sides {
        let next = (i + 1) % sides;
        faces.push(face(&vertices, &[i, next, sides + next, sides + i], layers));
    }
    let top: Vec<u32> = (sides..2 * sides).collect();
    let bottom: Vec<u32> = (0..sides).rev().collect();
    faces.push(face(&vertices, &top, layers));
    faces.push(face(&vertices, &bottom, layers));

    Polytope::from_faces(vertices, faces)
}
