//! # Polytope
//!
//! Immutable convex solid descriptions shared between brushes.
//!
//! A [`Polytope`] stores its half-space planes, its vertices and one convex
//! face per plane. Face loops are counter-clockwise around the outward
//! normal. Polytopes are shared via `Arc` and replaced wholesale when their
//! generation advances in the [`PolytopeStore`].
//!
//! ## Example
//!
//! ```rust
//! use brush_csg::polytope::{BrushGenerator, PolytopeStore, PolytopeSource};
//! use glam::DVec3;
//!
//! let mut store = PolytopeStore::new();
//! let cube = BrushGenerator::Box { size: DVec3::ONE }.generate().unwrap();
//! let id = store.insert(cube);
//! assert_eq!(store.generation(id), Some(1));
//! ```

mod generator;
mod store;
mod surface;

pub use generator::BrushGenerator;
pub use store::{PolytopeId, PolytopeSource, PolytopeStore};
pub use surface::{LayerUsage, SurfaceDescription, SurfaceLayers, UvMatrix};

use config::constants::{AREA_EPSILON, DETERMINANT_EPSILON, DISTANCE_EPSILON};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{CsgError, CsgResult};
use crate::geometry::clip::{loop_area, newell_normal};
use crate::geometry::plane::intersect_planes;
use crate::geometry::{Aabb, Coincidence, Plane};

// =============================================================================
// FACE
// =============================================================================

/// One convex face of a polytope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Vertex indices, counter-clockwise around the outward normal.
    pub vertices: SmallVec<[u32; 8]>,
    /// Material, layers and UV mapping.
    pub surface: SurfaceDescription,
}

// =============================================================================
// POLYTOPE
// =============================================================================

/// A convex solid: planes, vertices and one face per plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polytope {
    planes: Vec<Plane>,
    vertices: Vec<DVec3>,
    faces: Vec<Face>,
    bounds: Aabb,
}

impl Polytope {
    /// Builds a polytope from explicit vertices and face loops.
    ///
    /// Planes are derived from the loops. Faces must be convex and wound
    /// counter-clockwise when seen from outside.
    pub fn from_faces(vertices: Vec<DVec3>, faces: Vec<Face>) -> CsgResult<Self> {
        if faces.len() < 4 {
            return Err(CsgError::degenerate(format!(
                "a closed convex solid needs at least 4 faces, got {}",
                faces.len()
            )));
        }

        let mut planes = Vec::with_capacity(faces.len());
        for (index, face) in faces.iter().enumerate() {
            if face.vertices.len() < 3 {
                return Err(CsgError::degenerate(format!(
                    "face {index} has {} vertices",
                    face.vertices.len()
                )));
            }
            let mut positions: SmallVec<[DVec3; 8]> = SmallVec::new();
            for &vertex in &face.vertices {
                let position = vertices.get(vertex as usize).ok_or_else(|| {
                    CsgError::degenerate(format!("face {index} references vertex {vertex}"))
                })?;
                positions.push(*position);
            }
            let normal = newell_normal(&positions);
            let plane = Plane::from_normal_and_point(normal, positions[0])
                .ok_or_else(|| CsgError::degenerate(format!("face {index} has no area")))?;
            if loop_area(&positions, plane.normal()) < AREA_EPSILON {
                return Err(CsgError::degenerate(format!("face {index} has no area")));
            }
            planes.push(plane);
        }

        let bounds = Aabb::from_points(vertices.iter());
        let polytope = Self {
            planes,
            vertices,
            faces,
            bounds,
        };
        if polytope.volume() < AREA_EPSILON {
            return Err(CsgError::degenerate("polytope has no volume"));
        }
        Ok(polytope)
    }

    /// Builds the convex solid bounded by a set of half-spaces.
    ///
    /// Vertices are found by intersecting every plane triple and keeping the
    /// points behind all planes. Planes touching fewer than three vertices
    /// are redundant and removed.
    ///
    /// # Arguments
    ///
    /// * `planes` - Outward-facing half-space planes
    /// * `layers` - Surface layers applied to every face
    ///
    /// # Errors
    ///
    /// Returns [`CsgError::DegenerateGeometry`] when the half-spaces do not
    /// bound a solid with volume.
    pub fn from_planes(planes: &[Plane], layers: SurfaceLayers) -> CsgResult<Self> {
        let mut unique: Vec<Plane> = Vec::with_capacity(planes.len());
        for plane in planes {
            if !unique
                .iter()
                .any(|kept| kept.coincidence(plane) == Coincidence::Aligned)
            {
                unique.push(*plane);
            }
        }

        let mut vertices: Vec<DVec3> = Vec::new();
        for i in 0..unique.len() {
            for j in (i + 1)..unique.len() {
                for k in (j + 1)..unique.len() {
                    let Some(point) =
                        intersect_planes(&unique[i], &unique[j], &unique[k], DETERMINANT_EPSILON)
                    else {
                        continue;
                    };
                    let inside = unique
                        .iter()
                        .all(|plane| plane.signed_distance(point) <= DISTANCE_EPSILON);
                    if inside && !vertices.iter().any(|v| v.distance(point) < DISTANCE_EPSILON) {
                        vertices.push(point);
                    }
                }
            }
        }

        let mut faces = Vec::with_capacity(unique.len());
        for plane in &unique {
            let mut on_plane: Vec<u32> = (0..vertices.len() as u32)
                .filter(|&index| {
                    plane.signed_distance(vertices[index as usize]).abs() < DISTANCE_EPSILON
                })
                .collect();
            if on_plane.len() < 3 {
                continue;
            }
            sort_counter_clockwise(&mut on_plane, &vertices, plane.normal());
            faces.push(Face {
                vertices: on_plane.into_iter().collect(),
                surface: SurfaceDescription::planar(layers, plane.normal()),
            });
        }

        Self::from_faces(vertices, faces)
    }

    /// Returns a copy with one face's surface description replaced.
    pub fn with_surface(mut self, face: usize, surface: SurfaceDescription) -> CsgResult<Self> {
        let count = self.faces.len();
        let target = self.faces.get_mut(face).ok_or_else(|| {
            CsgError::invalid_parameters(format!("face {face} out of range ({count} faces)"))
        })?;
        target.surface = surface;
        Ok(self)
    }

    /// Returns a copy with the given layers applied to every face.
    pub fn with_layers(mut self, layers: SurfaceLayers) -> Self {
        for face in &mut self.faces {
            face.surface.layers = layers;
        }
        self
    }

    /// Half-space planes, one per face.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Vertex positions in brush-local space.
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Faces, parallel to [`Polytope::planes`].
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Local-space bounds.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Enclosed volume.
    pub fn volume(&self) -> f64 {
        let mut volume = 0.0;
        for (face, plane) in self.faces.iter().zip(&self.planes) {
            let positions: SmallVec<[DVec3; 8]> = face
                .vertices
                .iter()
                .map(|&index| self.vertices[index as usize])
                .collect();
            volume += loop_area(&positions, plane.normal()) * plane.w() / 3.0;
        }
        volume
    }
}

/// Orders vertex indices counter-clockwise around `normal`.
fn sort_counter_clockwise(indices: &mut [u32], vertices: &[DVec3], normal: DVec3) {
    let centroid = indices
        .iter()
        .fold(DVec3::ZERO, |sum, &index| sum + vertices[index as usize])
        / indices.len() as f64;
    let u = normal.any_orthonormal_vector();
    let v = normal.cross(u);
    indices.sort_by(|&a, &b| {
        let angle = |index: u32| {
            let offset = vertices[index as usize] - centroid;
            offset.dot(v).atan2(offset.dot(u))
        };
        angle(a).total_cmp(&angle(b))
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn box_planes(half: f64) -> Vec<Plane> {
        [DVec3::X, -DVec3::X, DVec3::Y, -DVec3::Y, DVec3::Z, -DVec3::Z]
            .into_iter()
            .map(|normal| Plane::new(normal, half).unwrap())
            .collect()
    }

    #[test]
    fn test_from_planes_cube() {
        let cube = Polytope::from_planes(&box_planes(0.5), SurfaceLayers::default()).unwrap();
        assert_eq!(cube.vertices().len(), 8);
        assert_eq!(cube.faces().len(), 6);
        assert_relative_eq!(cube.volume(), 1.0, epsilon = 1e-9);
        assert_eq!(cube.bounds().min, DVec3::splat(-0.5));
    }

    #[test]
    fn test_from_planes_faces_are_counter_clockwise() {
        let cube = Polytope::from_planes(&box_planes(1.0), SurfaceLayers::default()).unwrap();
        for (face, plane) in cube.faces().iter().zip(cube.planes()) {
            let positions: Vec<DVec3> = face
                .vertices
                .iter()
                .map(|&i| cube.vertices()[i as usize])
                .collect();
            let normal = newell_normal(&positions).normalize();
            assert_relative_eq!(normal.dot(plane.normal()), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_from_planes_removes_redundant_plane() {
        let mut planes = box_planes(0.5);
        planes.push(Plane::new(DVec3::X, 3.0).unwrap());
        planes.push(Plane::new(DVec3::X, 0.5).unwrap());
        let cube = Polytope::from_planes(&planes, SurfaceLayers::default()).unwrap();
        assert_eq!(cube.planes().len(), 6);
    }

    #[test]
    fn test_from_planes_unbounded_is_degenerate() {
        let planes = &box_planes(0.5)[..5];
        let result = Polytope::from_planes(planes, SurfaceLayers::default());
        assert!(matches!(result, Err(CsgError::DegenerateGeometry { .. })));
    }

    #[test]
    fn test_from_planes_tetrahedron() {
        let planes = vec![
            Plane::new(-DVec3::X, 0.0).unwrap(),
            Plane::new(-DVec3::Y, 0.0).unwrap(),
            Plane::new(-DVec3::Z, 0.0).unwrap(),
            Plane::new(DVec3::ONE, 1.0).unwrap(),
        ];
        let tetra = Polytope::from_planes(&planes, SurfaceLayers::default()).unwrap();
        assert_eq!(tetra.vertices().len(), 4);
        assert_relative_eq!(tetra.volume(), 1.0 / 6.0, epsilon = 1e-9);
    }

    #[test]
    fn test_with_surface_out_of_range() {
        let cube = Polytope::from_planes(&box_planes(0.5), SurfaceLayers::default()).unwrap();
        let surface = cube.faces()[0].surface;
        assert!(cube.clone().with_surface(0, surface).is_ok());
        assert!(matches!(
            cube.with_surface(6, surface),
            Err(CsgError::InvalidParameters { .. })
        ));
    }
}
