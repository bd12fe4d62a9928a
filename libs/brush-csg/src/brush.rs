//! # Tree-Space Brush
//!
//! A polytope placed in tree space: transformed planes, vertices, face loops
//! and bounds. Built once per geometry change and shared via `Arc`.

use std::sync::Arc;

use config::constants::{DETERMINANT_EPSILON, DISTANCE_EPSILON};
use glam::{DMat3, DMat4, DVec3};

use crate::error::{CsgError, CsgResult};
use crate::geometry::{Aabb, Loop, Plane};
use crate::hierarchy::NodeId;
use crate::polytope::{Polytope, SurfaceDescription};

/// One face of a [`TreeBrush`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeFace {
    /// Carrier plane in tree space.
    pub plane: Plane,
    /// Counter-clockwise loop in tree space.
    pub vertices: Loop,
    /// Surface description from the polytope.
    pub surface: SurfaceDescription,
}

/// A brush's polytope transformed into tree space.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeBrush {
    node: NodeId,
    planes: Vec<Plane>,
    faces: Vec<TreeFace>,
    vertices: Vec<DVec3>,
    bounds: Aabb,
    local_to_tree: DMat4,
    tree_to_local: DMat4,
    normal_matrix: DMat3,
}

impl TreeBrush {
    /// Places `polytope` into tree space.
    ///
    /// Mirroring transforms reverse face loops so they stay counter-clockwise
    /// around the transformed outward normals.
    ///
    /// # Errors
    ///
    /// Returns [`CsgError::DegenerateGeometry`] for singular transforms.
    pub fn new(node: NodeId, polytope: &Polytope, local_to_tree: DMat4) -> CsgResult<Self> {
        let linear = DMat3::from_mat4(local_to_tree);
        let determinant = linear.determinant();
        if !determinant.is_finite() || determinant.abs() < DETERMINANT_EPSILON {
            return Err(CsgError::degenerate(format!(
                "singular brush transform (determinant {determinant})"
            )));
        }
        let normal_matrix = linear.inverse().transpose();
        let tree_to_local = local_to_tree.inverse();
        let mirrored = determinant < 0.0;

        let vertices: Vec<DVec3> = polytope
            .vertices()
            .iter()
            .map(|&v| local_to_tree.transform_point3(v))
            .collect();

        let mut planes = Vec::with_capacity(polytope.planes().len());
        let mut faces = Vec::with_capacity(polytope.faces().len());
        for (face, local_plane) in polytope.faces().iter().zip(polytope.planes()) {
            let plane = local_plane
                .transformed(&local_to_tree, &normal_matrix)
                .ok_or_else(|| CsgError::degenerate("face plane collapsed under transform"))?;
            let mut loop_vertices: Loop = face
                .vertices
                .iter()
                .map(|&index| vertices[index as usize])
                .collect();
            if mirrored {
                loop_vertices.reverse();
            }
            planes.push(plane);
            faces.push(TreeFace {
                plane,
                vertices: loop_vertices,
                surface: face.surface,
            });
        }

        let bounds = Aabb::from_points(vertices.iter());
        Ok(Self {
            node,
            planes,
            faces,
            vertices,
            bounds,
            local_to_tree,
            tree_to_local,
            normal_matrix,
        })
    }

    /// Convenience for building an `Arc` directly.
    pub fn shared(node: NodeId, polytope: &Polytope, local_to_tree: DMat4) -> CsgResult<Arc<Self>> {
        Self::new(node, polytope, local_to_tree).map(Arc::new)
    }

    /// Hierarchy handle of the brush.
    pub fn node(&self) -> NodeId {
        self.node
    }

    /// Outward planes in tree space.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Faces in tree space, parallel to [`TreeBrush::planes`].
    pub fn faces(&self) -> &[TreeFace] {
        &self.faces
    }

    /// Vertices in tree space.
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Tree-space bounds.
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Brush-local to tree space.
    pub fn local_to_tree(&self) -> DMat4 {
        self.local_to_tree
    }

    /// Tree space to brush-local.
    pub fn tree_to_local(&self) -> DMat4 {
        self.tree_to_local
    }

    /// Maps a brush-local direction to tree space.
    pub fn direction_to_tree(&self, direction: DVec3) -> DVec3 {
        self.local_to_tree.transform_vector3(direction)
    }

    /// Inverse transpose of the linear part, for normals.
    pub fn normal_matrix(&self) -> DMat3 {
        self.normal_matrix
    }

    /// True when the point is behind or on every plane.
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(point) <= DISTANCE_EPSILON)
    }
}
