//! Shared scene builder for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use brush_csg::{
    BrushGenerator, CsgHierarchy, CsgManager, GeneratedMesh, MeshQuery, NodeId, Operation,
    PassResult, PolytopeId, PolytopeStore, TreeOutput,
};
use glam::{DMat4, DVec3, Vec3};

pub struct Scene {
    pub store: PolytopeStore,
    pub hierarchy: CsgHierarchy,
    pub manager: CsgManager,
    pub tree: NodeId,
}

impl Scene {
    pub fn new() -> Self {
        Self::with_queries(vec![MeshQuery::render()])
    }

    pub fn with_queries(queries: Vec<MeshQuery>) -> Self {
        let mut hierarchy = CsgHierarchy::new();
        let tree = hierarchy.create_tree();
        Self {
            store: PolytopeStore::new(),
            hierarchy,
            manager: CsgManager::new(queries),
            tree,
        }
    }

    pub fn cube(&mut self, size: f64) -> PolytopeId {
        self.store.insert(
            BrushGenerator::Box {
                size: DVec3::splat(size),
            }
            .generate()
            .unwrap(),
        )
    }

    /// Adds a brush under the tree root.
    pub fn add(&mut self, polytope: PolytopeId, offset: DVec3, operation: Operation) -> NodeId {
        let brush = self
            .hierarchy
            .create_brush(polytope, DMat4::from_translation(offset), operation);
        self.hierarchy.append_child(self.tree, brush).unwrap();
        brush
    }

    /// Adds a fresh cube of `size` under the tree root.
    pub fn add_cube(&mut self, size: f64, offset: DVec3, operation: Operation) -> NodeId {
        let cube = self.cube(size);
        self.add(cube, offset, operation)
    }

    pub fn update(&mut self) -> Vec<PassResult> {
        self.manager.update(&mut self.hierarchy, &self.store)
    }

    pub fn output(&self) -> Arc<TreeOutput> {
        self.manager.output(self.tree).unwrap()
    }
}

fn triangles(mesh: &GeneratedMesh) -> impl Iterator<Item = [DVec3; 3]> + '_ {
    mesh.indices.chunks_exact(3).map(|tri| {
        [0, 1, 2].map(|k| Vec3::from_array(mesh.positions[tri[k] as usize]).as_dvec3())
    })
}

/// Signed volume enclosed by the meshes of query 0.
pub fn volume(output: &TreeOutput) -> f64 {
    output
        .meshes_for(0)
        .flat_map(triangles)
        .map(|[a, b, c]| a.dot(b.cross(c)) / 6.0)
        .sum()
}

/// Smallest triangle area over the meshes of query 0.
pub fn min_triangle_area(output: &TreeOutput) -> f64 {
    output
        .meshes_for(0)
        .flat_map(triangles)
        .map(|[a, b, c]| 0.5 * (b - a).cross(c - a).length())
        .fold(f64::INFINITY, f64::min)
}

/// Per-mesh counts and submesh hashes, for comparing outputs.
pub fn fingerprint(output: &TreeOutput) -> Vec<(usize, usize, usize, Vec<u64>)> {
    output
        .meshes
        .iter()
        .map(|mesh| {
            (
                mesh.query_index,
                mesh.vertex_count(),
                mesh.triangle_count(),
                mesh.submeshes.iter().map(|s| s.content_hash).collect(),
            )
        })
        .collect()
}
