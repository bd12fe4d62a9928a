//! # Mesh Assembly
//!
//! Gathers evaluated surfaces into per-query mesh buffers.
//!
//! ## Ordering
//!
//! Surfaces matching a query are sorted by (parameter value, brush order,
//! surface index), so assembly output depends only on the surfaces and never
//! on evaluation timing. Consecutive surfaces with the same parameter value
//! form one submesh.
//!
//! ## Vertex ceiling
//!
//! A mesh is closed before appending a surface would push it past the
//! query's vertex ceiling, and also on every parameter change when the query
//! asks for one mesh per parameter.

use std::sync::Arc;

use config::constants::{DEFAULT_MAX_VERTEX_COUNT, MIN_MAX_VERTEX_COUNT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;
use xxhash_rust::xxh3::Xxh3;

use crate::cache::OrderedCache;
use crate::evaluate::{BrushRender, RenderSurface};
use crate::hierarchy::NodeId;
use crate::polytope::{LayerUsage, SurfaceLayers};

// =============================================================================
// QUERIES
// =============================================================================

/// Surface attribute a query groups submeshes by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SurfaceParameter {
    /// Group by render material.
    #[default]
    RenderMaterial,
    /// Group by physics material.
    PhysicsMaterial,
    /// A single group.
    None,
}

impl SurfaceParameter {
    /// Grouping value of a surface.
    pub fn value(self, layers: &SurfaceLayers) -> u32 {
        match self {
            SurfaceParameter::RenderMaterial => layers.render_material,
            SurfaceParameter::PhysicsMaterial => layers.physics_material,
            SurfaceParameter::None => 0,
        }
    }
}

/// Selection and grouping of one output mesh set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MeshQuery {
    /// Layer bits a surface must carry.
    pub required_usage: LayerUsage,
    /// Submesh grouping key.
    pub parameter: SurfaceParameter,
    /// Start a new mesh for every parameter value.
    pub one_mesh_per_parameter: bool,
    /// Vertex ceiling per mesh.
    pub max_vertex_count: usize,
}

impl Default for MeshQuery {
    fn default() -> Self {
        Self::render()
    }
}

impl MeshQuery {
    /// Renderable surfaces grouped by render material.
    pub fn render() -> Self {
        Self {
            required_usage: LayerUsage::RENDERABLE,
            parameter: SurfaceParameter::RenderMaterial,
            one_mesh_per_parameter: false,
            max_vertex_count: DEFAULT_MAX_VERTEX_COUNT,
        }
    }

    /// Collidable surfaces, one mesh per physics material.
    pub fn collision() -> Self {
        Self {
            required_usage: LayerUsage::COLLIDABLE,
            parameter: SurfaceParameter::PhysicsMaterial,
            one_mesh_per_parameter: true,
            max_vertex_count: DEFAULT_MAX_VERTEX_COUNT,
        }
    }

    /// Effective ceiling, never below [`MIN_MAX_VERTEX_COUNT`].
    pub fn vertex_ceiling(&self) -> usize {
        self.max_vertex_count.max(MIN_MAX_VERTEX_COUNT)
    }

    /// True when a surface with these layers belongs to the query.
    pub fn selects(&self, layers: &SurfaceLayers) -> bool {
        layers.usage.contains(self.required_usage)
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

/// Contiguous range of one parameter value within a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubMesh {
    /// Parameter value shared by the range.
    pub parameter: u32,
    /// First vertex.
    pub base_vertex: u32,
    /// Vertex count.
    pub vertex_count: u32,
    /// First index.
    pub index_start: u32,
    /// Index count.
    pub index_count: u32,
    /// Hash over the surfaces' content hashes, in order.
    pub content_hash: u64,
}

/// One output mesh of a query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GeneratedMesh {
    /// Query the mesh answers.
    pub query_index: usize,
    /// Positions.
    pub positions: Vec<[f32; 3]>,
    /// Normals.
    pub normals: Vec<[f32; 3]>,
    /// Tangents with handedness.
    pub tangents: Vec<[f32; 4]>,
    /// Texture coordinates.
    pub uv0: Vec<[f32; 2]>,
    /// Triangle list into this mesh's vertices.
    pub indices: Vec<u32>,
    /// Source brush per triangle.
    pub triangle_brushes: Vec<NodeId>,
    /// Parameter ranges.
    pub submeshes: Vec<SubMesh>,
}

impl GeneratedMesh {
    fn new(query_index: usize) -> Self {
        Self {
            query_index,
            ..Self::default()
        }
    }

    /// Vertex count.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Triangle count.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    fn append(&mut self, surface: &RenderSurface) {
        let base = self.positions.len() as u32;
        self.positions.extend_from_slice(&surface.positions);
        self.normals.extend_from_slice(&surface.normals);
        self.tangents.extend_from_slice(&surface.tangents);
        self.uv0.extend_from_slice(&surface.uv0);
        self.indices.extend(surface.indices.iter().map(|&i| base + i));
        self.triangle_brushes
            .extend(std::iter::repeat(surface.brush).take(surface.triangle_count()));
    }
}

/// Everything one tree produced, per query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TreeOutput {
    /// Tree root, if the output belongs to a tree.
    pub tree: Option<NodeId>,
    /// Meshes of every query, grouped by query index.
    pub meshes: Vec<GeneratedMesh>,
}

impl TreeOutput {
    /// Meshes answering query `index`.
    pub fn meshes_for(&self, index: usize) -> impl Iterator<Item = &GeneratedMesh> + '_ {
        self.meshes.iter().filter(move |m| m.query_index == index)
    }

    /// Total vertices over every mesh.
    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(GeneratedMesh::vertex_count).sum()
    }
}

// =============================================================================
// ASSEMBLY
// =============================================================================

/// Open submesh being filled.
struct OpenSubMesh {
    submesh: SubMesh,
    hasher: Xxh3,
}

impl OpenSubMesh {
    fn start(parameter: u32, mesh: &GeneratedMesh) -> Self {
        Self {
            submesh: SubMesh {
                parameter,
                base_vertex: mesh.positions.len() as u32,
                vertex_count: 0,
                index_start: mesh.indices.len() as u32,
                index_count: 0,
                content_hash: 0,
            },
            hasher: Xxh3::new(),
        }
    }

    fn close(mut self, mesh: &mut GeneratedMesh) {
        self.submesh.vertex_count = mesh.positions.len() as u32 - self.submesh.base_vertex;
        self.submesh.index_count = mesh.indices.len() as u32 - self.submesh.index_start;
        self.submesh.content_hash = self.hasher.digest();
        mesh.submeshes.push(self.submesh);
    }
}

/// Assembles the meshes of one query.
pub fn assemble_query(
    query_index: usize,
    query: &MeshQuery,
    renders: &OrderedCache<Arc<BrushRender>>,
) -> Vec<GeneratedMesh> {
    let mut selected: Vec<(u32, u32, &RenderSurface)> = renders
        .iter()
        .flat_map(|(order, render)| {
            render
                .surfaces
                .iter()
                .filter(|surface| query.selects(&surface.layers))
                .map(move |surface| (query.parameter.value(&surface.layers), order, surface))
        })
        .collect();
    selected.sort_by_key(|&(parameter, order, surface)| (parameter, order, surface.surface_index));

    let ceiling = query.vertex_ceiling();
    let mut meshes = Vec::new();
    let mut mesh = GeneratedMesh::new(query_index);
    let mut open: Option<OpenSubMesh> = None;

    for (parameter, _, surface) in selected {
        let parameter_changed = open
            .as_ref()
            .is_some_and(|o| o.submesh.parameter != parameter);
        let over_ceiling = mesh.vertex_count() + surface.vertex_count() > ceiling;
        if !mesh.is_empty()
            && (over_ceiling || (parameter_changed && query.one_mesh_per_parameter))
        {
            if let Some(current) = open.take() {
                current.close(&mut mesh);
            }
            meshes.push(std::mem::replace(&mut mesh, GeneratedMesh::new(query_index)));
        } else if parameter_changed {
            if let Some(current) = open.take() {
                current.close(&mut mesh);
            }
        }

        let current = open.get_or_insert_with(|| OpenSubMesh::start(parameter, &mesh));
        current.hasher.update(&surface.content_hash.to_le_bytes());
        mesh.append(surface);
    }

    if let Some(current) = open.take() {
        current.close(&mut mesh);
    }
    if !mesh.is_empty() {
        meshes.push(mesh);
    }
    meshes
}

/// Assembles every query of a tree.
///
/// Queries are assembled in parallel; the output keeps query order.
pub fn assemble(
    tree: Option<NodeId>,
    renders: &OrderedCache<Arc<BrushRender>>,
    queries: &[MeshQuery],
) -> TreeOutput {
    let meshes: Vec<GeneratedMesh> = queries
        .par_iter()
        .enumerate()
        .flat_map_iter(|(index, query)| assemble_query(index, query, renders))
        .collect();
    debug!(
        tree = ?tree,
        queries = queries.len(),
        meshes = meshes.len(),
        "assembled meshes"
    );
    TreeOutput { tree, meshes }
}
