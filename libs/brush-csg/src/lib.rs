//! # Brush CSG
//!
//! Incremental constructive solid geometry over hierarchies of convex
//! brushes.
//!
//! A scene is a forest of trees. Branches and brushes carry a boolean
//! [`Operation`]; brushes reference a convex [`Polytope`] through a
//! [`PolytopeSource`]. Every tree is evaluated into one or more
//! [`GeneratedMesh`] buffers per [`MeshQuery`].
//!
//! ## Architecture
//!
//! ```text
//! CsgHierarchy + PolytopeSource
//!       ↓ snapshot (caller thread)
//! CompactTree → BrushOrder → per-brush caches
//!       ↓ task graph (rayon)
//! dirty sets → broad phase → intersection loops → touching sets
//!       ↓
//! routing tables → fragment evaluation → mesh assembly → TreeOutput
//! ```
//!
//! Only brushes whose inputs changed, and the brushes touching them, are
//! rebuilt on a pass. Everything else is served from per-tree caches.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use brush_csg::{BrushGenerator, CsgHierarchy, CsgManager, Operation, PolytopeStore};
//! use glam::{DMat4, DVec3};
//!
//! let mut store = PolytopeStore::new();
//! let cube = store.insert(BrushGenerator::Box { size: DVec3::ONE }.generate()?);
//!
//! let mut hierarchy = CsgHierarchy::new();
//! let tree = hierarchy.create_tree();
//! let hole = hierarchy.create_brush(cube, DMat4::from_scale(DVec3::splat(0.5)), Operation::Subtractive);
//! let solid = hierarchy.create_brush(cube, DMat4::IDENTITY, Operation::Additive);
//! hierarchy.append_child(tree, solid)?;
//! hierarchy.append_child(tree, hole)?;
//!
//! let mut manager = CsgManager::default();
//! manager.update(&mut hierarchy, &store);
//! let output = manager.output(tree).unwrap();
//! ```

pub mod assembly;
pub mod broadphase;
pub mod brush;
pub mod cache;
pub mod compact;
pub mod dirty;
pub mod error;
pub mod evaluate;
pub mod geometry;
pub mod hierarchy;
pub mod intersection;
pub mod order;
pub mod pipeline;
pub mod polytope;
pub mod routing;
pub mod scheduler;

pub use assembly::{GeneratedMesh, MeshQuery, SubMesh, SurfaceParameter, TreeOutput};
pub use cache::CacheStats;
pub use error::{CsgError, CsgResult};
pub use evaluate::{BrushRender, RenderSurface};
pub use geometry::{Aabb, Plane};
pub use hierarchy::{CsgHierarchy, DirtyFlags, NodeId, NodeKind, Operation};
pub use pipeline::{BrushInput, CsgManager, PassResult};
pub use polytope::{
    BrushGenerator, LayerUsage, Polytope, PolytopeId, PolytopeSource, PolytopeStore,
    SurfaceDescription, SurfaceLayers, UvMatrix,
};
pub use routing::{Category, RoutingTable};
