//! # Polytope Store
//!
//! Owns polytopes keyed by a stable [`PolytopeId`] and tracks a generation
//! counter per id so the pipeline can detect edits.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Polytope;
use crate::error::{CsgError, CsgResult};

/// Stable identifier of a polytope in a [`PolytopeStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolytopeId(pub u32);

/// Read access to polytopes, as consumed by the update pipeline.
pub trait PolytopeSource: Send + Sync {
    /// Current polytope for `id`, if any.
    fn get_polytope(&self, id: PolytopeId) -> Option<Arc<Polytope>>;

    /// Current generation for `id`. Advances on every replacement.
    fn generation(&self, id: PolytopeId) -> Option<u64>;
}

#[derive(Debug, Clone)]
struct StoreEntry {
    polytope: Arc<Polytope>,
    generation: u64,
}

/// In-memory [`PolytopeSource`].
#[derive(Debug, Clone, Default)]
pub struct PolytopeStore {
    entries: FxHashMap<PolytopeId, StoreEntry>,
    next_id: u32,
}

impl PolytopeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a polytope under a fresh id at generation 1.
    pub fn insert(&mut self, polytope: Polytope) -> PolytopeId {
        let id = PolytopeId(self.next_id);
        self.next_id += 1;
        self.entries.insert(
            id,
            StoreEntry {
                polytope: Arc::new(polytope),
                generation: 1,
            },
        );
        id
    }

    /// Replaces the polytope for `id` and advances its generation.
    ///
    /// Returns the new generation.
    pub fn replace(&mut self, id: PolytopeId, polytope: Polytope) -> CsgResult<u64> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(CsgError::UnknownPolytope(id))?;
        entry.polytope = Arc::new(polytope);
        entry.generation += 1;
        debug!(id = id.0, generation = entry.generation, "polytope replaced");
        Ok(entry.generation)
    }

    /// Removes a polytope. Brushes still referencing it produce no geometry.
    pub fn remove(&mut self, id: PolytopeId) -> Option<Arc<Polytope>> {
        self.entries.remove(&id).map(|entry| entry.polytope)
    }

    /// Number of stored polytopes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PolytopeSource for PolytopeStore {
    fn get_polytope(&self, id: PolytopeId) -> Option<Arc<Polytope>> {
        self.entries.get(&id).map(|entry| Arc::clone(&entry.polytope))
    }

    fn generation(&self, id: PolytopeId) -> Option<u64> {
        self.entries.get(&id).map(|entry| entry.generation)
    }
}
