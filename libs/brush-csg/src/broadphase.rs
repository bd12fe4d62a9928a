//! # Broad Phase
//!
//! Finds brush pairs whose padded tree-space bounds overlap.
//!
//! Only pairs involving a queried brush are produced. Pairs are canonical
//! (lower order first), deduplicated and sorted so downstream stages see a
//! deterministic sequence regardless of thread scheduling.

use config::constants::DISTANCE_EPSILON;
use rayon::prelude::*;

use crate::cache::OrderedCache;
use crate::geometry::Aabb;

/// Canonical brush pair by order index, `a < b`.
pub type BrushPair = (u32, u32);

/// Pads raw bounds for overlap tests.
pub fn padded_bounds(bounds: Aabb) -> Aabb {
    bounds.padded(DISTANCE_EPSILON)
}

/// Orders a pair canonically.
#[inline]
pub fn canonical(a: u32, b: u32) -> BrushPair {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Tests every brush in `queries` against every brush with bounds.
///
/// Brushes without cached bounds (no geometry) never pair.
pub fn find_pairs(queries: &[u32], bounds: &OrderedCache<Aabb>) -> Vec<BrushPair> {
    let mut pairs: Vec<BrushPair> = queries
        .par_iter()
        .flat_map_iter(|&query| {
            let query_bounds = bounds.get(query).copied();
            bounds.iter().filter_map(move |(other, other_bounds)| {
                let query_bounds = query_bounds?;
                (other != query && query_bounds.overlaps(other_bounds))
                    .then(|| canonical(query, other))
            })
        })
        .collect();
    pairs.sort_unstable();
    pairs.dedup();
    pairs
}
