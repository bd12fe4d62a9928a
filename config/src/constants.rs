//! # Configuration Constants
//!
//! Centralized constants for the brush CSG pipeline. All clipping
//! tolerances, hashing precision and output limits are defined here.
//!
//! ## Categories
//!
//! - **Precision**: Plane distance, normal and area tolerances
//! - **Hashing**: Quantization used for content hashes
//! - **Limits**: Output vertex ceilings and generator bounds

// =============================================================================
// PRECISION CONSTANTS
// =============================================================================

/// Signed distance tolerance for point/plane classification.
///
/// Vertices closer than this to a plane are classified as lying on it, and
/// vertices created by clipping are snapped onto the clipping plane.
///
/// # Example
///
/// ```rust
/// use config::constants::DISTANCE_EPSILON;
///
/// fn on_plane(signed_distance: f64) -> bool {
///     signed_distance.abs() < DISTANCE_EPSILON
/// }
///
/// assert!(on_plane(5e-5));
/// assert!(!on_plane(1e-3));
/// ```
pub const DISTANCE_EPSILON: f64 = 1e-4;

/// Tolerance on `1 - |dot(n1, n2)|` when deciding whether two planes are parallel.
///
/// # Example
///
/// ```rust
/// use config::constants::NORMAL_EPSILON;
///
/// let dot: f64 = 0.999_999_9;
/// assert!(1.0 - dot < NORMAL_EPSILON);
/// ```
pub const NORMAL_EPSILON: f64 = 1e-5;

/// Minimum area of a clipped loop or fragment.
///
/// Loops below this area are dropped silently as numerically degenerate.
pub const AREA_EPSILON: f64 = 1e-7;

/// Minimum absolute determinant when intersecting three planes.
pub const DETERMINANT_EPSILON: f64 = 1e-9;

/// Distance under which two vertices are merged.
///
/// Also the grid size used to quantize geometry before hashing, so edits
/// smaller than this do not change content hashes.
///
/// # Example
///
/// ```rust
/// use config::constants::MERGE_EPSILON;
///
/// fn should_merge(a: [f64; 3], b: [f64; 3]) -> bool {
///     let dx = a[0] - b[0];
///     let dy = a[1] - b[1];
///     let dz = a[2] - b[2];
///     (dx * dx + dy * dy + dz * dz).sqrt() < MERGE_EPSILON
/// }
///
/// assert!(should_merge([0.0; 3], [1e-4, 0.0, 0.0]));
/// ```
pub const MERGE_EPSILON: f64 = 5e-4;

// =============================================================================
// LIMIT CONSTANTS
// =============================================================================

/// Default hard vertex ceiling per generated mesh.
///
/// Some physics back ends reject meshes above this size; assembly splits
/// query groups before they reach it.
///
/// # Example
///
/// ```rust
/// use config::constants::DEFAULT_MAX_VERTEX_COUNT;
///
/// let vertex_count: usize = 40_000;
/// let meshes_needed = vertex_count.div_ceil(DEFAULT_MAX_VERTEX_COUNT);
/// assert_eq!(meshes_needed, 2);
/// ```
pub const DEFAULT_MAX_VERTEX_COUNT: usize = 32_000;

/// Smallest vertex ceiling a query may request.
///
/// A single convex fragment must always fit into one mesh.
pub const MIN_MAX_VERTEX_COUNT: usize = 1_024;

/// Minimum number of sides for a cylinder brush.
pub const MIN_CYLINDER_SIDES: u32 = 3;

/// Maximum number of sides for a cylinder brush.
///
/// Keeps cap polygons well below [`MIN_MAX_VERTEX_COUNT`].
pub const MAX_CYLINDER_SIDES: u32 = 512;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Quantizes a coordinate onto the merge grid for hashing.
///
/// Rounds to the nearest grid cell. Two values closer than
/// [`MERGE_EPSILON`] still land in different cells when they straddle a
/// half-cell boundary, so hashes built on this are stable only for values
/// away from those boundaries.
///
/// # Example
///
/// ```rust
/// use config::constants::{quantize, MERGE_EPSILON};
///
/// assert_eq!(quantize(1.0), quantize(1.0 + MERGE_EPSILON * 0.2));
/// assert_ne!(quantize(1.0), quantize(1.0 + MERGE_EPSILON * 2.0));
/// ```
#[inline]
pub fn quantize(value: f64) -> i64 {
    (value / MERGE_EPSILON).round() as i64
}

/// Checks if a signed distance lies within [`DISTANCE_EPSILON`] of zero.
///
/// # Example
///
/// ```rust
/// use config::constants::on_plane;
///
/// assert!(on_plane(-5e-5));
/// assert!(!on_plane(0.1));
/// ```
#[inline]
pub fn on_plane(signed_distance: f64) -> bool {
    signed_distance.abs() < DISTANCE_EPSILON
}
