//! # Config Crate
//!
//! Centralized configuration constants for the brush CSG pipeline.
//! Every tolerance, ceiling and tunable limit lives here so that the
//! clipping, categorization and assembly stages agree on the same numbers.
//!
//! ## Usage
//!
//! ```rust
//! use config::constants::{DISTANCE_EPSILON, MERGE_EPSILON, DEFAULT_MAX_VERTEX_COUNT};
//!
//! // Points closer than DISTANCE_EPSILON to a plane are treated as on it
//! let distance: f64 = 0.00005;
//! assert!(distance.abs() < DISTANCE_EPSILON);
//!
//! // Output meshes are split before they reach the vertex ceiling
//! assert_eq!(DEFAULT_MAX_VERTEX_COUNT, 32_000);
//! assert!(MERGE_EPSILON > DISTANCE_EPSILON);
//! ```
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: All constants defined once, used everywhere
//! - **Deterministic**: Hash quantization is derived from the merge epsilon
//! - **Well-Documented**: Every constant has clear documentation

pub mod constants;
