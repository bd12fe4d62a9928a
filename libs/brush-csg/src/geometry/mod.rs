//! # Geometry Primitives
//!
//! Planes, bounding boxes and convex loop clipping shared by every stage
//! of the pipeline. All computations use f64.

pub mod aabb;
pub mod clip;
pub mod plane;

pub use aabb::Aabb;
pub use clip::{Loop, LoopSplit};
pub use plane::{Classification, Coincidence, Plane};
