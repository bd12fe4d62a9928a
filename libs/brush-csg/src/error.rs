//! # CSG Errors
//!
//! Error types for hierarchy mutation, polytope construction and pass tasks.
//!
//! ## Error Policy
//!
//! Errors are returned from the mutation and construction APIs only. The
//! update pipeline never surfaces them to the caller: a failing element is
//! skipped, logged, and produces no geometry while the rest of the tree
//! continues.

use thiserror::Error;

use crate::hierarchy::NodeId;
use crate::polytope::PolytopeId;

/// Errors that can occur while building or mutating CSG inputs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CsgError {
    /// A node handle is stale or was never issued by this hierarchy.
    #[error("Invalid node reference: {node:?}")]
    InvalidNode {
        /// The offending handle.
        node: NodeId,
    },

    /// A node exists but is the wrong kind for the requested operation.
    #[error("Node {node:?} is a {actual}, expected {expected}")]
    WrongNodeKind {
        /// The offending handle.
        node: NodeId,
        /// What the operation required.
        expected: &'static str,
        /// What the node actually is.
        actual: &'static str,
    },

    /// Attaching the node would make it its own ancestor.
    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        /// Prospective parent.
        parent: NodeId,
        /// Node being attached.
        child: NodeId,
    },

    /// A polytope id is not known to the store.
    #[error("Unknown polytope: {0:?}")]
    UnknownPolytope(PolytopeId),

    /// Geometry is too degenerate to form a convex solid.
    #[error("Degenerate geometry: {message}")]
    DegenerateGeometry {
        /// What went wrong.
        message: String,
    },

    /// Generator parameters are out of range.
    #[error("Invalid generator parameters: {message}")]
    InvalidParameters {
        /// What went wrong.
        message: String,
    },

    /// A pass task failed; its dependents were skipped.
    #[error("Task '{task}' failed: {message}")]
    TaskFailed {
        /// Name of the failing task.
        task: &'static str,
        /// Failure description.
        message: String,
    },
}

impl CsgError {
    /// Creates a degenerate geometry error.
    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::DegenerateGeometry {
            message: message.into(),
        }
    }

    /// Creates an invalid parameters error.
    pub fn invalid_parameters(message: impl Into<String>) -> Self {
        Self::InvalidParameters {
            message: message.into(),
        }
    }

    /// Creates a task failure error.
    pub fn task_failed(task: &'static str, message: impl Into<String>) -> Self {
        Self::TaskFailed {
            task,
            message: message.into(),
        }
    }
}

/// Result type alias for CSG operations.
pub type CsgResult<T> = Result<T, CsgError>;
