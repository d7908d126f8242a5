//! Run-level error type.
//!
//! Every failure that escapes a graph run is an `EngineError`. Node-level
//! errors are wrapped with the failing node's name by the scheduler so the
//! caller can attribute the failure.

use thiserror::Error;

use crate::state::StateError;

/// Error surfaced by `CompiledGraph::run` and the session facade.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node raised an unrecovered error; the run is failed and, inside a
    /// fan-out, sibling branches were cancelled.
    #[error("node '{node}' failed: {message}")]
    NodeFailed { node: String, message: String },

    /// The run was cancelled by its owner (or a fan-out sibling failure).
    #[error("run cancelled")]
    Cancelled,

    /// A router returned a name that is not in its declared target map.
    /// Configuration error, detected at first occurrence and never swallowed.
    #[error("router after '{node}' returned unknown target '{target}'")]
    UnknownRouteTarget { node: String, target: String },

    /// A state delta violated the declared schema (e.g. undeclared field).
    #[error(transparent)]
    State(#[from] StateError),

    /// Anything else a node wants to surface verbatim.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl EngineError {
    /// Wraps an arbitrary node error with the node's name, preserving
    /// `Cancelled` so owner cancellation is not misreported as a failure.
    pub(crate) fn for_node(node: &str, err: EngineError) -> EngineError {
        match err {
            EngineError::Cancelled => EngineError::Cancelled,
            EngineError::NodeFailed { .. } => err,
            other => EngineError::NodeFailed {
                node: node.to_string(),
                message: other.to_string(),
            },
        }
    }
}
