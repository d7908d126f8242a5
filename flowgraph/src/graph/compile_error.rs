//! Graph compilation error.
//!
//! Returned by `GraphBuilder::compile` when the node/edge declarations
//! cannot form a runnable graph. These are programmer errors, caught
//! before any run starts.

use thiserror::Error;

/// Error when compiling a workflow graph.
#[derive(Debug, Error)]
pub enum CompilationError {
    /// An edge or router references a node id never registered via
    /// `add_node` (and it is not START/END).
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// No edge from START and no entry router.
    #[error("graph must declare an entry: one edge from START or an entry router")]
    MissingEntry,

    /// More than one entry declaration (multiple START edges, or a START
    /// edge alongside an entry router).
    #[error("graph declares more than one entry")]
    MultipleEntries,

    /// A node has both a router and unconditional out-edges; successor
    /// choice would be ambiguous.
    #[error("node '{0}' has both a router and unconditional edges")]
    ConflictingEdges(String),

    /// More than one router attached to the same node.
    #[error("node '{0}' has more than one router")]
    DuplicateRouter(String),

    /// A node has no router and no out-edges, so a run reaching it could
    /// never terminate normally.
    #[error("node '{0}' has no way forward (no edges, no router)")]
    DeadEnd(String),

    /// Branches fanning out of one node do not share a single fan-in
    /// successor.
    #[error("fan-out from '{0}' has branches that do not rejoin at one node")]
    JoinMismatch(String),

    /// A router's target map points at an unknown node.
    #[error("router on '{node}' maps to unknown target '{target}'")]
    UnknownRouterTarget { node: String, target: String },
}
