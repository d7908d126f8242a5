//! Node trait: one step in the workflow graph.

use async_trait::async_trait;

use super::run_context::RunContext;
use crate::error::EngineError;
use crate::state::{State, StateDelta};

/// A named unit of work: read the state, do the work (including I/O),
/// return a delta containing only the fields to change.
///
/// Nodes never mutate the state they are given; the scheduler owns delta
/// application and fan-in merging. A node that has nothing to write
/// returns an empty delta.
///
/// **Interaction**: registered with `GraphBuilder::add_node`; the run
/// context carries the session event emitter and cancellation token for
/// nodes that publish progress or issue remote calls.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: &State, ctx: &RunContext) -> Result<StateDelta, EngineError>;
}
