//! Compiled graph: immutable structure, runs to completion.
//!
//! Built by `GraphBuilder::compile`. Drives the run loop: sequential
//! edges, concurrent fan-out with completion-order fan-in merge, router
//! evaluation against the just-merged state, and cooperative cancellation.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::state::{State, StateDelta, StateError, StateSchema};
use crate::stream::RunEvent;

use super::node::Node;
use super::run_context::RunContext;
use super::state_graph::END;

/// A router with its declared label → target map.
#[derive(Clone)]
pub(super) struct RouterSpec {
    pub(super) route: super::state_graph::RouterFn,
    pub(super) targets: HashMap<String, String>,
}

/// Where a run starts.
pub(super) enum Entry {
    Node(String),
    Router(RouterSpec),
}

/// Immutable, runnable graph.
///
/// Cycles are legal and uncapped here; callers carry attempt counters in
/// state and route forward once their ceiling is reached.
pub struct CompiledGraph {
    schema: Arc<StateSchema>,
    nodes: HashMap<String, Arc<dyn Node>>,
    successors: HashMap<String, Vec<String>>,
    routers: HashMap<String, RouterSpec>,
    entry: Entry,
}

impl CompiledGraph {
    pub(super) fn assemble(
        schema: Arc<StateSchema>,
        nodes: HashMap<String, Arc<dyn Node>>,
        successors: HashMap<String, Vec<String>>,
        routers: HashMap<String, RouterSpec>,
        entry: Entry,
    ) -> Self {
        Self {
            schema,
            nodes,
            successors,
            routers,
            entry,
        }
    }

    pub fn schema(&self) -> &Arc<StateSchema> {
        &self.schema
    }

    /// Builds the run's initial state from a delta of inputs.
    pub fn initial_state(&self, inputs: StateDelta) -> Result<State, StateError> {
        State::with_initial(Arc::clone(&self.schema), inputs)
    }

    /// Runs from the entry to END (or the first failure) and returns the
    /// final state.
    pub async fn run(&self, state: State, ctx: &RunContext) -> Result<State, EngineError> {
        let mut state = state;
        let mut current = match &self.entry {
            Entry::Node(id) => id.clone(),
            Entry::Router(spec) => resolve_route("entry", spec, &state)?,
        };

        while current != END {
            if ctx.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            state = self.run_node(&current, state, ctx).await?;

            if let Some(spec) = self.routers.get(&current) {
                current = resolve_route(&current, spec, &state)?;
                continue;
            }
            let outs = self
                .successors
                .get(&current)
                .expect("compiled graph: every node has successors or a router");
            match outs.as_slice() {
                [single] => current = single.clone(),
                branches => {
                    let (merged, join) = self.run_fan_out(&current, branches, state, ctx).await?;
                    state = merged;
                    current = join;
                }
            }
        }
        Ok(state)
    }

    /// Runs one node against the current state and merges its delta.
    async fn run_node(
        &self,
        id: &str,
        state: State,
        ctx: &RunContext,
    ) -> Result<State, EngineError> {
        let node = self
            .nodes
            .get(id)
            .expect("compiled graph has all nodes")
            .clone();
        debug!(node = id, "node starting");
        ctx.events.emit(RunEvent::NodeStarted { node: id.to_string() });

        let delta = tokio::select! {
            _ = ctx.cancel.cancelled() => Err(EngineError::Cancelled),
            result = node.run(&state, ctx) => result,
        }
        .map_err(|e| EngineError::for_node(id, e))?;

        let merged = state.merge(std::slice::from_ref(&delta))?;
        debug!(node = id, "node finished");
        ctx.events.emit(RunEvent::NodeFinished { node: id.to_string() });
        Ok(merged)
    }

    /// Runs all branch nodes concurrently against the pre-fan-out
    /// snapshot, merges their deltas in completion order, and returns the
    /// merged state plus the shared join node.
    ///
    /// First branch failure cancels the siblings (cooperative token +
    /// task abort) and fails the run; the join never runs.
    async fn run_fan_out(
        &self,
        source: &str,
        branches: &[String],
        state: State,
        ctx: &RunContext,
    ) -> Result<(State, String), EngineError> {
        let join = self
            .successors
            .get(&branches[0])
            .and_then(|outs| outs.first())
            .expect("compiled graph: fan-out branches share one join")
            .clone();

        let branch_cancel = ctx.cancel.child_token();
        let mut tasks = JoinSet::new();
        for id in branches {
            let node = Arc::clone(self.nodes.get(id).expect("compiled graph has all nodes"));
            let snapshot = state.clone();
            let branch_ctx = ctx.branch(branch_cancel.clone());
            let id = id.clone();
            tasks.spawn(async move {
                branch_ctx
                    .events
                    .emit(RunEvent::NodeStarted { node: id.clone() });
                let result = tokio::select! {
                    _ = branch_ctx.cancel.cancelled() => Err(EngineError::Cancelled),
                    result = node.run(&snapshot, &branch_ctx) => result,
                };
                match result {
                    Ok(delta) => {
                        branch_ctx
                            .events
                            .emit(RunEvent::NodeFinished { node: id.clone() });
                        Ok(delta)
                    }
                    Err(e) => Err(EngineError::for_node(&id, e)),
                }
            });
        }

        // Deltas collected in completion order; Append fields inherit it.
        let mut deltas = Vec::new();
        let mut first_error: Option<EngineError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(delta)) => deltas.push(delta),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        warn!(source, error = %e, "fan-out branch failed, cancelling siblings");
                        first_error = Some(e);
                        branch_cancel.cancel();
                    }
                }
                // Aborted or panicked branch task.
                Err(join_err) => {
                    if !join_err.is_cancelled() && first_error.is_none() {
                        first_error = Some(EngineError::ExecutionFailed(join_err.to_string()));
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(if ctx.is_cancelled() { EngineError::Cancelled } else { e });
        }
        let merged = state.merge(&deltas)?;
        Ok((merged, join))
    }
}

fn resolve_route(node: &str, spec: &RouterSpec, state: &State) -> Result<String, EngineError> {
    let label = (spec.route)(state);
    spec.targets
        .get(&label)
        .cloned()
        .ok_or_else(|| EngineError::UnknownRouteTarget {
            node: node.to_string(),
            target: label,
        })
}
