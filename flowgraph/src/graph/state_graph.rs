//! Graph builder: nodes + explicit edges (from → to) + routers.
//!
//! Add nodes with `add_node`, wire transitions with `add_edge(from, to)`
//! using `START` and `END` for graph entry/exit, attach routers with
//! `add_router`, then `compile` to get a `CompiledGraph`. Multiple
//! unconditional edges leaving one node declare fan-out; compile verifies
//! the branches rejoin at a single fan-in node.

use std::collections::HashMap;
use std::sync::Arc;

use crate::graph::compile_error::CompilationError;
use crate::graph::compiled::{CompiledGraph, Entry, RouterSpec};
use crate::graph::node::Node;
use crate::state::{State, StateSchema};

/// Sentinel for graph entry: use as `from` in `add_edge(START, first_node)`.
pub const START: &str = "__start__";

/// Sentinel for graph exit: use as `to` in `add_edge(last_node, END)` or
/// as a router target.
pub const END: &str = "__end__";

/// Router function: inspects the just-merged state and returns a label
/// from its declared target map. Routers choose exactly one successor;
/// they never fan out.
pub type RouterFn = Arc<dyn Fn(&State) -> String + Send + Sync>;

/// Mutable graph under construction. Generic building block: the chat
/// workflow in [`crate::chat`] is one assembly of it.
pub struct GraphBuilder {
    schema: Arc<StateSchema>,
    nodes: HashMap<String, Arc<dyn Node>>,
    edges: Vec<(String, String)>,
    routers: Vec<(String, RouterSpec)>,
    entry_router: Option<RouterSpec>,
}

impl GraphBuilder {
    /// Starts an empty graph over the given state schema. Every field any
    /// node writes must be declared in the schema; delta application
    /// rejects the rest at run time.
    pub fn new(schema: StateSchema) -> Self {
        Self {
            schema: Arc::new(schema),
            nodes: HashMap::new(),
            edges: Vec::new(),
            routers: Vec::new(),
            entry_router: None,
        }
    }

    /// Adds a node; id must be unique. Replaces if same id.
    pub fn add_node(&mut self, id: impl Into<String>, node: Arc<dyn Node>) -> &mut Self {
        self.nodes.insert(id.into(), node);
        self
    }

    /// Adds an unconditional edge. More than one edge from the same node
    /// declares a fan-out executed concurrently.
    pub fn add_edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Attaches a router to `from`: after the node's delta is merged, the
    /// router is evaluated and its label looked up in `targets`
    /// (label → node id or END).
    pub fn add_router<I, L, T>(&mut self, from: impl Into<String>, router: RouterFn, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        self.routers.push((
            from.into(),
            RouterSpec {
                route: router,
                targets: targets
                    .into_iter()
                    .map(|(label, target)| (label.into(), target.into()))
                    .collect(),
            },
        ));
        self
    }

    /// Declares a conditional entry: the router is evaluated against the
    /// initial state to pick the first node.
    pub fn set_entry_router<I, L, T>(&mut self, router: RouterFn, targets: I) -> &mut Self
    where
        I: IntoIterator<Item = (L, T)>,
        L: Into<String>,
        T: Into<String>,
    {
        self.entry_router = Some(RouterSpec {
            route: router,
            targets: targets
                .into_iter()
                .map(|(label, target)| (label.into(), target.into()))
                .collect(),
        });
        self
    }

    /// Validates the declarations and builds the executable graph.
    pub fn compile(self) -> Result<CompiledGraph, CompilationError> {
        for (from, to) in &self.edges {
            if from != START && !self.nodes.contains_key(from) {
                return Err(CompilationError::NodeNotFound(from.clone()));
            }
            if to != END && !self.nodes.contains_key(to) {
                return Err(CompilationError::NodeNotFound(to.clone()));
            }
        }
        let mut routers: HashMap<String, RouterSpec> = HashMap::new();
        for (from, spec) in self.routers {
            if !self.nodes.contains_key(&from) {
                return Err(CompilationError::NodeNotFound(from));
            }
            for target in spec.targets.values() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(CompilationError::UnknownRouterTarget {
                        node: from,
                        target: target.clone(),
                    });
                }
            }
            if routers.insert(from.clone(), spec).is_some() {
                return Err(CompilationError::DuplicateRouter(from));
            }
        }
        if let Some(spec) = &self.entry_router {
            for target in spec.targets.values() {
                if target != END && !self.nodes.contains_key(target) {
                    return Err(CompilationError::UnknownRouterTarget {
                        node: START.to_string(),
                        target: target.clone(),
                    });
                }
            }
        }

        let start_edges: Vec<_> = self
            .edges
            .iter()
            .filter(|(f, _)| f == START)
            .map(|(_, t)| t.clone())
            .collect();
        let entry = match (self.entry_router, start_edges.len()) {
            (Some(spec), 0) => Entry::Router(spec),
            (None, 1) => Entry::Node(start_edges.into_iter().next().expect("one start edge")),
            (None, 0) => return Err(CompilationError::MissingEntry),
            _ => return Err(CompilationError::MultipleEntries),
        };

        let mut successors: HashMap<String, Vec<String>> = HashMap::new();
        for (from, to) in &self.edges {
            if from != START {
                successors
                    .entry(from.clone())
                    .or_default()
                    .push(to.clone());
            }
        }

        for id in self.nodes.keys() {
            let outs = successors.get(id).map(Vec::len).unwrap_or(0);
            let routed = routers.contains_key(id);
            if routed && outs > 0 {
                return Err(CompilationError::ConflictingEdges(id.clone()));
            }
            if !routed && outs == 0 {
                return Err(CompilationError::DeadEnd(id.clone()));
            }
        }

        // Fan-out branches must each flow unconditionally into one shared join.
        for (source, outs) in &successors {
            if outs.len() < 2 {
                continue;
            }
            let mut join: Option<&str> = None;
            for branch in outs {
                if routers.contains_key(branch) {
                    return Err(CompilationError::JoinMismatch(source.clone()));
                }
                match successors.get(branch).map(Vec::as_slice) {
                    Some([next]) => match join {
                        None => join = Some(next),
                        Some(j) if j == next => {}
                        Some(_) => return Err(CompilationError::JoinMismatch(source.clone())),
                    },
                    _ => return Err(CompilationError::JoinMismatch(source.clone())),
                }
            }
        }

        Ok(CompiledGraph::assemble(
            self.schema,
            self.nodes,
            successors,
            routers,
            entry,
        ))
    }
}
