//! Workflow graph: nodes + edges, compile and run.
//!
//! Build with `GraphBuilder` (`add_node` / `add_edge` / `add_router`, with
//! `START` and `END` for entry/exit), then `compile` to get an immutable
//! `CompiledGraph` that schedules sequential edges, fan-out/fan-in, and
//! router-driven cycles.

mod compile_error;
mod compiled;
mod node;
mod run_context;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::CompiledGraph;
pub use node::Node;
pub use run_context::RunContext;
pub use state_graph::{GraphBuilder, RouterFn, END, START};
