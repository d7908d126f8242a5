//! # flowgraph
//!
//! A graph-driven workflow engine for multi-step, tool-augmented LLM
//! pipelines. One shared, schema-declared state flows through named nodes;
//! nodes return **deltas**, never mutated state, and the scheduler merges
//! them per field policy (replace, append, dict-merge).
//!
//! ## Design Principles
//!
//! - **Declared state**: every field a node writes is declared up front
//!   with its merge policy; undeclared writes are detected errors.
//! - **Deltas in, deltas out**: nodes read a snapshot and return only the
//!   fields they change. Fan-in merges happen in branch completion order.
//! - **Injected collaborators**: model clients, capabilities, and the
//!   event multiplexer are constructed by the host and passed in; the
//!   engine holds no globals.
//!
//! ## Main Modules
//!
//! - [`graph`]: `GraphBuilder`, `CompiledGraph`, `Node`: build and run
//!   graphs with fan-out/fan-in, routers, and cycles.
//! - [`state`]: the state record, schema, and merge policies.
//! - [`chat`]: the validate-replan workflow (plan → execute → validate →
//!   replan-or-respond) assembled from the engine primitives.
//! - [`structured`]: schema-validated model output with a bounded repair
//!   round and caller-supplied fallback.
//! - [`stream`]: per-session progress events, pub/sub with history.
//! - [`retry`]: bounded exponential backoff around remote calls.
//! - [`session`]: the facade tying a query and session id to one run.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowgraph::{CapabilityRegistry, EventMux, MockModel, SessionRunner};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let runner = SessionRunner::new(
//!     Arc::new(MockModel::fixed("{\"plan\": []}")),
//!     Arc::new(CapabilityRegistry::new()),
//!     Arc::new(EventMux::new()),
//! );
//! let final_state = runner.run_chat("session-1", "hello", None).await.unwrap();
//! # let _ = final_state;
//! # }
//! ```

pub mod capability;
pub mod chat;
pub mod error;
pub mod graph;
pub mod message;
pub mod model;
pub mod retry;
pub mod session;
pub mod state;
pub mod stream;
pub mod structured;

pub use capability::{Capability, CapabilityError, CapabilityOutput, CapabilityRegistry, MockCapability};
pub use chat::{build_chat_graph, initial_chat_state, ChatOptions, PlanStep};
pub use error::EngineError;
pub use graph::{CompilationError, CompiledGraph, GraphBuilder, Node, RouterFn, RunContext, END, START};
pub use message::Message;
pub use model::{MockModel, ModelClient, ModelError, ModelResponse};
pub use retry::{retry_with_backoff, transient_signal, RetryError, RetryPolicy};
pub use session::{ChatRunError, SessionRunner};
pub use state::{MergePolicy, State, StateDelta, StateError, StateSchema};
pub use stream::{EventMux, RunEvent, SessionEvents};
pub use structured::{
    parse_payload, strip_code_fences, FieldKind, OutputSchema, OutcomeSource, StructuredOutcome,
    StructuredOutputPipeline,
};
