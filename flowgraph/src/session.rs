//! Session facade: one query + one session id = one graph run.
//!
//! Owns the shared collaborators (model client, capability registry,
//! event multiplexer) and ties them to runs. Persistence of the returned
//! final state is the caller's job; `clear_session` releases the event
//! history once that is done.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::capability::CapabilityRegistry;
use crate::chat::{build_chat_graph, initial_chat_state, ChatOptions};
use crate::error::EngineError;
use crate::graph::{CompilationError, CompiledGraph, RunContext};
use crate::model::ModelClient;
use crate::state::State;
use crate::stream::{EventMux, RunEvent, SessionEvents};

/// Runs graphs on behalf of sessions and surfaces progress through the
/// event multiplexer.
///
/// **Interaction**: constructed once by the host with its collaborators;
/// transport layers read `events()` for `subscribe`/`history`, the host
/// persists the returned final state.
pub struct SessionRunner {
    model: Arc<dyn ModelClient>,
    capabilities: Arc<CapabilityRegistry>,
    events: Arc<EventMux>,
    options: ChatOptions,
}

impl SessionRunner {
    pub fn new(
        model: Arc<dyn ModelClient>,
        capabilities: Arc<CapabilityRegistry>,
        events: Arc<EventMux>,
    ) -> Self {
        Self {
            model,
            capabilities,
            events,
            options: ChatOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// The shared multiplexer, for transport layers.
    pub fn events(&self) -> &Arc<EventMux> {
        &self.events
    }

    /// Runs an arbitrary compiled graph for a session with a fresh
    /// cancellation token.
    pub async fn run(
        &self,
        graph: &CompiledGraph,
        initial: State,
        session_id: &str,
    ) -> Result<State, EngineError> {
        self.run_with_cancel(graph, initial, session_id, CancellationToken::new())
            .await
    }

    /// Runs a graph watching an owner-held token, so the caller can cancel
    /// mid-run. Publishes RunCompleted / RunFailed to the session stream
    /// either way; partial history survives a failure.
    pub async fn run_with_cancel(
        &self,
        graph: &CompiledGraph,
        initial: State,
        session_id: &str,
        cancel: CancellationToken,
    ) -> Result<State, EngineError> {
        info!(session_id, "run starting");
        let ctx = RunContext::with_cancel(
            SessionEvents::bound(Arc::clone(&self.events), session_id),
            cancel,
        );
        match graph.run(initial, &ctx).await {
            Ok(state) => {
                info!(session_id, "run completed");
                ctx.events.emit(RunEvent::RunCompleted);
                Ok(state)
            }
            Err(e) => {
                error!(session_id, error = %e, "run failed");
                let node = match &e {
                    EngineError::NodeFailed { node, .. } => node.clone(),
                    _ => String::new(),
                };
                ctx.events.emit(RunEvent::RunFailed {
                    node,
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Builds and runs the validate-replan chat workflow for one request.
    pub async fn run_chat(
        &self,
        session_id: &str,
        query: &str,
        context: Option<Value>,
    ) -> Result<State, ChatRunError> {
        let graph = build_chat_graph(
            Arc::clone(&self.model),
            Arc::clone(&self.capabilities),
            self.options.clone(),
        )?;
        let initial = initial_chat_state(&graph, query, context)
            .map_err(EngineError::from)?;
        Ok(self.run(&graph, initial, session_id).await?)
    }

    /// Drops the session's event history once results are persisted.
    pub fn clear_session(&self, session_id: &str) {
        self.events.clear(session_id);
    }
}

/// Error from `run_chat`: graph assembly or execution.
#[derive(Debug, thiserror::Error)]
pub enum ChatRunError {
    #[error("compilation failed: {0}")]
    Compilation(#[from] CompilationError),
    #[error(transparent)]
    Execution(#[from] EngineError),
}
