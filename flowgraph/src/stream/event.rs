//! Structured progress events emitted while a run executes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One progress event in a session's stream.
///
/// Serializes with a `type` tag so transport layers can forward events
/// verbatim (e.g. one SSE frame per event).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// Free-form progress line (analyst commentary, retry notices, ...).
    Log { message: String },
    /// A graph node began executing.
    NodeStarted { node: String },
    /// A graph node completed and its delta was merged.
    NodeFinished { node: String },
    /// The planner produced (or replaced) the execution plan.
    PlanProduced { steps: Value },
    /// The executor began a capability invocation.
    CapabilityStarted { name: String, args: Value },
    /// A capability invocation finished; `output` is a preview, full
    /// results live in state.
    CapabilityFinished { name: String, output: String },
    /// The run reached the terminal marker.
    RunCompleted,
    /// The run failed; `node` names the failing node.
    RunFailed { node: String, message: String },
    /// Arbitrary JSON payload for application-specific events.
    Custom { payload: Value },
}

impl RunEvent {
    pub fn log(message: impl Into<String>) -> Self {
        Self::Log {
            message: message.into(),
        }
    }
}
