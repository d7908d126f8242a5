//! The validate-replan workflow: plan → execute-all-steps → validate →
//! (insufficient? replan : respond), bounded by an attempt ceiling.
//!
//! A reusable assembly of the graph engine for any "gather evidence,
//! check sufficiency, maybe try again" task. Nodes are constructor-
//! injected with the structured output pipeline and the capability
//! registry; the workflow state schema is declared here.

mod executor;
mod planner;
mod responder;
mod validator;

pub use executor::ExecutorNode;
pub use planner::PlannerNode;
pub use responder::ResponderNode;
pub use validator::ValidatorNode;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::capability::CapabilityRegistry;
use crate::graph::{CompilationError, CompiledGraph, GraphBuilder, END, START};
use crate::model::ModelClient;
use crate::retry::RetryPolicy;
use crate::state::{State, StateDelta, StateError, StateSchema};
use crate::structured::StructuredOutputPipeline;

/// State field names used by the workflow.
pub mod fields {
    /// Conversation; Append. Serialized [`crate::message::Message`] values.
    pub const MESSAGES: &str = "messages";
    /// Progress lines; Append.
    pub const LOGS: &str = "logs";
    /// Reference context object handed in at run start; Replace.
    pub const CONTEXT: &str = "context";
    /// Current plan, an array of [`super::PlanStep`]; Replace.
    pub const PLAN: &str = "plan";
    /// Index of the next plan step to execute; Replace.
    pub const CURRENT_STEP: &str = "current_step";
    /// Capability outputs keyed `step_{index}_{capability}`; DictMerge.
    pub const EXECUTION_RESULTS: &str = "execution_results";
    /// Last validator verdict; Replace.
    pub const VALIDATOR_STATUS: &str = "validator_status";
    /// Validator guidance carried back to the planner; Replace.
    pub const VALIDATOR_FEEDBACK: &str = "validator_feedback";
    /// Replanning rounds taken so far; Replace. Never exceeds the ceiling.
    pub const REPLAN_ATTEMPTS: &str = "replan_attempts";
    /// Final assistant answer; Replace.
    pub const ANSWER: &str = "answer";
}

/// Validator verdicts.
pub const STATUS_SUFFICIENT: &str = "sufficient";
pub const STATUS_INSUFFICIENT: &str = "insufficient";
pub const STATUS_NEEDS_CLARIFICATION: &str = "needs_clarification";

/// Built-in no-op capability name: answer from context, no tool call.
pub const DIRECT_ANSWER: &str = "direct_answer";

/// One planned step: a capability name and its arguments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub capability: String,
    #[serde(default)]
    pub args: Value,
}

impl PlanStep {
    pub fn direct_answer() -> Self {
        Self {
            capability: DIRECT_ANSWER.to_string(),
            args: json!({}),
        }
    }
}

/// Tuning for one chat workflow.
#[derive(Clone, Debug)]
pub struct ChatOptions {
    /// Replanning rounds allowed before the verdict is forced forward.
    pub replan_ceiling: u64,
    /// Plans at most this long with clean results skip the validator's
    /// model call entirely (latency/cost optimization, not correctness).
    pub auto_approve_max_steps: usize,
    /// Retry policy for model and capability calls issued by the nodes.
    pub retry: RetryPolicy,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            replan_ceiling: 2,
            auto_approve_max_steps: 2,
            retry: RetryPolicy::default(),
        }
    }
}

/// Declares every field the workflow's nodes read or write.
pub fn chat_schema() -> StateSchema {
    StateSchema::builder()
        .append(fields::MESSAGES)
        .append(fields::LOGS)
        .replace(fields::CONTEXT)
        .replace(fields::PLAN)
        .replace(fields::CURRENT_STEP)
        .dict_merge(fields::EXECUTION_RESULTS)
        .replace(fields::VALIDATOR_STATUS)
        .replace(fields::VALIDATOR_FEEDBACK)
        .replace(fields::REPLAN_ATTEMPTS)
        .replace(fields::ANSWER)
        .build()
}

/// Rebuilds the typed conversation from the serialized messages field.
pub(crate) fn conversation_from(state: &State) -> Vec<crate::message::Message> {
    state
        .get_array(fields::MESSAGES)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// The most recent user message, or empty for a bare run.
pub(crate) fn latest_user_query(state: &State) -> String {
    conversation_from(state)
        .iter()
        .rev()
        .find_map(|m| match m {
            crate::message::Message::User(text) => Some(text.clone()),
            _ => None,
        })
        .unwrap_or_default()
}

/// Flattens accumulated execution results into a prompt section, keys
/// sorted for stable output.
pub(crate) fn results_digest(state: &State) -> String {
    let Some(results) = state.get_object(fields::EXECUTION_RESULTS) else {
        return String::new();
    };
    let mut keys: Vec<_> = results.keys().collect();
    keys.sort();
    keys.iter()
        .map(|key| {
            let value = results
                .get(*key)
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| results.get(*key).map(|v| v.to_string()).unwrap_or_default());
            format!("### {key}\n{value}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Reads the plan out of state; absent or malformed becomes an empty plan.
pub(crate) fn plan_from(state: &State) -> Vec<PlanStep> {
    state
        .get(fields::PLAN)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default()
}

/// Wires planner → executor (looping while steps remain) → validator →
/// (planner | responder) → END.
pub fn build_chat_graph(
    model: Arc<dyn ModelClient>,
    capabilities: Arc<CapabilityRegistry>,
    options: ChatOptions,
) -> Result<CompiledGraph, CompilationError> {
    let pipeline = Arc::new(
        StructuredOutputPipeline::new(Arc::clone(&model)).with_retry(options.retry.clone()),
    );

    let planner = PlannerNode::new(Arc::clone(&pipeline), Arc::clone(&capabilities));
    let executor = ExecutorNode::new(capabilities, options.retry.clone());
    let validator = ValidatorNode::new(Arc::clone(&pipeline), options.clone());
    let responder = ResponderNode::new(model, options.retry.clone());

    let ceiling = options.replan_ceiling;
    let mut graph = GraphBuilder::new(chat_schema());
    graph
        .add_node("planner", Arc::new(planner))
        .add_node("executor", Arc::new(executor))
        .add_node("validator", Arc::new(validator))
        .add_node("responder", Arc::new(responder));
    graph.add_edge(START, "planner").add_edge("planner", "executor");
    graph.add_router(
        "executor",
        Arc::new(|state: &State| {
            let remaining =
                (state.get_u64(fields::CURRENT_STEP).unwrap_or(0) as usize) < plan_from(state).len();
            if remaining { "next_step" } else { "validate" }.to_string()
        }),
        [("next_step", "executor"), ("validate", "validator")],
    );
    graph.add_router(
        "validator",
        Arc::new(move |state: &State| {
            let status = state.get_str(fields::VALIDATOR_STATUS).unwrap_or_default();
            let attempts = state.get_u64(fields::REPLAN_ATTEMPTS).unwrap_or(0);
            if status == STATUS_INSUFFICIENT && attempts < ceiling {
                "replan".to_string()
            } else {
                "respond".to_string()
            }
        }),
        [("replan", "planner"), ("respond", "responder")],
    );
    graph.add_edge("responder", END);
    graph.compile()
}

/// Assembles the initial state for one request: the user message plus an
/// optional reference context object.
pub fn initial_chat_state(
    graph: &CompiledGraph,
    query: &str,
    context: Option<Value>,
) -> Result<State, StateError> {
    let mut delta = StateDelta::new()
        .set(
            fields::MESSAGES,
            json!([crate::message::Message::user(query)]),
        )
        .set(fields::REPLAN_ATTEMPTS, json!(0))
        .set(fields::CURRENT_STEP, json!(0));
    if let Some(context) = context {
        delta = delta.set(fields::CONTEXT, context);
    }
    graph.initial_state(delta)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: PlanStep deserializes with args defaulting to null
    /// when the model omits them.
    #[test]
    fn plan_step_args_default() {
        let step: PlanStep = serde_json::from_value(json!({"capability": "web_search"})).unwrap();
        assert_eq!(step.capability, "web_search");
        assert!(step.args.is_null());
    }

    /// **Scenario**: chat_schema declares every workflow field.
    #[test]
    fn schema_covers_all_fields() {
        let schema = chat_schema();
        for field in [
            fields::MESSAGES,
            fields::LOGS,
            fields::CONTEXT,
            fields::PLAN,
            fields::CURRENT_STEP,
            fields::EXECUTION_RESULTS,
            fields::VALIDATOR_STATUS,
            fields::VALIDATOR_FEEDBACK,
            fields::REPLAN_ATTEMPTS,
            fields::ANSWER,
        ] {
            assert!(schema.contains(field), "missing {field}");
        }
    }
}
