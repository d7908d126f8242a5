//! Validator node: judge whether the gathered results answer the request.
//!
//! Clean results from a short plan are auto-approved without a model call.
//! Otherwise a structured model call classifies the evidence as
//! sufficient, insufficient (with feedback for the planner), or
//! needs-clarification. A pipeline fallback resolves to sufficient so the
//! loop always terminates with an answer.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::EngineError;
use crate::graph::{Node, RunContext};
use crate::message::Message;
use crate::state::{State, StateDelta};
use crate::structured::{FieldKind, OutputSchema, StructuredOutputPipeline};

use super::{
    fields, latest_user_query, plan_from, results_digest, ChatOptions, STATUS_INSUFFICIENT,
    STATUS_NEEDS_CLARIFICATION, STATUS_SUFFICIENT,
};

/// Substring marking a failed step in the execution results.
const ERROR_MARKER: &str = "error:";

pub struct ValidatorNode {
    pipeline: Arc<StructuredOutputPipeline>,
    options: ChatOptions,
    schema: OutputSchema,
}

impl ValidatorNode {
    pub fn new(pipeline: Arc<StructuredOutputPipeline>, options: ChatOptions) -> Self {
        let schema = OutputSchema::builder("Verdict")
            .required(
                "status",
                FieldKind::OneOf(vec![
                    STATUS_SUFFICIENT.into(),
                    STATUS_INSUFFICIENT.into(),
                    STATUS_NEEDS_CLARIFICATION.into(),
                ]),
            )
            .optional("feedback", FieldKind::Text)
            .describe("what is missing, or the clarifying question to ask")
            .build();
        Self {
            pipeline,
            options,
            schema,
        }
    }

    fn results_look_clean(state: &State) -> bool {
        state
            .get_object(fields::EXECUTION_RESULTS)
            .map(|results| {
                results
                    .values()
                    .all(|v| !v.as_str().unwrap_or_default().contains(ERROR_MARKER))
            })
            .unwrap_or(true)
    }
}

#[async_trait]
impl Node for ValidatorNode {
    async fn run(&self, state: &State, ctx: &RunContext) -> Result<StateDelta, EngineError> {
        let plan_len = plan_from(state).len();
        if plan_len <= self.options.auto_approve_max_steps && Self::results_look_clean(state) {
            debug!(plan_len, "short clean plan, auto-approving");
            ctx.events.log("Validator: auto-approved");
            return Ok(StateDelta::new()
                .set(fields::VALIDATOR_STATUS, json!(STATUS_SUFFICIENT))
                .set(fields::LOGS, json!(["Validator: auto-approved"])));
        }

        let prompt = vec![
            Message::system(
                "You judge whether gathered evidence is enough to answer a request. \
                 Mark insufficient when a different strategy could do better; mark \
                 needs_clarification when only the user can resolve the ambiguity.",
            ),
            Message::user(format!(
                "REQUEST: \"{}\"\n\nGATHERED RESULTS:\n{}",
                latest_user_query(state),
                results_digest(state),
            )),
        ];
        let outcome = self
            .pipeline
            .extract(
                &prompt,
                &self.schema,
                json!({"status": STATUS_SUFFICIENT}),
                Some(&ctx.cancel),
            )
            .await
            .map_err(|e| EngineError::ExecutionFailed(e.to_string()))?;

        let status = outcome
            .value
            .get("status")
            .and_then(|v| v.as_str())
            .unwrap_or(STATUS_SUFFICIENT)
            .to_string();
        let feedback = outcome
            .value
            .get("feedback")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        debug!(status = %status, "validator verdict");
        ctx.events.log(format!("Validator: {status}"));
        Ok(StateDelta::new()
            .set(fields::VALIDATOR_STATUS, json!(status.clone()))
            .set(fields::VALIDATOR_FEEDBACK, json!(feedback))
            .set(fields::LOGS, json!([format!("Validator: {status}")])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::chat_schema;
    use crate::model::MockModel;
    use crate::stream::SessionEvents;

    fn validator(mock: Arc<MockModel>) -> ValidatorNode {
        ValidatorNode::new(
            Arc::new(StructuredOutputPipeline::new(mock)),
            ChatOptions::default(),
        )
    }

    fn state_with(delta: StateDelta) -> State {
        State::with_initial(Arc::new(chat_schema()), delta).unwrap()
    }

    fn ctx() -> RunContext {
        RunContext::new(SessionEvents::detached("test"))
    }

    /// **Scenario**: A short plan with clean results auto-approves without
    /// any model call.
    #[tokio::test]
    async fn auto_approves_short_clean_plan() {
        let mock = Arc::new(MockModel::fixed("should not be called"));
        let state = state_with(
            StateDelta::new()
                .set(fields::PLAN, json!([{"capability": "direct_answer"}]))
                .set(fields::EXECUTION_RESULTS, json!({"step_0_direct_answer": "ok"})),
        );
        let delta = validator(Arc::clone(&mock)).run(&state, &ctx()).await.unwrap();
        let next = state.with_delta(&delta).unwrap();
        assert_eq!(next.get_str(fields::VALIDATOR_STATUS), Some(STATUS_SUFFICIENT));
        assert_eq!(mock.calls(), 0, "auto-approve must skip the model");
    }

    /// **Scenario**: An error marker in the results forces a model verdict
    /// even for a short plan.
    #[tokio::test]
    async fn error_marker_disables_auto_approve() {
        let mock = Arc::new(MockModel::fixed(
            "{\"status\": \"insufficient\", \"feedback\": \"search failed, try read_report\"}",
        ));
        let state = state_with(
            StateDelta::new()
                .set(fields::MESSAGES, json!([Message::user("q")]))
                .set(fields::PLAN, json!([{"capability": "web_search"}]))
                .set(
                    fields::EXECUTION_RESULTS,
                    json!({"step_0_web_search": "error: capability unavailable: 503"}),
                ),
        );
        let delta = validator(Arc::clone(&mock)).run(&state, &ctx()).await.unwrap();
        let next = state.with_delta(&delta).unwrap();
        assert_eq!(
            next.get_str(fields::VALIDATOR_STATUS),
            Some(STATUS_INSUFFICIENT)
        );
        assert_eq!(
            next.get_str(fields::VALIDATOR_FEEDBACK),
            Some("search failed, try read_report")
        );
        assert_eq!(mock.calls(), 1);
    }

    /// **Scenario**: Pipeline fallback (two bad model responses) resolves
    /// the verdict to sufficient so the run can terminate.
    #[tokio::test]
    async fn fallback_verdict_is_sufficient() {
        let mock = Arc::new(MockModel::fixed("not json at all"));
        let state = state_with(
            StateDelta::new()
                .set(fields::MESSAGES, json!([Message::user("q")]))
                .set(
                    fields::PLAN,
                    json!([
                        {"capability": "a"}, {"capability": "b"}, {"capability": "c"}
                    ]),
                )
                .set(fields::EXECUTION_RESULTS, json!({"step_0_a": "fine"})),
        );
        let delta = validator(Arc::clone(&mock)).run(&state, &ctx()).await.unwrap();
        let next = state.with_delta(&delta).unwrap();
        assert_eq!(next.get_str(fields::VALIDATOR_STATUS), Some(STATUS_SUFFICIENT));
        assert_eq!(mock.calls(), 2, "first try plus one repair");
    }
}
