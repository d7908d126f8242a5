//! Planner node: turn the request into an ordered list of capability steps.
//!
//! Resets the step cursor and discards the previous attempt's execution
//! results each time it runs. When re-entered after an
//! insufficient verdict it carries the validator's feedback into the
//! prompt, asks for a different strategy, and increments the attempt
//! counter. A plan that fails to parse degrades to a single
//! `direct_answer` step so the loop always reaches the validator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::capability::CapabilityRegistry;
use crate::error::EngineError;
use crate::graph::{Node, RunContext};
use crate::message::Message;
use crate::state::{State, StateDelta};
use crate::stream::RunEvent;
use crate::structured::{FieldKind, OutputSchema, StructuredOutputPipeline};

use super::{
    fields, latest_user_query, PlanStep, STATUS_INSUFFICIENT,
};

pub struct PlannerNode {
    pipeline: Arc<StructuredOutputPipeline>,
    capabilities: Arc<CapabilityRegistry>,
    schema: OutputSchema,
}

impl PlannerNode {
    pub fn new(
        pipeline: Arc<StructuredOutputPipeline>,
        capabilities: Arc<CapabilityRegistry>,
    ) -> Self {
        let schema = OutputSchema::builder("Plan")
            .required("plan", FieldKind::List(Box::new(FieldKind::Object)))
            .describe("ordered steps, each {\"capability\": name, \"args\": object}")
            .optional(
                "intent",
                FieldKind::OneOf(vec![
                    "analysis".into(),
                    "search".into(),
                    "conversational".into(),
                ]),
            )
            .build();
        Self {
            pipeline,
            capabilities,
            schema,
        }
    }

    fn prompt(&self, state: &State) -> Vec<Message> {
        let query = latest_user_query(state);
        let mut capability_lines = vec![format!(
            "- {}: answer directly from the conversation, no tool call",
            super::DIRECT_ANSWER
        )];
        for name in self.capabilities.names() {
            capability_lines.push(format!("- {name}"));
        }

        let mut sections = vec![
            format!("REQUEST: \"{query}\""),
            format!("AVAILABLE CAPABILITIES:\n{}", capability_lines.join("\n")),
        ];
        if let Some(context) = state.get_object(fields::CONTEXT) {
            let keys: Vec<_> = context.keys().cloned().collect();
            sections.push(format!("CONTEXT SECTIONS: {}", keys.join(", ")));
        }
        if state.get_str(fields::VALIDATOR_STATUS) == Some(STATUS_INSUFFICIENT) {
            let feedback = state
                .get_str(fields::VALIDATOR_FEEDBACK)
                .unwrap_or("results were judged insufficient");
            sections.push(format!(
                "PREVIOUS ATTEMPT FAILED: {feedback}\nChoose a different strategy than last time."
            ));
        }

        vec![
            Message::system(
                "You are a planner for a tool-using assistant. Produce the shortest \
                 ordered plan of capability invocations that can answer the request. \
                 Simple conversational requests take a single direct_answer step.",
            ),
            Message::user(sections.join("\n\n")),
        ]
    }
}

#[async_trait]
impl Node for PlannerNode {
    async fn run(&self, state: &State, ctx: &RunContext) -> Result<StateDelta, EngineError> {
        let replanning = state.get_str(fields::VALIDATOR_STATUS) == Some(STATUS_INSUFFICIENT);
        let attempts = state.get_u64(fields::REPLAN_ATTEMPTS).unwrap_or(0);
        let attempts = if replanning { attempts + 1 } else { attempts };

        let fallback = json!({"plan": [PlanStep::direct_answer()]});
        let outcome = self
            .pipeline
            .extract(&self.prompt(state), &self.schema, fallback, Some(&ctx.cancel))
            .await
            .map_err(|e| EngineError::ExecutionFailed(e.to_string()))?;

        let steps: Vec<PlanStep> = outcome
            .value
            .get("plan")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_else(|| vec![PlanStep::direct_answer()]);

        debug!(steps = steps.len(), attempts, "plan produced");
        let steps_value = serde_json::to_value(&steps)
            .map_err(|e| EngineError::ExecutionFailed(e.to_string()))?;
        ctx.events.emit(RunEvent::PlanProduced {
            steps: steps_value.clone(),
        });
        ctx.events
            .log(format!("Planner: {} step(s), attempt {attempts}", steps.len()));

        Ok(StateDelta::new()
            .set(fields::PLAN, steps_value)
            .set(fields::CURRENT_STEP, json!(0))
            .reset(fields::EXECUTION_RESULTS)
            .set(fields::REPLAN_ATTEMPTS, json!(attempts))
            .set(
                fields::LOGS,
                json!([format!("Planner: produced {} step(s)", steps.len())]),
            ))
    }
}
