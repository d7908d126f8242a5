//! Responder node: synthesize the final answer (or ask for clarification).
//!
//! Terminal predecessor of the workflow. Synthesis is a plain text model
//! call over the accumulated results; a needs-clarification verdict skips
//! synthesis and surfaces the validator's question instead.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::error::EngineError;
use crate::graph::{Node, RunContext};
use crate::message::Message;
use crate::model::{ModelClient, ModelError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::state::{State, StateDelta};
use crate::stream::RunEvent;

use super::{fields, latest_user_query, results_digest, STATUS_NEEDS_CLARIFICATION};

const DEFAULT_CLARIFICATION: &str =
    "Could you clarify what you are asking for? The request is ambiguous as stated.";

pub struct ResponderNode {
    model: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

impl ResponderNode {
    pub fn new(model: Arc<dyn ModelClient>, retry: RetryPolicy) -> Self {
        Self { model, retry }
    }

    async fn synthesize(&self, state: &State, ctx: &RunContext) -> Result<String, EngineError> {
        let digest = results_digest(state);
        let context_note = state
            .get_object(fields::CONTEXT)
            .map(|c| format!("\n\nREFERENCE CONTEXT:\n{}", json!(c)))
            .unwrap_or_default();
        let prompt = vec![
            Message::system(
                "Answer the user's request directly from the gathered results. Cite \
                 specific facts and numbers; acknowledge honestly when information is \
                 missing. Keep the response focused.",
            ),
            Message::user(format!(
                "REQUEST: \"{}\"\n\nGATHERED RESULTS:\n{}{}",
                latest_user_query(state),
                if digest.is_empty() {
                    "(no capability output)"
                } else {
                    digest.as_str()
                },
                context_note,
            )),
        ];

        let response = retry_with_backoff(
            "responder completion",
            &self.retry,
            ModelError::is_transient,
            Some(&ctx.cancel),
            || self.model.complete(&prompt),
        )
        .await
        .map_err(|e| EngineError::ExecutionFailed(e.to_string()))?;
        Ok(response.text)
    }
}

#[async_trait]
impl Node for ResponderNode {
    async fn run(&self, state: &State, ctx: &RunContext) -> Result<StateDelta, EngineError> {
        let needs_clarification =
            state.get_str(fields::VALIDATOR_STATUS) == Some(STATUS_NEEDS_CLARIFICATION);
        let answer = if needs_clarification {
            match state.get_str(fields::VALIDATOR_FEEDBACK) {
                Some(question) if !question.is_empty() => question.to_string(),
                _ => DEFAULT_CLARIFICATION.to_string(),
            }
        } else {
            self.synthesize(state, ctx).await?
        };

        debug!(clarification = needs_clarification, "responder produced answer");
        ctx.events.emit(RunEvent::Custom {
            payload: json!({"answer_preview": answer.chars().take(120).collect::<String>()}),
        });
        Ok(StateDelta::new()
            .set(fields::ANSWER, json!(answer.clone()))
            .set(fields::MESSAGES, json!([Message::assistant(answer)]))
            .set(fields::LOGS, json!(["Responder: answer ready"])))
    }
}
