//! Executor node: run the next plan step and record its result.
//!
//! One step per visit; the router loops it back while steps remain.
//! Capability failures that survive the retry wrapper are recorded as
//! error text in the results, not escalated; the validator judges them.
//! An empty plan makes this a pass-through so the loop still reaches the
//! validator.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::capability::{CapabilityError, CapabilityRegistry};
use crate::error::EngineError;
use crate::graph::{Node, RunContext};
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};
use crate::state::{State, StateDelta};
use crate::stream::RunEvent;

use super::{fields, plan_from, DIRECT_ANSWER};

/// Marker recorded when a step needs no tool call.
const DIRECT_ANSWER_RESULT: &str = "(direct answer - no capability invoked)";

fn preview(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_len).collect::<String>())
    }
}

pub struct ExecutorNode {
    capabilities: Arc<CapabilityRegistry>,
    retry: RetryPolicy,
}

impl ExecutorNode {
    pub fn new(capabilities: Arc<CapabilityRegistry>, retry: RetryPolicy) -> Self {
        Self { capabilities, retry }
    }

    async fn invoke(
        &self,
        name: &str,
        args: Value,
        ctx: &RunContext,
    ) -> Result<String, EngineError> {
        let result = retry_with_backoff(
            name,
            &self.retry,
            CapabilityError::is_transient,
            Some(&ctx.cancel),
            || self.capabilities.call(name, args.clone()),
        )
        .await;
        match result {
            Ok(output) => Ok(output.text),
            Err(RetryError::Cancelled { .. }) => Err(EngineError::Cancelled),
            // Recorded, not escalated: the validator decides what a failed
            // step means for the request.
            Err(e) => Ok(format!("error: {e}")),
        }
    }
}

#[async_trait]
impl Node for ExecutorNode {
    async fn run(&self, state: &State, ctx: &RunContext) -> Result<StateDelta, EngineError> {
        let plan = plan_from(state);
        let index = state.get_u64(fields::CURRENT_STEP).unwrap_or(0) as usize;
        let Some(step) = plan.get(index) else {
            // Empty (or exhausted) plan: pass through to the validator.
            return Ok(StateDelta::new());
        };

        debug!(step = index, capability = %step.capability, "executing step");
        let result = if step.capability == DIRECT_ANSWER {
            DIRECT_ANSWER_RESULT.to_string()
        } else {
            ctx.events.emit(RunEvent::CapabilityStarted {
                name: step.capability.clone(),
                args: step.args.clone(),
            });
            let text = self.invoke(&step.capability, step.args.clone(), ctx).await?;
            ctx.events.emit(RunEvent::CapabilityFinished {
                name: step.capability.clone(),
                output: preview(&text, 200),
            });
            text
        };

        let key = format!("step_{index}_{}", step.capability);
        Ok(StateDelta::new()
            .set(fields::EXECUTION_RESULTS, json!({ key: result }))
            .set(fields::CURRENT_STEP, json!(index + 1))
            .set(
                fields::LOGS,
                json!([format!("Executor: ran {} (step {index})", step.capability)]),
            ))
    }
}
