//! The extract → validate → repair → fallback driver.
//!
//! One model call (through the retry wrapper), a native fast path when the
//! host already parsed the response, one repair round that feeds the
//! failure back to the model, and a caller-supplied fallback so exhaustion
//! resolves to a usable low-confidence value instead of an error.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::extract::parse_payload;
use super::schema::OutputSchema;
use crate::message::Message;
use crate::model::{ModelClient, ModelError, ModelResponse};
use crate::retry::{retry_with_backoff, RetryError, RetryPolicy};

/// Which path produced the outcome value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeSource {
    /// The host's native structured-output mode returned a valid value.
    Native,
    /// The first response parsed and validated after fence stripping.
    Parsed,
    /// The repair round produced the value.
    Repaired,
    /// Both rounds failed; this is the caller's fallback. Downstream must
    /// treat it as a valid, low-confidence result, not an error.
    Fallback,
}

/// A schema-conforming value plus how it was obtained.
#[derive(Clone, Debug)]
pub struct StructuredOutcome {
    pub value: Value,
    pub source: OutcomeSource,
}

/// Coerces model responses into schema-shaped values.
///
/// **Interaction**: planner and validator nodes hold one of these; the
/// only error it can surface is a failed model call (fatal or retry
/// exhaustion), which the owning node escalates as its own failure.
pub struct StructuredOutputPipeline {
    model: Arc<dyn ModelClient>,
    retry: RetryPolicy,
}

impl StructuredOutputPipeline {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self {
            model,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs the full pipeline against `conversation`, asking for `schema`
    /// and resolving to `fallback` if parsing and repair both fail.
    pub async fn extract(
        &self,
        conversation: &[Message],
        schema: &OutputSchema,
        fallback: Value,
        cancel: Option<&CancellationToken>,
    ) -> Result<StructuredOutcome, RetryError<ModelError>> {
        let mut messages = conversation.to_vec();
        messages.push(Message::user(schema.instructions()));

        let response = self.complete(&messages, cancel, "structured completion").await?;

        if let Some(value) = &response.structured {
            if schema.validate(value).is_ok() {
                return Ok(StructuredOutcome {
                    value: value.clone(),
                    source: OutcomeSource::Native,
                });
            }
        }

        let raw = raw_text(&response);
        let first_failure = match parse_and_validate(&raw, schema) {
            Ok(value) => {
                return Ok(StructuredOutcome {
                    value,
                    source: OutcomeSource::Parsed,
                })
            }
            Err(issue) => issue,
        };

        debug!(schema = schema.name(), error = %first_failure, "structured output invalid, repairing");
        let repair = vec![
            Message::system(
                "You are a data conversion agent. Re-emit the requested JSON and nothing else.",
            ),
            Message::user(format!(
                "The previous output was not valid.\n\nOutput:\n{raw}\n\nProblems:\n{first_failure}\n\n{}",
                schema.instructions()
            )),
        ];
        let response = self.complete(&repair, cancel, "structured repair").await?;

        if let Some(value) = &response.structured {
            if schema.validate(value).is_ok() {
                return Ok(StructuredOutcome {
                    value: value.clone(),
                    source: OutcomeSource::Repaired,
                });
            }
        }
        match parse_and_validate(&raw_text(&response), schema) {
            Ok(value) => Ok(StructuredOutcome {
                value,
                source: OutcomeSource::Repaired,
            }),
            Err(issue) => {
                warn!(schema = schema.name(), error = %issue, "repair failed, using fallback value");
                Ok(StructuredOutcome {
                    value: fallback,
                    source: OutcomeSource::Fallback,
                })
            }
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        cancel: Option<&CancellationToken>,
        operation: &str,
    ) -> Result<ModelResponse, RetryError<ModelError>> {
        retry_with_backoff(
            operation,
            &self.retry,
            ModelError::is_transient,
            cancel,
            || self.model.complete(messages),
        )
        .await
    }
}

fn raw_text(response: &ModelResponse) -> String {
    if response.text.is_empty() {
        response
            .structured
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default()
    } else {
        response.text.clone()
    }
}

fn parse_and_validate(raw: &str, schema: &OutputSchema) -> Result<Value, String> {
    let value = parse_payload(raw)?;
    schema
        .validate(&value)
        .map_err(|issues| issues.join("; "))?;
    Ok(value)
}
