//! Model client abstraction: the engine's only view of an LLM.
//!
//! The hosting application supplies the concrete client (OpenAI, Gemini,
//! local, ...); the engine consumes the trait. `MockModel` ships for tests
//! and examples: a scripted queue of responses, no network.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::message::Message;
use crate::retry::transient_signal;

/// One completion: assistant text, plus the host's already-parsed value
/// when its native structured-output mode produced one.
#[derive(Clone, Debug, Default)]
pub struct ModelResponse {
    /// Raw assistant text; may wrap JSON in prose or code fences.
    pub text: String,
    /// Fast path: schema-shaped value parsed by the hosting client itself.
    pub structured: Option<Value>,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            text: String::new(),
            structured: Some(value),
        }
    }
}

/// Error from a model completion.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The provider is overloaded or rate limiting; worth retrying.
    #[error("model overloaded: {0}")]
    Overloaded(String),

    /// The call exceeded its deadline; worth retrying.
    #[error("model call timed out: {0}")]
    Timeout(String),

    /// The request itself is wrong (schema, auth, quota shape); retrying
    /// the same call cannot succeed.
    #[error("model rejected request: {0}")]
    InvalidRequest(String),

    /// Anything else, classified by message content.
    #[error("model error: {0}")]
    Other(String),
}

impl ModelError {
    /// Whether the retry wrapper should try this call again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Overloaded(_) | Self::Timeout(_) => true,
            Self::InvalidRequest(_) => false,
            Self::Other(msg) => transient_signal(msg),
        }
    }
}

/// Model client: given a conversation, produce one completion.
///
/// **Interaction**: the structured output pipeline calls this through the
/// retry wrapper; planner/validator/responder nodes hold a pipeline or a
/// client directly (constructor injection, never a global).
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<ModelResponse, ModelError>;
}

/// Scripted model for tests and examples: pops queued results in order,
/// then repeats a default response once the queue is empty.
pub struct MockModel {
    script: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    default_response: ModelResponse,
    calls: AtomicUsize,
}

impl MockModel {
    /// A mock that always returns the same text.
    pub fn fixed(text: impl Into<String>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_response: ModelResponse::text(text),
            calls: AtomicUsize::new(0),
        }
    }

    /// A mock that plays the given results in order, then falls back to
    /// the default response.
    pub fn scripted(script: Vec<Result<ModelResponse, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            default_response: ModelResponse::text("{}"),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replaces the response used once the script is exhausted.
    pub fn with_default(mut self, response: ModelResponse) -> Self {
        self.default_response = response;
        self
    }

    /// Completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelClient for MockModel {
    async fn complete(&self, _messages: &[Message]) -> Result<ModelResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .expect("mock script lock")
            .pop_front();
        match next {
            Some(result) => result,
            None => Ok(self.default_response.clone()),
        }
    }
}
