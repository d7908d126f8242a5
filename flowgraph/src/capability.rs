//! Named capabilities: the tools Plan/Execute nodes can invoke.
//!
//! The hosting application registers capabilities (web search, report
//! lookup, data-provider fetch, ...) by name; the executor resolves them
//! at run time. The engine never embeds a concrete provider client.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::retry::transient_signal;

/// Result of one capability invocation, flattened to text the way tool
/// outputs are fed back to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityOutput {
    pub text: String,
}

impl CapabilityOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Error from resolving or invoking a capability.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// No capability registered under the requested name.
    #[error("unknown capability '{0}'")]
    NotFound(String),

    /// The backing service is overloaded or unreachable; worth retrying.
    #[error("capability unavailable: {0}")]
    Unavailable(String),

    /// The arguments do not fit the capability; retrying cannot help.
    #[error("invalid capability arguments: {0}")]
    InvalidArgs(String),

    /// Anything else, classified by message content.
    #[error("capability failed: {0}")]
    Failed(String),
}

impl CapabilityError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::NotFound(_) | Self::InvalidArgs(_) => false,
            Self::Failed(msg) => transient_signal(msg),
        }
    }
}

/// A single invokable capability.
#[async_trait]
pub trait Capability: Send + Sync {
    async fn invoke(&self, args: Value) -> Result<CapabilityOutput, CapabilityError>;
}

/// Name → capability table, assembled by the host and shared with the
/// executor node.
///
/// **Interaction**: built once per process (or per run), passed behind an
/// `Arc` into node constructors; `call` resolves by name.
#[derive(Default)]
pub struct CapabilityRegistry {
    entries: HashMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.entries.insert(name.into(), capability);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Registered names, for planner prompts.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn call(&self, name: &str, args: Value) -> Result<CapabilityOutput, CapabilityError> {
        let capability = self
            .entries
            .get(name)
            .ok_or_else(|| CapabilityError::NotFound(name.to_string()))?;
        capability.invoke(args).await
    }
}

/// Fixed-result capability for tests and examples.
pub struct MockCapability {
    result: String,
}

impl MockCapability {
    pub fn returning(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
        }
    }
}

#[async_trait]
impl Capability for MockCapability {
    async fn invoke(&self, _args: Value) -> Result<CapabilityOutput, CapabilityError> {
        Ok(CapabilityOutput::new(self.result.clone()))
    }
}
