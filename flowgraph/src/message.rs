//! Conversation message type shared by model clients and workflow nodes.
//!
//! One role per variant; helper constructors accept anything `Into<String>`.

use serde::{Deserialize, Serialize};

/// A single conversation message: system instruction, user input, or assistant output.
///
/// **Interaction**: `ModelClient::complete` consumes a slice of messages;
/// planner/validator/responder nodes build prompts from them and append
/// assistant output back into the `messages` state field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "content", rename_all = "snake_case")]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    /// Message text regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Self::System(s) | Self::User(s) | Self::Assistant(s) => s,
        }
    }

    /// Display label used when flattening a conversation into a prompt.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
        }
    }
}
