//! Minimal provider-agnostic contract for querying a language model.
//!
//! This crate defines only the conversation, tool schema and reply types shared
//! by agent loops and provider adapters. Transport details and retry policy
//! live in the adapters and in the caller respectively.

use std::fmt;
use std::sync::{atomic::AtomicBool, Arc};

use serde_json::Value;

/// Shared cancellation flag for a run.
pub type CancelSignal = Arc<AtomicBool>;

/// Error returned while constructing/configuring a provider before any query is made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

/// Failure of a single model query.
///
/// `retryable` marks transient transport failures; callers decide how often
/// to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryError {
    message: String,
    retryable: bool,
}

impl QueryError {
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    #[must_use]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for QueryError {}

/// Provider-neutral, role-tagged conversation item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMessage {
    System {
        text: String,
    },
    UserText {
        text: String,
    },
    AssistantText {
        text: String,
    },
    /// Assistant turn that selected a tool; `text` is any narration sent alongside it.
    ToolCall {
        call_id: String,
        tool_name: String,
        arguments: Value,
        text: String,
    },
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

impl RunMessage {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::System { text: text.into() }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserText { text: text.into() }
    }

    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantText { text: text.into() }
    }

    /// Builds the tool result answering `call`.
    #[must_use]
    pub fn tool_result(call: &ToolCallRequest, content: impl Into<String>, is_error: bool) -> Self {
        Self::ToolResult {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            content: content.into(),
            is_error,
        }
    }

    /// Wire role name (`system`, `user`, `assistant`, `tool`).
    #[must_use]
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::UserText { .. } => "user",
            Self::AssistantText { .. } | Self::ToolCall { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }
}

/// Generic host-mediated tool definition offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Tool invocation selected by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    /// Records this call as an assistant conversation item.
    #[must_use]
    pub fn to_message(&self, text: impl Into<String>) -> RunMessage {
        RunMessage::ToolCall {
            call_id: self.call_id.clone(),
            tool_name: self.tool_name.clone(),
            arguments: self.arguments.clone(),
            text: text.into(),
        }
    }
}

/// Input for one model query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub messages: Vec<RunMessage>,
    /// Tools offered for this turn; empty for the free-text protocol.
    pub tools: Vec<ToolDefinition>,
}

impl QueryRequest {
    #[must_use]
    pub fn new(messages: Vec<RunMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Model answer: raw text plus at most one selected tool invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelReply {
    pub text: String,
    pub tool_call: Option<ToolCallRequest>,
}

impl ModelReply {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_call: None,
        }
    }

    #[must_use]
    pub fn tool_call(
        call_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            text: String::new(),
            tool_call: Some(ToolCallRequest {
                call_id: call_id.into(),
                tool_name: tool_name.into(),
                arguments,
            }),
        }
    }

    /// True when the reply carries neither text nor a tool call.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tool_call.is_none()
    }
}

/// Immutable metadata describing a model provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub provider_id: String,
    pub model_id: String,
}

/// Provider interface for answering one query.
///
/// Queries are blocking; agent loops call them from worker threads.
pub trait ModelProvider: Send + Sync + 'static {
    /// Returns provider/model identity metadata.
    fn profile(&self) -> ProviderProfile;

    /// Sends the conversation to the model and returns its reply.
    fn query(&self, request: &QueryRequest) -> Result<ModelReply, QueryError>;
}
