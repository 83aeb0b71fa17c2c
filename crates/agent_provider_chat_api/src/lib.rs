//! Chat-completions-backed implementation of the shared `agent_provider` contract.
//!
//! This adapter translates provider-neutral conversations into `chat_api`
//! requests and maps the first response choice back into a [`ModelReply`].

use std::sync::Arc;
use std::time::Duration;

use agent_provider::{
    ModelProvider, ModelReply, ProviderInitError, ProviderProfile, QueryError, QueryRequest,
    RunMessage, ToolCallRequest, ToolDefinition,
};
use chat_api::{
    ChatApiClient, ChatApiConfig, ChatApiError, ChatFunctionCall, ChatMessage, ChatRequest,
    ChatResponse, ChatTool, ChatToolCall,
};
use serde_json::Value;

/// Stable provider identifier used by `coding_agent` startup selection.
pub const CHAT_API_PROVIDER_ID: &str = "chat-api";

/// Runtime configuration for the chat API provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatApiProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
    pub max_output_tokens: Option<u32>,
}

impl ChatApiProviderConfig {
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: None,
            max_output_tokens: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    fn into_chat_api_config(self) -> ChatApiConfig {
        let mut config = ChatApiConfig::new(self.api_key, self.model.trim());

        if let Some(base_url) = self.base_url {
            config = config.with_base_url(base_url);
        }

        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }

        if let Some(max_output_tokens) = self.max_output_tokens {
            config = config.with_max_output_tokens(max_output_tokens);
        }

        config
    }
}

trait CompletionClient: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ChatApiError>;
}

#[derive(Debug)]
struct DefaultCompletionClient {
    client: ChatApiClient,
}

impl CompletionClient for DefaultCompletionClient {
    fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ChatApiError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                ChatApiError::Unknown(format!("failed to initialize tokio runtime: {error}"))
            })?;

        runtime.block_on(self.client.send(request, None))
    }
}

/// `ModelProvider` adapter backed by `chat_api` transport primitives.
pub struct ChatApiProvider {
    model_id: String,
    client: Arc<dyn CompletionClient>,
}

impl ChatApiProvider {
    /// Creates a provider using real HTTP transport.
    pub fn new(config: ChatApiProviderConfig) -> Result<Self, ProviderInitError> {
        let model_id = config.model.trim().to_string();
        let client = Arc::new(DefaultCompletionClient {
            client: ChatApiClient::new(config.into_chat_api_config()).map_err(map_init_error)?,
        });

        Ok(Self { model_id, client })
    }

    #[cfg(test)]
    fn with_client_for_tests(model_id: &str, client: Arc<dyn CompletionClient>) -> Self {
        Self {
            model_id: model_id.to_string(),
            client,
        }
    }
}

impl ModelProvider for ChatApiProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: CHAT_API_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn query(&self, request: &QueryRequest) -> Result<ModelReply, QueryError> {
        let chat_request = ChatRequest::new(
            self.model_id.clone(),
            request.messages.iter().map(to_chat_message).collect(),
        )
        .with_tools(request.tools.iter().map(to_chat_tool).collect());

        let response = self.client.complete(&chat_request).map_err(map_query_error)?;
        reply_from_response(&response)
    }
}

fn to_chat_message(message: &RunMessage) -> ChatMessage {
    match message {
        RunMessage::System { text } => ChatMessage::text("system", text.as_str()),
        RunMessage::UserText { text } => ChatMessage::text("user", text.as_str()),
        RunMessage::AssistantText { text } => ChatMessage::text("assistant", text.as_str()),
        RunMessage::ToolCall {
            call_id,
            tool_name,
            arguments,
            text,
        } => ChatMessage {
            role: "assistant".to_string(),
            content: (!text.is_empty()).then(|| text.clone()),
            tool_calls: vec![ChatToolCall {
                id: call_id.clone(),
                kind: "function".to_string(),
                function: ChatFunctionCall {
                    name: tool_name.clone(),
                    arguments: arguments.to_string(),
                },
            }],
            tool_call_id: None,
        },
        RunMessage::ToolResult {
            call_id, content, ..
        } => ChatMessage::tool_result(call_id.as_str(), content.as_str()),
    }
}

fn to_chat_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool::function(
        tool.name.clone(),
        tool.description.clone(),
        tool.input_schema.clone(),
    )
}

fn reply_from_response(response: &ChatResponse) -> Result<ModelReply, QueryError> {
    let Some(message) = response.first_message() else {
        return Err(QueryError::retryable("model returned no choices"));
    };

    let text = message
        .content
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let tool_call = match message.tool_calls.first() {
        Some(call) => Some(tool_call_from_wire(call)?),
        None => None,
    };

    Ok(ModelReply { text, tool_call })
}

fn tool_call_from_wire(call: &ChatToolCall) -> Result<ToolCallRequest, QueryError> {
    let raw = call.function.arguments.trim();
    let arguments = if raw.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(raw).map_err(|error| {
            QueryError::retryable(format!(
                "tool call '{}' has malformed JSON arguments: {error}",
                call.function.name
            ))
        })?
    };

    let call_id = if call.id.trim().is_empty() {
        format!("call_{}", call.function.name)
    } else {
        call.id.clone()
    };

    Ok(ToolCallRequest {
        call_id,
        tool_name: call.function.name.clone(),
        arguments,
    })
}

fn map_query_error(error: ChatApiError) -> QueryError {
    let message = format!("chat-api request failed: {error}");
    if error.is_retryable() {
        QueryError::retryable(message)
    } else {
        QueryError::fatal(message)
    }
}

fn map_init_error(error: ChatApiError) -> ProviderInitError {
    ProviderInitError::new(format!("Failed to initialize chat-api provider: {error}"))
}
