//! Deterministic mock implementation of the shared `agent_provider` contract.
//!
//! Replies are either scripted in order or synthesized from the offered tools,
//! so agent loops can be exercised without any transport.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use agent_provider::{ModelProvider, ModelReply, ProviderProfile, QueryError, QueryRequest};
use serde_json::json;

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

/// Text reply used by the default provider when no tools are offered.
pub const DEFAULT_TAG_REPLY: &str =
    "<COMMAND><PLAN>nothing to do</PLAN><OPCODE>exit</OPCODE></COMMAND>";

type ScriptedReply = Result<ModelReply, QueryError>;

#[derive(Debug)]
enum Script {
    /// Replies are consumed in order; the last one repeats once the queue is drained.
    Queue {
        replies: VecDeque<ScriptedReply>,
        last: Option<ScriptedReply>,
    },
    /// Finishes every run: `report` when offered, otherwise `exit`.
    Auto,
}

/// Deterministic mock provider used by `coding_agent` tests and local runs.
#[derive(Debug)]
pub struct MockProvider {
    model_id: String,
    script: Mutex<Script>,
    requests: Mutex<Vec<QueryRequest>>,
}

impl MockProvider {
    /// Creates a provider answering with `replies` in order.
    #[must_use]
    pub fn new(replies: Vec<ModelReply>) -> Self {
        Self::from_results(replies.into_iter().map(Ok).collect())
    }

    /// Creates a provider whose script may include query failures.
    #[must_use]
    pub fn from_results(replies: Vec<ScriptedReply>) -> Self {
        Self::with_script(Script::Queue {
            replies: replies.into(),
            last: None,
        })
    }

    /// Creates a provider that answers every query with `reply`.
    #[must_use]
    pub fn repeating(reply: ModelReply) -> Self {
        Self::with_script(Script::Queue {
            replies: VecDeque::new(),
            last: Some(Ok(reply)),
        })
    }

    #[must_use]
    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        let model_id = model_id.into();
        if !model_id.trim().is_empty() {
            self.model_id = model_id.trim().to_string();
        }
        self
    }

    /// Requests received so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<QueryRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn query_count(&self) -> usize {
        lock_unpoisoned(&self.requests).len()
    }

    fn with_script(script: Script) -> Self {
        Self {
            model_id: "mock".to_string(),
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::with_script(Script::Auto)
    }
}

impl ModelProvider for MockProvider {
    fn profile(&self) -> ProviderProfile {
        ProviderProfile {
            provider_id: MOCK_PROVIDER_ID.to_string(),
            model_id: self.model_id.clone(),
        }
    }

    fn query(&self, request: &QueryRequest) -> Result<ModelReply, QueryError> {
        let query_index = {
            let mut requests = lock_unpoisoned(&self.requests);
            requests.push(request.clone());
            requests.len()
        };

        let mut script = lock_unpoisoned(&self.script);
        match &mut *script {
            Script::Queue { replies, last } => match replies.pop_front() {
                Some(reply) => {
                    if replies.is_empty() {
                        *last = Some(reply.clone());
                    }
                    reply
                }
                None => last
                    .clone()
                    .unwrap_or_else(|| Err(QueryError::fatal("mock script is empty"))),
            },
            Script::Auto => Ok(auto_reply(request, query_index)),
        }
    }
}

fn auto_reply(request: &QueryRequest, query_index: usize) -> ModelReply {
    let offers = |name: &str| request.tools.iter().any(|tool| tool.name == name);
    let call_id = format!("mock-call-{query_index}");

    if offers("report") {
        ModelReply::tool_call(
            call_id,
            "report",
            json!({ "text": "Mock provider finished without touching the project." }),
        )
    } else if offers("exit") {
        ModelReply::tool_call(call_id, "exit", json!({}))
    } else {
        ModelReply::text(DEFAULT_TAG_REPLY)
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use agent_provider::{RunMessage, ToolDefinition};

    use super::*;

    fn request() -> QueryRequest {
        QueryRequest::new(vec![RunMessage::user("do it")])
    }

    fn tool(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.to_string(),
            description: None,
            input_schema: json!({"type": "object"}),
        }
    }

    #[test]
    fn profile_exposes_explicit_mock_provider_identity() {
        let profile = MockProvider::default().with_model_id("  scripted ").profile();

        assert_eq!(profile.provider_id, MOCK_PROVIDER_ID);
        assert_eq!(profile.model_id, "scripted");
    }

    #[test]
    fn scripted_replies_are_returned_in_order_then_last_repeats() {
        let provider = MockProvider::new(vec![ModelReply::text("one"), ModelReply::text("two")]);

        let texts: Vec<String> = (0..3)
            .map(|_| provider.query(&request()).expect("scripted reply").text)
            .collect();

        assert_eq!(texts, vec!["one", "two", "two"]);
        assert_eq!(provider.query_count(), 3);
    }

    #[test]
    fn scripted_failures_surface_as_query_errors() {
        let provider = MockProvider::from_results(vec![
            Err(QueryError::retryable("HTTP 503")),
            Ok(ModelReply::text("recovered")),
        ]);

        let error = provider.query(&request()).expect_err("first reply fails");
        assert!(error.is_retryable());
        assert_eq!(provider.query(&request()).expect("second reply").text, "recovered");
    }

    #[test]
    fn empty_script_is_a_fatal_error() {
        let provider = MockProvider::new(Vec::new());
        let error = provider.query(&request()).expect_err("nothing scripted");
        assert!(!error.is_retryable());
    }

    #[test]
    fn default_provider_finishes_runs_with_offered_tools() {
        let provider = MockProvider::default();

        let report = provider
            .query(&request().with_tools(vec![tool("read_file"), tool("report")]))
            .expect("auto reply");
        assert_eq!(
            report.tool_call.map(|call| call.tool_name).as_deref(),
            Some("report")
        );

        let exit = provider
            .query(&request().with_tools(vec![tool("call_agent"), tool("exit")]))
            .expect("auto reply");
        assert_eq!(exit.tool_call.map(|call| call.tool_name).as_deref(), Some("exit"));

        let tags = provider.query(&request()).expect("auto reply");
        assert_eq!(tags.text, DEFAULT_TAG_REPLY);
        assert_eq!(provider.requests().len(), 3);
    }
}
