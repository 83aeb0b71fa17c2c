//! Per-role conversation filters for the tool-calling protocol.

use agent_provider::{RunMessage, ToolCallRequest};

use crate::agent::DUPLICATE_RESULT;
use crate::commands::Opcode;

/// Synthetic tool result for a `read_file` that repeats the previous call.
pub const FILE_ALREADY_READ: &str = "file already read";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    /// Execute the latest tool call as usual.
    Proceed,
    /// The filter answered the latest tool call itself; the step is over.
    StepHandled,
}

/// Inspects the conversation after the model's latest tool call, before it
/// is deduplicated or executed.
pub trait ConversationFilter: Send + Sync {
    fn filter(&self, conversation: &mut Vec<RunMessage>) -> FilterOutcome;
}

/// Leaves the conversation untouched.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThrough;

impl ConversationFilter for PassThrough {
    fn filter(&self, _conversation: &mut Vec<RunMessage>) -> FilterOutcome {
        FilterOutcome::Proceed
    }
}

/// Answers a `read_file` call identical to the tool call right before it
/// with [`FILE_ALREADY_READ`] instead of reading the file again.
///
/// Only fires when that previous call was really executed; further repeats
/// fall through to deduplication.
#[derive(Debug, Default, Clone, Copy)]
pub struct RepeatedReadFilter;

impl ConversationFilter for RepeatedReadFilter {
    fn filter(&self, conversation: &mut Vec<RunMessage>) -> FilterOutcome {
        let mut call_positions = conversation
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, message)| matches!(message, RunMessage::ToolCall { .. }))
            .map(|(index, _)| index);
        let (Some(latest), Some(previous)) = (call_positions.next(), call_positions.next()) else {
            return FilterOutcome::Proceed;
        };

        let (
            RunMessage::ToolCall {
                call_id,
                tool_name,
                arguments,
                ..
            },
            RunMessage::ToolCall {
                tool_name: previous_name,
                arguments: previous_arguments,
                ..
            },
        ) = (&conversation[latest], &conversation[previous])
        else {
            return FilterOutcome::Proceed;
        };

        let repeated = Opcode::parse(tool_name) == Opcode::ReadFile
            && Opcode::parse(previous_name) == Opcode::ReadFile
            && previous_arguments == arguments
            && was_executed(&conversation[previous + 1..latest]);
        if !repeated {
            return FilterOutcome::Proceed;
        }

        let call = ToolCallRequest {
            call_id: call_id.clone(),
            tool_name: tool_name.clone(),
            arguments: arguments.clone(),
        };
        conversation.push(RunMessage::tool_result(&call, FILE_ALREADY_READ, false));
        FilterOutcome::StepHandled
    }
}

/// True when the tool result answering a call (the first one in `after_call`)
/// came from a real execution rather than a synthetic answer.
fn was_executed(after_call: &[RunMessage]) -> bool {
    after_call
        .iter()
        .find_map(|message| match message {
            RunMessage::ToolResult { content, .. } => Some(content),
            _ => None,
        })
        .is_some_and(|content| content != FILE_ALREADY_READ && content != DUPLICATE_RESULT)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn read_call(id: &str, path: &str) -> RunMessage {
        RunMessage::ToolCall {
            call_id: id.to_string(),
            tool_name: "read_file".to_string(),
            arguments: json!({ "path": path }),
            text: String::new(),
        }
    }

    fn result(id: &str) -> RunMessage {
        RunMessage::ToolResult {
            call_id: id.to_string(),
            tool_name: "read_file".to_string(),
            content: "fn main() {}".to_string(),
            is_error: false,
        }
    }

    #[test]
    fn second_identical_read_in_a_row_is_answered_synthetically() {
        let mut conversation = vec![
            RunMessage::user("fix main"),
            read_call("c1", "src/main.rs"),
            result("c1"),
            read_call("c2", "src/main.rs"),
        ];

        assert_eq!(
            RepeatedReadFilter.filter(&mut conversation),
            FilterOutcome::StepHandled
        );
        assert!(matches!(
            conversation.last(),
            Some(RunMessage::ToolResult { call_id, content, .. })
                if call_id == "c2" && content == FILE_ALREADY_READ
        ));
    }

    #[test]
    fn read_after_a_synthetic_answer_proceeds() {
        let mut conversation = vec![
            read_call("c1", "src/main.rs"),
            result("c1"),
            read_call("c2", "src/main.rs"),
            RunMessage::ToolResult {
                call_id: "c2".to_string(),
                tool_name: "read_file".to_string(),
                content: FILE_ALREADY_READ.to_string(),
                is_error: false,
            },
            read_call("c3", "src/main.rs"),
        ];

        assert_eq!(
            RepeatedReadFilter.filter(&mut conversation),
            FilterOutcome::Proceed
        );
        assert_eq!(conversation.len(), 5);
    }

    #[test]
    fn reads_of_different_files_proceed() {
        let mut conversation = vec![
            read_call("c1", "src/main.rs"),
            result("c1"),
            read_call("c2", "src/lib.rs"),
        ];

        assert_eq!(
            RepeatedReadFilter.filter(&mut conversation),
            FilterOutcome::Proceed
        );
        assert_eq!(conversation.len(), 3);
    }

    #[test]
    fn pass_through_never_intervenes() {
        let mut conversation = vec![read_call("c1", "a"), result("c1"), read_call("c2", "a")];
        assert_eq!(PassThrough.filter(&mut conversation), FilterOutcome::Proceed);
    }
}
