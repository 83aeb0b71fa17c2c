//! Command model shared by both protocols.
//!
//! A [`Command`] is the positional form a model produced (and the form kept
//! in the execution history); [`CommandAction`] is the validated, typed view
//! of it that the loop and the interpreter act on.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::tag_protocol::decode_tags;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Opcode {
    ReadFile,
    /// Same as `read_file`, but never deduplicated.
    ReRead,
    ListInDirectory,
    WriteFile,
    ReplaceCodeInFile,
    Report,
    CallAgent,
    Message,
    Exit,
    Stop,
    /// Anything the model invented; kept verbatim (lowercased) for history and errors.
    Unknown(String),
}

impl Opcode {
    /// Case-insensitive parse; tag-protocol models tend to shout (`RE_READ`).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "read_file" => Self::ReadFile,
            "re_read" => Self::ReRead,
            "list_in_directory" => Self::ListInDirectory,
            "write_file" => Self::WriteFile,
            "replace_code_in_file" => Self::ReplaceCodeInFile,
            "report" => Self::Report,
            "call_agent" => Self::CallAgent,
            "message" => Self::Message,
            "exit" => Self::Exit,
            "stop" => Self::Stop,
            _ => Self::Unknown(normalized),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::ReadFile => "read_file",
            Self::ReRead => "re_read",
            Self::ListInDirectory => "list_in_directory",
            Self::WriteFile => "write_file",
            Self::ReplaceCodeInFile => "replace_code_in_file",
            Self::Report => "report",
            Self::CallAgent => "call_agent",
            Self::Message => "message",
            Self::Exit => "exit",
            Self::Stop => "stop",
            Self::Unknown(raw) => raw,
        }
    }

    /// `re_read` always re-executes; every other opcode is deduplicated.
    #[must_use]
    pub fn is_dedup_exempt(&self) -> bool {
        matches!(self, Self::ReRead)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One decoded command; immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub opcode: Opcode,
    pub arguments: Vec<String>,
    pub plan: Vec<String>,
}

impl Command {
    #[must_use]
    pub fn new(opcode: Opcode, arguments: Vec<String>) -> Self {
        Self {
            opcode,
            arguments,
            plan: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_plan(mut self, plan: Vec<String>) -> Self {
        self.plan = plan;
        self
    }

    /// Identity used for deduplication: `opcode:["arg", ...]`.
    #[must_use]
    pub fn dedup_key(&self) -> String {
        let arguments = Value::from(self.arguments.clone());
        format!("{}:{}", self.opcode.as_str(), arguments)
    }
}

/// Invalid command shape, caught before anything executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode '{0}'")]
    UnknownOpcode(String),

    #[error("{opcode} expects {expected} argument(s), got {found}")]
    WrongArity {
        opcode: String,
        expected: &'static str,
        found: usize,
    },

    #[error("{opcode} requires argument '{name}'")]
    MissingArgument { opcode: String, name: &'static str },

    #[error("{opcode} argument '{name}' must be a string")]
    InvalidArgument { opcode: String, name: &'static str },
}

/// Replacement requested by `replace_code_in_file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeEdit {
    FindReplace { find: String, replace: String },
    /// SEARCH/REPLACE marker text, parsed by the interpreter.
    Patch(String),
}

/// Typed, validated form of a [`Command`].
#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    ReadFile { path: String },
    ReRead { path: String },
    ListInDirectory { path: String },
    /// `content` is usually a string; tool-calling models sometimes send raw JSON.
    WriteFile { path: String, content: Value },
    ReplaceCodeInFile { path: String, edit: CodeEdit },
    Report { text: String },
    CallAgent { agent_name: String, instruction: String },
    Message { text: String },
    Exit,
    Stop,
}

impl CommandAction {
    /// Validates the positional arguments of `command`.
    pub fn from_command(command: &Command) -> Result<Self, DecodeError> {
        let args = &command.arguments;
        let opcode = &command.opcode;
        let arity = |expected: &'static str| DecodeError::WrongArity {
            opcode: opcode.to_string(),
            expected,
            found: args.len(),
        };

        let action = match (opcode, args.as_slice()) {
            (Opcode::ReadFile, [path]) => Self::ReadFile { path: path.clone() },
            (Opcode::ReRead, [path]) => Self::ReRead { path: path.clone() },
            (Opcode::ListInDirectory, [path]) => Self::ListInDirectory { path: path.clone() },
            (Opcode::WriteFile, [path, content]) => Self::WriteFile {
                path: path.clone(),
                content: Value::String(content.clone()),
            },
            (Opcode::ReplaceCodeInFile, [path, find, replace]) => Self::ReplaceCodeInFile {
                path: path.clone(),
                edit: CodeEdit::FindReplace {
                    find: find.clone(),
                    replace: replace.clone(),
                },
            },
            (Opcode::ReplaceCodeInFile, [path, patch]) => Self::ReplaceCodeInFile {
                path: path.clone(),
                edit: CodeEdit::Patch(patch.clone()),
            },
            (Opcode::Report, [text]) => Self::Report { text: text.clone() },
            (Opcode::Message, [text]) => Self::Message { text: text.clone() },
            (Opcode::CallAgent, [agent_name, instruction]) => Self::CallAgent {
                agent_name: agent_name.clone(),
                instruction: instruction.clone(),
            },
            (Opcode::Exit, _) => Self::Exit,
            (Opcode::Stop, _) => Self::Stop,
            (Opcode::Unknown(raw), _) => return Err(DecodeError::UnknownOpcode(raw.clone())),
            (Opcode::ReadFile | Opcode::ReRead | Opcode::ListInDirectory, _) => {
                return Err(arity("1"))
            }
            (Opcode::Report | Opcode::Message, _) => return Err(arity("1")),
            (Opcode::WriteFile | Opcode::CallAgent, _) => return Err(arity("2")),
            (Opcode::ReplaceCodeInFile, _) => return Err(arity("2 or 3")),
        };

        Ok(action)
    }

    /// Validates a structured tool call and derives its positional [`Command`].
    pub fn from_tool_call(tool_name: &str, arguments: &Value) -> Result<(Command, Self), DecodeError> {
        let opcode = Opcode::parse(tool_name);
        let empty = Map::new();
        let fields = arguments.as_object().unwrap_or(&empty);
        let string = |name: &'static str| -> Result<String, DecodeError> {
            match fields.get(name) {
                Some(Value::String(value)) => Ok(value.clone()),
                Some(_) => Err(DecodeError::InvalidArgument {
                    opcode: opcode.to_string(),
                    name,
                }),
                None => Err(DecodeError::MissingArgument {
                    opcode: opcode.to_string(),
                    name,
                }),
            }
        };

        let (positional, action) = match &opcode {
            Opcode::ReadFile | Opcode::ReRead | Opcode::ListInDirectory => {
                let path = string("path")?;
                let action = match opcode {
                    Opcode::ReadFile => Self::ReadFile { path: path.clone() },
                    Opcode::ReRead => Self::ReRead { path: path.clone() },
                    _ => Self::ListInDirectory { path: path.clone() },
                };
                (vec![path], action)
            }
            Opcode::WriteFile => {
                let path = string("path")?;
                let content = fields.get("content").cloned().ok_or_else(|| {
                    DecodeError::MissingArgument {
                        opcode: opcode.to_string(),
                        name: "content",
                    }
                })?;
                let content_text = match &content {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                (
                    vec![path.clone(), content_text],
                    Self::WriteFile { path, content },
                )
            }
            Opcode::ReplaceCodeInFile => {
                let path = string("path")?;
                if fields.contains_key("patch") {
                    let patch = string("patch")?;
                    (
                        vec![path.clone(), patch.clone()],
                        Self::ReplaceCodeInFile {
                            path,
                            edit: CodeEdit::Patch(patch),
                        },
                    )
                } else {
                    let find = string("str_find")?;
                    let replace = string("str_replace")?;
                    (
                        vec![path.clone(), find.clone(), replace.clone()],
                        Self::ReplaceCodeInFile {
                            path,
                            edit: CodeEdit::FindReplace { find, replace },
                        },
                    )
                }
            }
            Opcode::Report | Opcode::Message => {
                let text = string("text")?;
                let action = if opcode == Opcode::Report {
                    Self::Report { text: text.clone() }
                } else {
                    Self::Message { text: text.clone() }
                };
                (vec![text], action)
            }
            Opcode::CallAgent => {
                let agent_name = string("agent_name")?;
                let instruction = string("instruction")?;
                (
                    vec![agent_name.clone(), instruction.clone()],
                    Self::CallAgent {
                        agent_name,
                        instruction,
                    },
                )
            }
            Opcode::Exit => (Vec::new(), Self::Exit),
            Opcode::Stop => (Vec::new(), Self::Stop),
            Opcode::Unknown(raw) => return Err(DecodeError::UnknownOpcode(raw.clone())),
        };

        Ok((Command::new(opcode, positional), action))
    }
}

/// Decodes every `<COMMAND>` block of a tag-protocol reply, in order.
///
/// Blocks without an `<OPCODE>` are skipped. The reply-level `<PLAN>` is
/// attached to each command.
#[must_use]
pub fn decode_commands(reply: &str) -> Vec<Command> {
    let decoded = decode_tags(reply, &["COMMAND", "PLAN"]);
    let plan: Vec<String> = decoded
        .get("PLAN")
        .map(|plans| plans.iter().map(|plan| plan.trim().to_string()).collect())
        .unwrap_or_default();

    decoded
        .get("COMMAND")
        .into_iter()
        .flatten()
        .filter_map(|block| {
            let fields = decode_tags(block, &["OPCODE", "ARG"]);
            let opcode = fields.get("OPCODE")?.first()?.trim().to_string();
            if opcode.is_empty() {
                return None;
            }

            let arguments = fields.get("ARG").cloned().unwrap_or_default();
            Some(Command::new(Opcode::parse(&opcode), arguments).with_plan(plan.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn opcode_parse_is_case_insensitive_and_keeps_unknowns() {
        assert_eq!(Opcode::parse("RE_READ"), Opcode::ReRead);
        assert_eq!(Opcode::parse(" Read_File "), Opcode::ReadFile);
        assert_eq!(Opcode::parse("DELETE"), Opcode::Unknown("delete".to_string()));
        assert!(Opcode::ReRead.is_dedup_exempt());
        assert!(!Opcode::ReadFile.is_dedup_exempt());
    }

    #[test]
    fn dedup_key_is_opcode_and_json_arguments() {
        let command = Command::new(Opcode::ReadFile, vec!["a.txt".to_string()]);
        assert_eq!(command.dedup_key(), r#"read_file:["a.txt"]"#);

        let other_plan = command.clone().with_plan(vec!["look again".to_string()]);
        assert_eq!(other_plan.dedup_key(), command.dedup_key());
    }

    #[test]
    fn decode_commands_reads_opcode_arguments_and_plan() {
        let reply = r#"I will fix it.
<PLAN>1. read
2. patch</PLAN>
<COMMAND>
    <OPCODE>REPLACE_CODE_IN_FILE</OPCODE>
    <ARG>src/lib.rs</ARG>
    <ARG>fn a() {}</ARG>
    <ARG>fn a() -> u8 { 1 }</ARG>
</COMMAND>
<COMMAND><ARG>no opcode</ARG></COMMAND>"#;

        let commands = decode_commands(reply);

        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].opcode, Opcode::ReplaceCodeInFile);
        assert_eq!(commands[0].arguments.len(), 3);
        assert_eq!(commands[0].arguments[2], "fn a() -> u8 { 1 }");
        assert_eq!(commands[0].plan, vec!["1. read\n2. patch"]);
    }

    #[test]
    fn from_command_validates_arity() {
        let ok = CommandAction::from_command(&Command::new(
            Opcode::ReplaceCodeInFile,
            vec!["a".to_string(), "<<<<<<< SEARCH".to_string()],
        ))
        .expect("two-argument patch form");
        assert!(matches!(
            ok,
            CommandAction::ReplaceCodeInFile {
                edit: CodeEdit::Patch(_),
                ..
            }
        ));

        let error = CommandAction::from_command(&Command::new(Opcode::ReadFile, Vec::new()))
            .expect_err("read_file needs a path");
        assert_eq!(
            error,
            DecodeError::WrongArity {
                opcode: "read_file".to_string(),
                expected: "1",
                found: 0,
            }
        );

        let error = CommandAction::from_command(&Command::new(
            Opcode::parse("rm"),
            vec!["x".to_string()],
        ))
        .expect_err("unknown opcode");
        assert_eq!(error, DecodeError::UnknownOpcode("rm".to_string()));
    }

    #[test]
    fn from_tool_call_maps_named_arguments_to_positional_command() {
        let (command, action) = CommandAction::from_tool_call(
            "replace_code_in_file",
            &json!({"path": "a.rs", "str_find": "x", "str_replace": "y"}),
        )
        .expect("valid call");
        assert_eq!(command.arguments, vec!["a.rs", "x", "y"]);
        assert_eq!(
            action,
            CommandAction::ReplaceCodeInFile {
                path: "a.rs".to_string(),
                edit: CodeEdit::FindReplace {
                    find: "x".to_string(),
                    replace: "y".to_string(),
                },
            }
        );

        let (command, action) = CommandAction::from_tool_call(
            "write_file",
            &json!({"path": "data.json", "content": {"id": 1}}),
        )
        .expect("json content is accepted here");
        assert_eq!(command.arguments[1], r#"{"id":1}"#);
        assert!(matches!(action, CommandAction::WriteFile { content: Value::Object(_), .. }));

        let (command, action) =
            CommandAction::from_tool_call("exit", &json!({})).expect("exit takes nothing");
        assert!(command.arguments.is_empty());
        assert_eq!(action, CommandAction::Exit);
    }

    #[test]
    fn from_tool_call_rejects_missing_or_non_string_arguments() {
        assert_eq!(
            CommandAction::from_tool_call("call_agent", &json!({"agent_name": "CODER"}))
                .expect_err("instruction missing"),
            DecodeError::MissingArgument {
                opcode: "call_agent".to_string(),
                name: "instruction",
            }
        );
        assert_eq!(
            CommandAction::from_tool_call("read_file", &json!({"path": 7}))
                .expect_err("path must be a string"),
            DecodeError::InvalidArgument {
                opcode: "read_file".to_string(),
                name: "path",
            }
        );
    }
}
