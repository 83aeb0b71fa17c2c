//! Agent roles: prompts, opcode allow-lists and tool schemas.

use std::fmt;

use agent_provider::ToolDefinition;
use serde_json::{json, Value};

use crate::commands::Opcode;
use crate::filter::{ConversationFilter, PassThrough, RepeatedReadFilter};
use crate::project::Manifest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentRole {
    /// Reads and reports, never writes.
    Analytic,
    Coder,
    /// Delegates to the other roles and talks to the user.
    Supervisor,
}

/// How commands travel between the model and the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Structured tool calls.
    #[default]
    Tools,
    /// `<COMMAND>` blocks in free text.
    Tags,
}

impl Protocol {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tools" => Some(Self::Tools),
            "tags" => Some(Self::Tags),
            _ => None,
        }
    }
}

const ANALYTIC_OPCODES: &[Opcode] = &[
    Opcode::ReadFile,
    Opcode::ReRead,
    Opcode::ListInDirectory,
    Opcode::Report,
];

const CODER_OPCODES: &[Opcode] = &[
    Opcode::ReadFile,
    Opcode::ReRead,
    Opcode::ListInDirectory,
    Opcode::WriteFile,
    Opcode::ReplaceCodeInFile,
    Opcode::Report,
];

const SUPERVISOR_OPCODES: &[Opcode] = &[Opcode::CallAgent, Opcode::Message, Opcode::Exit];

static REPEATED_READ: RepeatedReadFilter = RepeatedReadFilter;
static PASS_THROUGH: PassThrough = PassThrough;

impl AgentRole {
    pub const ALL: [AgentRole; 3] = [Self::Analytic, Self::Coder, Self::Supervisor];

    /// Case-insensitive role name lookup.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ANALYTIC" => Some(Self::Analytic),
            "CODER" => Some(Self::Coder),
            "SUPERVISOR" => Some(Self::Supervisor),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analytic => "ANALYTIC",
            Self::Coder => "CODER",
            Self::Supervisor => "SUPERVISOR",
        }
    }

    /// Opcodes this role may execute; `exit` and `stop` are always accepted.
    #[must_use]
    pub fn allowed_opcodes(self) -> &'static [Opcode] {
        match self {
            Self::Analytic => ANALYTIC_OPCODES,
            Self::Coder => CODER_OPCODES,
            Self::Supervisor => SUPERVISOR_OPCODES,
        }
    }

    #[must_use]
    pub fn allows(self, opcode: &Opcode) -> bool {
        matches!(opcode, Opcode::Exit | Opcode::Stop) || self.allowed_opcodes().contains(opcode)
    }

    /// Roles a supervisor may delegate to.
    #[must_use]
    pub fn is_delegate(self) -> bool {
        matches!(self, Self::Analytic | Self::Coder)
    }

    #[must_use]
    pub fn conversation_filter(self) -> &'static dyn ConversationFilter {
        match self {
            Self::Coder => &REPEATED_READ,
            Self::Analytic | Self::Supervisor => &PASS_THROUGH,
        }
    }

    /// Tools offered to the model under the tool-calling protocol.
    #[must_use]
    pub fn tools(self) -> Vec<ToolDefinition> {
        self.allowed_opcodes()
            .iter()
            .filter_map(tool_definition)
            .collect()
    }

    #[must_use]
    pub fn system_prompt(self, protocol: Protocol) -> String {
        let mut prompt = String::from(match self {
            Self::Analytic => ANALYTIC_SYSTEM,
            Self::Coder => CODER_SYSTEM,
            Self::Supervisor => SUPERVISOR_SYSTEM,
        });

        if protocol == Protocol::Tags {
            prompt.push_str("\n\n");
            prompt.push_str(TAG_DSL);
            prompt.push_str("\nAvailable opcodes:\n");
            for opcode in self.allowed_opcodes() {
                prompt.push_str(&format!("- {}\n", opcode.as_str().to_ascii_uppercase()));
            }
        }

        prompt
    }

    /// User turn for one step: instruction, project context and (for the tag
    /// protocol) the transcript of executed commands.
    #[must_use]
    pub fn step_prompt(self, manifest: &Manifest, instruction: &str, transcript: &str) -> String {
        let mut prompt = String::new();

        if !manifest.description.is_empty() {
            prompt.push_str(&format!("Project description:\n{}\n\n", manifest.description));
        }
        prompt.push_str(&format!(
            "Project structure (root entries):\n{}\n\n",
            manifest.structure_listing()
        ));
        if let Some(open_file) = &manifest.current_open_file {
            prompt.push_str(&format!("Path of current open file in IDE: `{open_file}`\n\n"));
        }
        prompt.push_str(&format!("Instruction:\n{instruction}\n"));

        if !transcript.is_empty() {
            prompt.push_str(&format!("\nExecuted commands:\n<COMMANDS>\n{transcript}\n</COMMANDS>\n"));
        }

        prompt
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn tool_definition(opcode: &Opcode) -> Option<ToolDefinition> {
    let (description, input_schema) = match opcode {
        Opcode::ReadFile => ("Read file by path and return its content", path_schema("path to file")),
        Opcode::ReRead => (
            "Read a file again after it was changed; never skipped as a repeat",
            path_schema("path to file"),
        ),
        Opcode::ListInDirectory => (
            "List files and directories at path (first level only); directory names end with `/`",
            path_schema("path, use `.` for the project root"),
        ),
        Opcode::WriteFile => (
            "Write the full content of a file. Use only for new files or files under 100 lines",
            json!({
                "type": "object",
                "required": ["path", "content"],
                "properties": {
                    "path": { "type": "string", "description": "path to file" },
                    "content": {
                        "type": "string",
                        "description": "file content, may be wrapped in a ``` code fence"
                    }
                }
            }),
        ),
        Opcode::ReplaceCodeInFile => (
            "Replace part of a file. Locates str_find (whitespace-insensitive, must be unique) and replaces it with str_replace; alternatively pass SEARCH/REPLACE blocks in patch",
            json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": { "type": "string", "description": "path to file" },
                    "str_find": {
                        "type": "string",
                        "description": "fragment to replace; include 1-2 surrounding lines so it is unique"
                    },
                    "str_replace": { "type": "string", "description": "replacement fragment" },
                    "patch": {
                        "type": "string",
                        "description": "<<<<<<< SEARCH / ======= / >>>>>>> REPLACE blocks, applied in order"
                    }
                }
            }),
        ),
        Opcode::Report => (
            "Finish the work with a short markdown report. Do not include full file contents",
            text_schema("report in markdown format"),
        ),
        Opcode::CallAgent => (
            "Call an agent to execute a sub-task",
            json!({
                "type": "object",
                "required": ["agent_name", "instruction"],
                "properties": {
                    "agent_name": {
                        "type": "string",
                        "description": "agent name, one of: ANALYTIC, CODER"
                    },
                    "instruction": {
                        "type": "string",
                        "description": "complete instruction for the agent, including all data it needs"
                    }
                }
            }),
        ),
        Opcode::Message => (
            "Show a message to the user: intermediate results or comments",
            text_schema("message in markdown format"),
        ),
        Opcode::Exit => (
            "Stop the conversation once the goal is fully achieved",
            json!({ "type": "object", "properties": {} }),
        ),
        Opcode::Stop | Opcode::Unknown(_) => return None,
    };

    Some(ToolDefinition {
        name: opcode.as_str().to_string(),
        description: Some(description.to_string()),
        input_schema,
    })
}

fn path_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "required": ["path"],
        "properties": { "path": { "type": "string", "description": description } }
    })
}

fn text_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "required": ["text"],
        "properties": { "text": { "type": "string", "description": description } }
    })
}

const ANALYTIC_SYSTEM: &str = "You are an analyst working inside an IDE project. \
Study the code with the available commands, never modify files, and finish with a \
report that answers the instruction.";

const CODER_SYSTEM: &str = "You are a senior developer working inside an IDE project. \
Read the relevant files, make the requested changes with small targeted edits \
(prefer replace_code_in_file over rewriting whole files), and finish with a short \
report of what you changed.";

const SUPERVISOR_SYSTEM: &str = "You coordinate agents working on an IDE project. \
Split the user's request into sub-tasks, delegate each one with call_agent \
(ANALYTIC for research, CODER for changes), keep the user informed with message, \
and call exit when the goal is achieved.";

const TAG_DSL: &str = "Answer with exactly one command per reply in this format:
<PLAN>short plan of the remaining work</PLAN>
<COMMAND>
    <OPCODE>READ_FILE</OPCODE>
    <ARG>path/to/file</ARG>
</COMMAND>
Arguments are positional: READ_FILE(path), RE_READ(path), LIST_IN_DIRECTORY(path), \
WRITE_FILE(path, content), REPLACE_CODE_IN_FILE(path, find, replace) or \
REPLACE_CODE_IN_FILE(path, patch), REPORT(text), CALL_AGENT(agent_name, instruction), \
MESSAGE(text), EXIT().";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_lists_follow_role_capabilities() {
        assert!(AgentRole::Coder.allows(&Opcode::WriteFile));
        assert!(!AgentRole::Analytic.allows(&Opcode::WriteFile));
        assert!(!AgentRole::Supervisor.allows(&Opcode::ReadFile));
        assert!(AgentRole::Analytic.allows(&Opcode::Exit));
        assert!(AgentRole::Coder.allows(&Opcode::Stop));
        assert!(!AgentRole::Coder.allows(&Opcode::CallAgent));
    }

    #[test]
    fn tools_mirror_allow_list() {
        let names: Vec<String> = AgentRole::Supervisor
            .tools()
            .into_iter()
            .map(|tool| tool.name)
            .collect();
        assert_eq!(names, vec!["call_agent", "message", "exit"]);

        let coder: Vec<String> = AgentRole::Coder.tools().into_iter().map(|tool| tool.name).collect();
        assert!(coder.contains(&"replace_code_in_file".to_string()));
        assert!(!coder.contains(&"exit".to_string()));
    }

    #[test]
    fn parse_accepts_any_case() {
        assert_eq!(AgentRole::parse("coder"), Some(AgentRole::Coder));
        assert_eq!(AgentRole::parse(" Analytic "), Some(AgentRole::Analytic));
        assert_eq!(AgentRole::parse("TESTER"), None);
        assert_eq!(Protocol::parse("TAGS"), Some(Protocol::Tags));
    }

    #[test]
    fn step_prompt_includes_open_file_and_transcript() {
        let manifest = Manifest {
            base_path: "/work/app".to_string(),
            description: "demo app".to_string(),
            entries: vec!["src/".to_string(), "Cargo.toml".to_string()],
            current_open_file: Some("src/main.rs".to_string()),
        };

        let prompt = AgentRole::Coder.step_prompt(&manifest, "add tests", "<COMMAND></COMMAND>");

        assert!(prompt.contains("demo app"));
        assert!(prompt.contains("- src/\n- Cargo.toml"));
        assert!(prompt.contains("Path of current open file in IDE: `src/main.rs`"));
        assert!(prompt.contains("<COMMANDS>\n<COMMAND></COMMAND>\n</COMMANDS>"));
    }
}
