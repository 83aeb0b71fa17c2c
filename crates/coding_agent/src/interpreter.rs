//! Executes file commands against a project service.
//!
//! Every failure (bad arguments, missing files, patch mismatches, remote
//! errors) comes back as an `ERROR: ...` result string for the model to
//! react to. Nothing here panics or returns `Err`.

use std::sync::{Arc, OnceLock};

use patch_engine::{apply_patch, parse_search_replace, PatchRequest};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::commands::{CodeEdit, CommandAction};
use crate::project::{ProjectError, ProjectService};

pub const WRONG_ARGUMENTS: &str =
    "ERROR: wrong command code/arguments, check you output, fix accordance DSL and try again";
pub const FILE_NOT_EXISTS: &str = "ERROR: File not exists";
pub const PATH_NOT_EXISTS: &str = "ERROR: Path not exists";
pub const PATCH_TARGET_MISSING: &str = "ERROR: file not exist";
pub const CONTENT_NOT_TEXT: &str = "ERROR: file content must be string!";
pub const WRITE_OK: &str = "True";

/// Result of one interpreted command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub result: String,
    pub succeeded: bool,
    /// Only meaningful for reads: whether the target existed.
    pub exists: bool,
}

impl CommandOutcome {
    #[must_use]
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            succeeded: true,
            exists: true,
        }
    }

    #[must_use]
    pub fn error(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            succeeded: false,
            exists: true,
        }
    }

    #[must_use]
    pub fn missing(result: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            succeeded: false,
            exists: false,
        }
    }
}

pub struct CommandInterpreter {
    project: Arc<dyn ProjectService>,
}

impl CommandInterpreter {
    #[must_use]
    pub fn new(project: Arc<dyn ProjectService>) -> Self {
        Self { project }
    }

    #[must_use]
    pub fn project(&self) -> &Arc<dyn ProjectService> {
        &self.project
    }

    pub fn execute(&self, action: &CommandAction) -> CommandOutcome {
        match action {
            CommandAction::ReadFile { path } | CommandAction::ReRead { path } => self.read(path),
            CommandAction::ListInDirectory { path } => self.list(path),
            CommandAction::WriteFile { path, content } => self.write(path, content),
            CommandAction::ReplaceCodeInFile { path, edit } => self.replace(path, edit),
            CommandAction::Report { .. }
            | CommandAction::CallAgent { .. }
            | CommandAction::Message { .. }
            | CommandAction::Exit
            | CommandAction::Stop => CommandOutcome::error(WRONG_ARGUMENTS),
        }
    }

    fn read(&self, path: &str) -> CommandOutcome {
        match self.project.read_file(path) {
            Ok(content) => CommandOutcome::ok(content),
            Err(error) if error.is_not_found() => CommandOutcome::missing(FILE_NOT_EXISTS),
            Err(error) => CommandOutcome::missing(remote_error(&error)),
        }
    }

    fn list(&self, path: &str) -> CommandOutcome {
        match self.project.list_directory(path) {
            Ok(entries) => CommandOutcome::ok(
                entries
                    .iter()
                    .map(|entry| format!("- {}", entry.display_path()))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            Err(error) if error.is_not_found() => CommandOutcome::error(PATH_NOT_EXISTS),
            Err(error) => CommandOutcome::error(remote_error(&error)),
        }
    }

    fn write(&self, path: &str, content: &Value) -> CommandOutcome {
        let text = match content {
            Value::String(text) => text.clone(),
            Value::Object(_) | Value::Array(_) => match serde_json::to_string_pretty(content) {
                Ok(text) => text,
                Err(_) => return CommandOutcome::error(CONTENT_NOT_TEXT),
            },
            _ => return CommandOutcome::error(CONTENT_NOT_TEXT),
        };
        let text = strip_code_fence(&text);

        let written = match self.project.read_file(path) {
            Ok(_) => self.project.replace_file(path, &text),
            Err(error) if error.is_not_found() => {
                debug!(path, "creating file");
                self.project.create_file(path, &text)
            }
            Err(error) => return CommandOutcome::error(remote_error(&error)),
        };

        match written {
            Ok(()) => CommandOutcome::ok(WRITE_OK),
            Err(error) => CommandOutcome::error(remote_error(&error)),
        }
    }

    fn replace(&self, path: &str, edit: &CodeEdit) -> CommandOutcome {
        let source = self.read(path);
        if !source.exists {
            return CommandOutcome::error(PATCH_TARGET_MISSING);
        }

        let request = match edit {
            CodeEdit::FindReplace { find, replace } => PatchRequest::Literal {
                find: find.clone(),
                replace: replace.clone(),
            },
            CodeEdit::Patch(patch) => match parse_search_replace(patch) {
                Ok(blocks) => PatchRequest::Blocks(blocks),
                Err(error) => return CommandOutcome::error(format!("ERROR: {error}")),
            },
        };

        let buffer = source
            .result
            .split('\n')
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");

        let outcome = match apply_patch(&buffer, &request) {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(path, %error, "patch rejected");
                return CommandOutcome::error(format!("ERROR: {error}"));
            }
        };

        match self.project.replace_file(path, outcome.text.trim()) {
            Ok(()) => CommandOutcome::ok(WRITE_OK),
            Err(error) => CommandOutcome::error(remote_error(&error)),
        }
    }
}

fn remote_error(error: &ProjectError) -> String {
    format!("ERROR: {error}")
}

/// Trims `content` and removes a surrounding ```` ```lang ... ``` ```` fence.
#[must_use]
pub fn strip_code_fence(content: &str) -> String {
    static OPENING_FENCE: OnceLock<Regex> = OnceLock::new();
    let opening = OPENING_FENCE.get_or_init(|| {
        Regex::new(r"^```[a-z]+\s").unwrap_or_else(|error| unreachable!("fence pattern: {error}"))
    });

    let trimmed = content.trim();
    let without_opening = if opening.is_match(trimmed) {
        opening.replace(trimmed, "").into_owned()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.to_string()
    } else {
        trimmed.to_string()
    };

    without_opening
        .strip_suffix("```")
        .unwrap_or(&without_opening)
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::strip_code_fence;

    #[test]
    fn code_fence_with_language_is_removed() {
        assert_eq!(
            strip_code_fence("```json\n{\n    \"id\": 1\n}```"),
            "{\n    \"id\": 1\n}"
        );
        assert_eq!(strip_code_fence("  ```\nplain\n```  "), "plain");
        assert_eq!(strip_code_fence("no fence\n"), "no fence");
    }

    #[test]
    fn inner_backticks_are_kept() {
        assert_eq!(
            strip_code_fence("Use `cargo test` here"),
            "Use `cargo test` here"
        );
    }
}
