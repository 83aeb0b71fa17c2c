use std::collections::HashSet;

use crate::commands::Command;

/// A command together with what executing it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    pub command: Command,
    pub result: String,
    pub succeeded: bool,
}

/// Append-only record of one run's executed commands.
#[derive(Debug, Default)]
pub struct ExecutionHistory {
    entries: Vec<ExecutedCommand>,
    keys: HashSet<String>,
}

impl ExecutionHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, executed: ExecutedCommand) {
        self.keys.insert(executed.command.dedup_key());
        self.entries.push(executed);
    }

    /// True when `command` was already executed and its opcode is not dedup-exempt.
    #[must_use]
    pub fn is_duplicate(&self, command: &Command) -> bool {
        !command.opcode.is_dedup_exempt() && self.keys.contains(&command.dedup_key())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[ExecutedCommand] {
        &self.entries
    }

    /// Renders the history in the same tag vocabulary the model writes, one
    /// `<COMMAND>` block per executed command with its `<RESULT>`.
    #[must_use]
    pub fn render_transcript(&self) -> String {
        self.entries
            .iter()
            .map(render_executed)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn render_executed(executed: &ExecutedCommand) -> String {
    let command = &executed.command;
    let mut out = String::from("<COMMAND>\n");

    if !command.plan.is_empty() {
        out.push_str("    <PLAN>");
        out.push_str(&command.plan.join("\n"));
        out.push_str("</PLAN>\n");
    }

    out.push_str(&format!("    <OPCODE>{}</OPCODE>\n", command.opcode));
    for argument in &command.arguments {
        out.push_str(&format!("    <ARG>{argument}</ARG>\n"));
    }
    out.push_str(&format!("    <RESULT>\n{}\n    </RESULT>\n", executed.result));
    out.push_str("</COMMAND>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::Opcode;

    fn executed(opcode: Opcode, path: &str) -> ExecutedCommand {
        ExecutedCommand {
            command: Command::new(opcode, vec![path.to_string()]),
            result: "content".to_string(),
            succeeded: true,
        }
    }

    #[test]
    fn duplicates_are_detected_except_for_re_read() {
        let mut history = ExecutionHistory::new();
        history.push(executed(Opcode::ReadFile, "a.txt"));
        history.push(executed(Opcode::ReRead, "a.txt"));

        assert!(history.is_duplicate(&Command::new(Opcode::ReadFile, vec!["a.txt".to_string()])));
        assert!(!history.is_duplicate(&Command::new(Opcode::ReadFile, vec!["b.txt".to_string()])));
        assert!(!history.is_duplicate(&Command::new(Opcode::ReRead, vec!["a.txt".to_string()])));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn transcript_renders_commands_with_results() {
        let mut history = ExecutionHistory::new();
        let mut entry = executed(Opcode::ListInDirectory, ".");
        entry.command.plan = vec!["look around".to_string()];
        entry.result = "- src/".to_string();
        history.push(entry);

        assert_eq!(
            history.render_transcript(),
            "<COMMAND>\n    <PLAN>look around</PLAN>\n    <OPCODE>list_in_directory</OPCODE>\n    <ARG>.</ARG>\n    <RESULT>\n- src/\n    </RESULT>\n</COMMAND>"
        );
    }
}
