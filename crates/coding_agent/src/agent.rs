//! The agent execution loop.
//!
//! One [`Agent`] drives one role through `prompt -> decode -> dedup ->
//! execute` steps until the model reports, exits, or a budget runs out. The
//! loop owns its conversation and execution history; nothing is shared with
//! other runs.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use agent_provider::{CancelSignal, ModelReply, QueryRequest, RunMessage, ToolCallRequest};
use run_journal::RunJournal;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::commands::{decode_commands, Command, CommandAction, Opcode};
use crate::error::{AgentError, DelegationError};
use crate::events::OutputEvent;
use crate::filter::FilterOutcome;
use crate::history::{ExecutedCommand, ExecutionHistory};
use crate::interpreter::{CommandInterpreter, CommandOutcome, WRITE_OK, WRONG_ARGUMENTS};
use crate::model::RetryingModel;
use crate::project::Manifest;
use crate::roles::{AgentRole, Protocol};
use crate::tag_protocol::strip_tags;

pub const DEFAULT_MAX_STEPS: usize = 25;
pub const DEFAULT_MARKDOWN_RETRIES: usize = 3;

/// Folded into the supervisor's history when a delegated run ends without a report.
pub const DELEGATION_FALLBACK: &str =
    "Agent failed to complete the task, rephrase the instruction and try again";

pub const CONTINUE_NUDGE: &str =
    "Continue the work by issuing a command. If the instruction is complete, report your work.";
pub const REPEAT_NUDGE: &str =
    "That command was already executed; its result is in the history. Write detailed report of your work based on the executed commands!";
pub const DUPLICATE_RESULT: &str = "ERROR: command already executed, see the previous result";

/// Why a run stopped before reaching its own terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Another run for the same session took over the worker slot.
    Preempted,
    /// The user asked to stop.
    UserStop,
}

/// Cooperative cancellation, polled at the top of every step.
pub trait RunControl {
    fn stop_reason(&self) -> Option<StopReason>;
}

/// Control that never stops a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unstoppable;

impl RunControl for Unstoppable {
    fn stop_reason(&self) -> Option<StopReason> {
        None
    }
}

impl RunControl for CancelSignal {
    fn stop_reason(&self) -> Option<StopReason> {
        self.load(Ordering::SeqCst).then_some(StopReason::UserStop)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Report(String),
    Exited,
    Failed(AgentError),
    Preempted,
    Stopped,
}

impl RunOutcome {
    fn interrupted(reason: StopReason) -> Self {
        match reason {
            StopReason::Preempted => Self::Preempted,
            StopReason::UserStop => Self::Stopped,
        }
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Preempted | Self::Stopped)
    }
}

/// Runs a named sub-agent on behalf of a supervising agent.
pub trait Delegator: Send + Sync {
    fn delegate(
        &self,
        agent_name: &str,
        instruction: &str,
        control: &dyn RunControl,
        emit: &mut dyn FnMut(OutputEvent),
    ) -> Result<RunOutcome, DelegationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub protocol: Protocol,
    pub max_steps: usize,
    pub markdown_retries: usize,
    /// Directory for per-run JSONL journals; `None` disables journaling.
    pub journal_dir: Option<PathBuf>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            protocol: Protocol::default(),
            max_steps: DEFAULT_MAX_STEPS,
            markdown_retries: DEFAULT_MARKDOWN_RETRIES,
            journal_dir: None,
        }
    }
}

impl AgentSettings {
    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_markdown_retries(mut self, markdown_retries: usize) -> Self {
        self.markdown_retries = markdown_retries;
        self
    }

    #[must_use]
    pub fn with_journal_dir(mut self, journal_dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(journal_dir.into());
        self
    }
}

pub struct Agent {
    role: AgentRole,
    model: RetryingModel,
    interpreter: Arc<CommandInterpreter>,
    settings: AgentSettings,
    delegator: Option<Arc<dyn Delegator>>,
}

impl Agent {
    #[must_use]
    pub fn new(
        role: AgentRole,
        model: RetryingModel,
        interpreter: Arc<CommandInterpreter>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            role,
            model,
            interpreter,
            settings,
            delegator: None,
        }
    }

    #[must_use]
    pub fn with_delegator(mut self, delegator: Arc<dyn Delegator>) -> Self {
        self.delegator = Some(delegator);
        self
    }

    #[must_use]
    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Runs `instruction` to completion.
    ///
    /// Emits `start`, progress, and exactly one terminal `report` or `error`
    /// event, unless the run is interrupted, in which case it returns without
    /// emitting anything further. The closing `end` event is the caller's.
    pub fn run(
        &self,
        instruction: &str,
        control: &dyn RunControl,
        emit: &mut dyn FnMut(OutputEvent),
    ) -> RunOutcome {
        let role = self.role.as_str();
        info!(role, "agent run started");
        emit(OutputEvent::info(role, format!("start {role}...")));

        let manifest = match Manifest::load(self.interpreter.project().as_ref()) {
            Ok(manifest) => manifest,
            Err(error) => return self.fail(AgentError::from(error), emit),
        };

        let mut run = RunState::new(self, instruction, &manifest);

        loop {
            if let Some(reason) = control.stop_reason() {
                info!(role, ?reason, "agent run interrupted");
                return RunOutcome::interrupted(reason);
            }

            if run.steps >= self.settings.max_steps {
                warn!(role, steps = run.steps, "step budget exhausted");
                return self.fail(AgentError::StepBudgetExceeded, emit);
            }

            let turn = match self.settings.protocol {
                Protocol::Tags => self.tag_turn(&mut run, &manifest, instruction),
                Protocol::Tools => self.tool_turn(&mut run),
            };

            let step = match turn {
                Ok(Turn::Command(command, action)) => {
                    run.dedup_nudged = false;
                    self.dispatch(&mut run, command, action, control, emit)
                }
                Ok(Turn::Handled) => {
                    run.steps += 1;
                    Step::Continue
                }
                Ok(Turn::Repeated) => self.nudge_after_repeat(&mut run),
                Ok(Turn::Narration(text)) => self.nudge_after_narration(&mut run, text, emit),
                Ok(Turn::Empty) => Step::Finished(RunOutcome::Failed(AgentError::NoCommands)),
                Err(error) => Step::Finished(RunOutcome::Failed(error)),
            };

            match step {
                Step::Continue => {}
                Step::Finished(RunOutcome::Failed(error)) => return self.fail(error, emit),
                Step::Finished(outcome) => {
                    info!(role, steps = run.steps, "agent run finished");
                    return outcome;
                }
            }
        }
    }

    fn fail(&self, error: AgentError, emit: &mut dyn FnMut(OutputEvent)) -> RunOutcome {
        warn!(role = self.role.as_str(), %error, "agent run failed");
        emit(OutputEvent::error(self.role.as_str(), error.to_string()));
        RunOutcome::Failed(error)
    }

    /// One free-text turn: the whole context is re-rendered into a single prompt.
    fn tag_turn(
        &self,
        run: &mut RunState,
        manifest: &Manifest,
        instruction: &str,
    ) -> Result<Turn, AgentError> {
        let instruction = format!("{instruction}{}", run.prompt_appendix);
        let prompt = self
            .role
            .step_prompt(manifest, &instruction, &run.history.render_transcript());
        run.journal_prompt(&prompt);

        let request = QueryRequest::new(vec![
            RunMessage::system(self.role.system_prompt(Protocol::Tags)),
            RunMessage::user(prompt),
        ]);
        let reply = self.model.query(&request)?;
        run.journal_output(&reply.text);

        let commands = decode_commands(&reply.text);
        if commands.is_empty() {
            let narration = strip_tags(&strip_tags(&reply.text, "PLAN"), "COMMAND");
            let narration = narration.trim();
            return Ok(if narration.is_empty() {
                Turn::Empty
            } else {
                Turn::Narration(narration.to_string())
            });
        }

        let Some(command) = commands
            .into_iter()
            .find(|command| !run.history.is_duplicate(command))
        else {
            debug!(role = self.role.as_str(), "every decoded command was already executed");
            return Ok(Turn::Repeated);
        };

        let action = CommandAction::from_command(&command);
        Ok(Turn::Command(command, action.map_err(|error| error.to_string())))
    }

    /// One tool-calling turn: the conversation grows by the model's call and
    /// the result answering it.
    fn tool_turn(&self, run: &mut RunState) -> Result<Turn, AgentError> {
        let request =
            QueryRequest::new(run.conversation.clone()).with_tools(self.role.tools());
        if let Some(RunMessage::UserText { text }) = run.conversation.last().cloned() {
            run.journal_prompt(&text);
        }

        let ModelReply { text, tool_call } = self.model.query(&request)?;
        run.journal_output(&text);

        let Some(call) = tool_call else {
            let narration = text.trim().to_string();
            if narration.is_empty() {
                return Ok(Turn::Empty);
            }
            run.conversation.push(RunMessage::assistant(narration.clone()));
            return Ok(Turn::Narration(narration));
        };

        run.journal_output(&format!("{}({})", call.tool_name, call.arguments));
        run.conversation.push(call.to_message(text));
        if self.role.conversation_filter().filter(&mut run.conversation)
            == FilterOutcome::StepHandled
        {
            debug!(role = self.role.as_str(), tool = %call.tool_name, "filter answered tool call");
            return Ok(Turn::Handled);
        }

        match CommandAction::from_tool_call(&call.tool_name, &call.arguments) {
            Ok((command, action)) => {
                if run.history.is_duplicate(&command) {
                    run.conversation
                        .push(RunMessage::tool_result(&call, DUPLICATE_RESULT, true));
                    return Ok(Turn::Repeated);
                }
                run.pending_call = Some(call);
                Ok(Turn::Command(command, Ok(action)))
            }
            Err(error) => {
                let command = Command::new(
                    Opcode::parse(&call.tool_name),
                    vec![argument_text(&call.arguments)],
                );
                run.pending_call = Some(call);
                Ok(Turn::Command(command, Err(error.to_string())))
            }
        }
    }

    fn dispatch(
        &self,
        run: &mut RunState,
        command: Command,
        action: Result<CommandAction, String>,
        control: &dyn RunControl,
        emit: &mut dyn FnMut(OutputEvent),
    ) -> Step {
        let role = self.role.as_str();

        let action = match action {
            Ok(action) if self.role.allows(&command.opcode) => action,
            Ok(_) => {
                let result = format!(
                    "ERROR: command {} is not allowed for this agent",
                    command.opcode
                );
                run.record(command, CommandOutcome::error(result));
                return Step::Continue;
            }
            Err(reason) => {
                debug!(role, opcode = %command.opcode, %reason, "malformed command");
                run.record(command, CommandOutcome::error(WRONG_ARGUMENTS));
                return Step::Continue;
            }
        };

        if !matches!(
            command.opcode,
            Opcode::Report | Opcode::Exit | Opcode::Stop | Opcode::Message
        ) {
            let argument = command.arguments.first().map(String::as_str).unwrap_or("");
            info!(role, opcode = %command.opcode, argument, "executing command");
            emit(OutputEvent::info(
                role,
                format!("Execute command: {}; with argument: {argument}", command.opcode),
            ));
        }

        let outcome = match action {
            CommandAction::Report { text } => {
                run.journal_execute(&command, &text);
                emit(OutputEvent::report(role, text.clone()));
                return Step::Finished(RunOutcome::Report(text));
            }
            CommandAction::Exit | CommandAction::Stop => {
                run.journal_execute(&command, "");
                return Step::Finished(RunOutcome::Exited);
            }
            CommandAction::Message { text } => {
                emit(OutputEvent::markdown(role, text));
                CommandOutcome::ok(WRITE_OK)
            }
            CommandAction::CallAgent {
                agent_name,
                instruction,
            } => {
                let Some(delegator) = &self.delegator else {
                    run.record(
                        command,
                        CommandOutcome::error("ERROR: no agents available for delegation"),
                    );
                    return Step::Continue;
                };
                match delegator.delegate(&agent_name, &instruction, control, emit) {
                    Ok(RunOutcome::Report(report)) => CommandOutcome::ok(report),
                    Ok(RunOutcome::Preempted) => return Step::Finished(RunOutcome::Preempted),
                    Ok(RunOutcome::Stopped) => return Step::Finished(RunOutcome::Stopped),
                    Ok(RunOutcome::Exited | RunOutcome::Failed(_)) => {
                        CommandOutcome::error(DELEGATION_FALLBACK)
                    }
                    Err(error) => {
                        return Step::Finished(RunOutcome::Failed(AgentError::Delegation(error)))
                    }
                }
            }
            file_action => self.interpreter.execute(&file_action),
        };

        run.record(command, outcome);
        Step::Continue
    }

    fn nudge_after_repeat(&self, run: &mut RunState) -> Step {
        if run.dedup_nudged {
            return Step::Finished(RunOutcome::Failed(AgentError::NoCommands));
        }

        debug!(role = self.role.as_str(), "repeated command, nudging once");
        run.dedup_nudged = true;
        run.nudge(REPEAT_NUDGE);
        Step::Continue
    }

    fn nudge_after_narration(
        &self,
        run: &mut RunState,
        text: String,
        emit: &mut dyn FnMut(OutputEvent),
    ) -> Step {
        emit(OutputEvent::markdown(self.role.as_str(), text));

        if run.markdown_retries >= self.settings.markdown_retries {
            return Step::Finished(RunOutcome::Failed(AgentError::NoCommands));
        }

        run.markdown_retries += 1;
        run.nudge(CONTINUE_NUDGE);
        Step::Continue
    }
}

enum Turn {
    /// A fresh command; `Err` carries why its arguments were rejected.
    Command(Command, Result<CommandAction, String>),
    /// The conversation filter consumed the step.
    Handled,
    /// Only already-executed commands.
    Repeated,
    /// Text without any command.
    Narration(String),
    /// Neither text nor command.
    Empty,
}

enum Step {
    Continue,
    Finished(RunOutcome),
}

/// Mutable state of one run.
struct RunState {
    history: ExecutionHistory,
    conversation: Vec<RunMessage>,
    protocol: Protocol,
    steps: usize,
    markdown_retries: usize,
    dedup_nudged: bool,
    /// Appended to the instruction by nudges (tag protocol).
    prompt_appendix: String,
    /// Tool call awaiting its result (tool protocol).
    pending_call: Option<ToolCallRequest>,
    journal: Option<RunJournal>,
}

impl RunState {
    fn new(agent: &Agent, instruction: &str, manifest: &Manifest) -> Self {
        let protocol = agent.settings.protocol;
        let conversation = match protocol {
            Protocol::Tools => vec![
                RunMessage::system(agent.role.system_prompt(Protocol::Tools)),
                RunMessage::user(agent.role.step_prompt(manifest, instruction, "")),
            ],
            Protocol::Tags => Vec::new(),
        };

        let journal = agent.settings.journal_dir.as_ref().and_then(|dir| {
            RunJournal::create_new(dir, agent.role.as_str())
                .map_err(|error| warn!(%error, "run journal disabled"))
                .ok()
        });

        Self {
            history: ExecutionHistory::new(),
            conversation,
            protocol,
            steps: 0,
            markdown_retries: 0,
            dedup_nudged: false,
            prompt_appendix: String::new(),
            pending_call: None,
            journal,
        }
    }

    fn record(&mut self, command: Command, outcome: CommandOutcome) {
        self.journal_execute(&command, &outcome.result);
        if let Some(call) = self.pending_call.take() {
            self.conversation.push(RunMessage::tool_result(
                &call,
                outcome.result.clone(),
                !outcome.succeeded,
            ));
        }

        self.history.push(ExecutedCommand {
            command,
            result: outcome.result,
            succeeded: outcome.succeeded,
        });
        self.steps += 1;
    }

    fn nudge(&mut self, text: &str) {
        match self.protocol {
            Protocol::Tools => self.conversation.push(RunMessage::user(text)),
            Protocol::Tags => self.prompt_appendix = format!("\n{text}"),
        }
    }

    fn journal_prompt(&mut self, text: &str) {
        if let Some(journal) = &mut self.journal {
            if let Err(error) = journal.record_prompt(text) {
                warn!(%error, "failed to journal prompt");
            }
        }
    }

    fn journal_output(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(journal) = &mut self.journal {
            if let Err(error) = journal.record_model_output(text) {
                warn!(%error, "failed to journal model output");
            }
        }
    }

    fn journal_execute(&mut self, command: &Command, result: &str) {
        if let Some(journal) = &mut self.journal {
            if let Err(error) =
                journal.record_execute(command.opcode.as_str(), command.arguments.clone(), result)
            {
                warn!(%error, "failed to journal command");
            }
        }
    }
}

fn argument_text(arguments: &Value) -> String {
    match arguments {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
