#![allow(dead_code)]

use std::fs;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use agent_provider::{ModelProvider, ModelReply};
use coding_agent::agent::AgentSettings;
use coding_agent::events::{EventKind, OutputEvent};
use coding_agent::interpreter::CommandInterpreter;
use coding_agent::model::RetryingModel;
use coding_agent::project::WorkspaceProject;
use coding_agent::supervisor::AgentFactory;
use serde_json::Value;
use tempfile::TempDir;

/// Temporary project directory seeded with `files` (relative path, content).
pub fn workspace(files: &[(&str, &str)]) -> (TempDir, Arc<WorkspaceProject>) {
    let dir = tempfile::tempdir().expect("tempdir");
    for (path, content) in files {
        let target = dir.path().join(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(target, content).expect("seed file");
    }

    let project = WorkspaceProject::new(dir.path()).expect("workspace project");
    (dir, Arc::new(project))
}

pub fn factory(
    provider: Arc<dyn ModelProvider>,
    project: Arc<WorkspaceProject>,
    settings: AgentSettings,
) -> AgentFactory {
    let model = RetryingModel::new(provider).with_retry(3, Duration::ZERO);
    AgentFactory::new(model, Arc::new(CommandInterpreter::new(project)), settings)
}

pub fn read_file(dir: &TempDir, path: &str) -> String {
    fs::read_to_string(dir.path().join(path)).expect("read workspace file")
}

/// Tag-protocol reply carrying one command.
pub fn tag_reply(opcode: &str, args: &[&str]) -> ModelReply {
    let args: String = args
        .iter()
        .map(|arg| format!("<ARG>{arg}</ARG>"))
        .collect();
    ModelReply::text(format!(
        "<COMMAND><PLAN>step</PLAN><OPCODE>{opcode}</OPCODE>{args}</COMMAND>"
    ))
}

pub fn call(id: &str, tool: &str, arguments: Value) -> ModelReply {
    ModelReply::tool_call(id, tool, arguments)
}

/// Event sink shared with a run.
#[derive(Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<OutputEvent>>>,
}

impl EventLog {
    pub fn push(&self, event: OutputEvent) {
        lock_unpoisoned(&self.events).push(event);
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        lock_unpoisoned(&self.events).clone()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        self.events().iter().map(|event| event.kind).collect()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<OutputEvent> {
        self.events()
            .into_iter()
            .filter(|event| event.kind == kind)
            .collect()
    }

    pub fn messages(&self, kind: EventKind) -> Vec<String> {
        self.of_kind(kind)
            .into_iter()
            .map(|event| event.message)
            .collect()
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
