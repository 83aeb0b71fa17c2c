//! Per-client event streams.

use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::agent::{RunControl, RunOutcome, StopReason};
use crate::events::{OutputEvent, SYSTEM_ROLE};
use crate::roles::AgentRole;
use crate::runtime::{ConcurrencyFault, RunToken, SessionArbiter, SlotGuard};
use crate::supervisor::AgentFactory;

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Status message when the project cannot be identified.
pub const UNKNOWN_PROJECT: &str = "unknown project";
/// Warning emitted when the user stops a run.
pub const BREAK_MARKER: &str = "[BREAK]";

/// Shared service behind every stream: arbiter, agent factory and entry role.
pub struct Copilot {
    arbiter: Arc<SessionArbiter>,
    factory: AgentFactory,
    entry_role: AgentRole,
    heartbeat_interval: Duration,
    poll_interval: Duration,
}

impl Copilot {
    #[must_use]
    pub fn new(arbiter: Arc<SessionArbiter>, factory: AgentFactory, entry_role: AgentRole) -> Self {
        Self {
            arbiter,
            factory,
            entry_role,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_intervals(mut self, heartbeat_interval: Duration, poll_interval: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn arbiter(&self) -> &Arc<SessionArbiter> {
        &self.arbiter
    }

    #[must_use]
    pub fn entry_role(&self) -> AgentRole {
        self.entry_role
    }

    /// `status` event naming the project base path.
    #[must_use]
    pub fn project_status(&self) -> OutputEvent {
        match self.factory.interpreter().project().project_status() {
            Ok(base_path) => OutputEvent::status(base_path),
            Err(error) => {
                info!(%error, "project status unavailable");
                OutputEvent::status(UNKNOWN_PROJECT)
            }
        }
    }

    /// Runs `instruction` with the entry role while holding `slot`.
    ///
    /// Closes the run with `end` unless it was preempted or the client went
    /// away. Returns false once `emit` reports the client gone.
    pub fn run_task(
        &self,
        slot: &SlotGuard,
        instruction: &str,
        emit: &mut dyn FnMut(OutputEvent) -> bool,
    ) -> bool {
        let control = TaskControl {
            slot,
            connected: Cell::new(true),
        };
        let agent = self.factory.agent(self.entry_role);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let mut forward = |event: OutputEvent| {
                if control.connected.get() && !emit(event) {
                    control.connected.set(false);
                }
            };
            agent.run(instruction, &control, &mut forward)
        }));

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(session_id = slot.session_id(), "agent run panicked");
                if !emit(OutputEvent::error(SYSTEM_ROLE, "Agent run panicked")) {
                    return false;
                }
                return emit(OutputEvent::end());
            }
        };

        if !control.connected.get() {
            return false;
        }

        match outcome {
            RunOutcome::Preempted => true,
            RunOutcome::Stopped => {
                emit(OutputEvent::warning(SYSTEM_ROLE, BREAK_MARKER)) && emit(OutputEvent::end())
            }
            RunOutcome::Report(_) | RunOutcome::Exited | RunOutcome::Failed(_) => {
                emit(OutputEvent::end())
            }
        }
    }

    #[must_use]
    pub fn stream(self: &Arc<Self>, session_id: impl Into<String>) -> SessionStream {
        SessionStream {
            copilot: Arc::clone(self),
            session_id: session_id.into().trim().to_string(),
            token: self.arbiter.next_token(),
        }
    }
}

/// Slot control plus client liveness; a vanished client ends the run silently.
struct TaskControl<'a> {
    slot: &'a SlotGuard,
    connected: Cell<bool>,
}

impl RunControl for TaskControl<'_> {
    fn stop_reason(&self) -> Option<StopReason> {
        if !self.connected.get() {
            return Some(StopReason::Preempted);
        }
        self.slot.stop_reason()
    }
}

/// One connected client: heartbeats while idle, runs the session's message
/// when one arrives.
pub struct SessionStream {
    copilot: Arc<Copilot>,
    session_id: String,
    token: RunToken,
}

impl SessionStream {
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    #[must_use]
    pub fn token(&self) -> RunToken {
        self.token
    }

    /// Drives the stream until the client disconnects (`emit` returns false)
    /// or the session is taken over by a newer stream.
    pub fn run(&self, emit: &mut dyn FnMut(OutputEvent) -> bool) -> Result<(), ConcurrencyFault> {
        let copilot = &self.copilot;
        let arbiter = copilot.arbiter();

        if !self.heartbeat(emit) {
            return Ok(());
        }
        let mut last_heartbeat = Instant::now();

        loop {
            if let Some(message) = arbiter.claim_message(&self.session_id, self.token) {
                info!(session_id = %self.session_id, token = self.token, "session run starting");
                let slot = match arbiter.acquire_slot(&self.session_id, self.token) {
                    Ok(slot) => slot,
                    Err(fault) => {
                        error!(%fault, "worker slot unavailable");
                        arbiter.destroy(&self.session_id);
                        emit(OutputEvent::error(SYSTEM_ROLE, fault.to_string()));
                        return Err(fault);
                    }
                };

                let connected = copilot.run_task(&slot, &message, emit);
                let preempted = slot.preempted();
                drop(slot);

                let still_owner = arbiter.finish_claim(&self.session_id, self.token);
                if !connected || preempted || !still_owner {
                    info!(session_id = %self.session_id, token = self.token, "stream closed");
                    return Ok(());
                }
                last_heartbeat = Instant::now();
                continue;
            }

            if last_heartbeat.elapsed() >= copilot.heartbeat_interval {
                if !self.heartbeat(emit) {
                    return Ok(());
                }
                last_heartbeat = Instant::now();
            }

            thread::sleep(copilot.poll_interval);
        }
    }

    fn heartbeat(&self, emit: &mut dyn FnMut(OutputEvent) -> bool) -> bool {
        emit(OutputEvent::heartbeat()) && emit(self.copilot.project_status())
    }
}
