//! Process-wide session arbitration.
//!
//! [`SessionArbiter`] tracks client sessions and owns the single worker slot:
//! at most one agent run executes at a time. A stream that cannot get the slot
//! within `first_wait` posts a kill signal for the current holder, which the
//! holder observes at the top of its next step; failing to get the slot within
//! `second_wait` after that is a [`ConcurrencyFault`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::agent::{RunControl, StopReason};

pub const DEFAULT_FIRST_WAIT: Duration = Duration::from_secs(1);
pub const DEFAULT_SECOND_WAIT: Duration = Duration::from_secs(10);

/// Identity of one connected stream and of the run it owns.
pub type RunToken = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
}

/// Rejected session request; messages are shown to HTTP clients verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("Empty message")]
    EmptyMessage,

    #[error("empty session")]
    EmptySessionId,

    #[error("Session is locked")]
    Locked,

    #[error("unknown session")]
    UnknownSession,

    #[error("invalid command")]
    InvalidCommand,
}

/// The worker slot could not be reacquired after preempting its holder.
///
/// Two runs would otherwise race on the same project files, so the server
/// treats this as fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("worker slot still held after preempting it for session '{session_id}' (waited {waited:?})")]
pub struct ConcurrencyFault {
    pub session_id: String,
    pub waited: Duration,
}

/// Commands accepted by the control surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    Stop,
}

impl ControlCommand {
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        match raw.trim() {
            "stop" => Ok(Self::Stop),
            _ => Err(SessionError::InvalidCommand),
        }
    }
}

#[derive(Debug)]
struct Session {
    state: SessionState,
    message: String,
    /// Stream currently running this session's message.
    claimant: Option<RunToken>,
    stop_requested: bool,
}

#[derive(Debug, Clone)]
struct SlotHolder {
    token: RunToken,
    session_id: String,
}

#[derive(Debug, Clone)]
struct KillSignal {
    token: RunToken,
}

#[derive(Debug)]
pub struct SessionArbiter {
    sessions: Mutex<HashMap<String, Session>>,
    slot: Mutex<Option<SlotHolder>>,
    slot_released: Condvar,
    kill_queue: Mutex<VecDeque<KillSignal>>,
    next_token: AtomicU64,
    first_wait: Duration,
    second_wait: Duration,
}

impl Default for SessionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionArbiter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            slot: Mutex::new(None),
            slot_released: Condvar::new(),
            kill_queue: Mutex::new(VecDeque::new()),
            next_token: AtomicU64::new(1),
            first_wait: DEFAULT_FIRST_WAIT,
            second_wait: DEFAULT_SECOND_WAIT,
        }
    }

    #[must_use]
    pub fn with_waits(mut self, first_wait: Duration, second_wait: Duration) -> Self {
        self.first_wait = first_wait;
        self.second_wait = second_wait;
        self
    }

    pub fn next_token(&self) -> RunToken {
        self.next_token.fetch_add(1, Ordering::SeqCst)
    }

    /// Creates the session; fails when it already exists.
    pub fn acquire_session(&self, session_id: &str) -> Result<(), SessionError> {
        let session_id = non_empty_session_id(session_id)?;
        let mut sessions = self.lock_sessions();
        if sessions.contains_key(session_id) {
            return Err(SessionError::Locked);
        }

        sessions.insert(
            session_id.to_string(),
            Session {
                state: SessionState::Idle,
                message: String::new(),
                claimant: None,
                stop_requested: false,
            },
        );
        Ok(())
    }

    /// Queues `message` for an acquired session.
    pub fn send_message(&self, session_id: &str, message: &str) -> Result<(), SessionError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        let mut sessions = self.lock_sessions();
        let session = sessions
            .get_mut(session_id.trim())
            .ok_or(SessionError::UnknownSession)?;
        session.message = message.to_string();
        Ok(())
    }

    /// `acquire_session` followed by `send_message`: the `/send_message` contract.
    pub fn submit(&self, session_id: &str, message: &str) -> Result<(), SessionError> {
        if message.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }
        self.acquire_session(session_id)?;
        self.send_message(session_id, message)
    }

    /// Asks the session's run to stop; unknown sessions are ignored.
    pub fn post_stop(&self, session_id: &str) -> Result<(), SessionError> {
        let session_id = non_empty_session_id(session_id)?;
        if let Some(session) = self.lock_sessions().get_mut(session_id) {
            session.stop_requested = true;
            info!(session_id, "stop requested");
        }
        Ok(())
    }

    #[must_use]
    pub fn stop_requested(&self, session_id: &str) -> bool {
        self.lock_sessions()
            .get(session_id)
            .is_some_and(|session| session.stop_requested)
    }

    #[must_use]
    pub fn session_state(&self, session_id: &str) -> Option<SessionState> {
        self.lock_sessions().get(session_id).map(|session| session.state)
    }

    /// Hands the pending message to stream `token` and marks the session running.
    ///
    /// A message already claimed by another stream is handed out again: the
    /// newer stream takes the session over.
    pub fn claim_message(&self, session_id: &str, token: RunToken) -> Option<String> {
        let mut sessions = self.lock_sessions();
        let session = sessions.get_mut(session_id)?;
        if session.message.is_empty() || session.claimant == Some(token) {
            return None;
        }

        if let Some(previous) = session.claimant {
            warn!(session_id, previous, token, "session taken over by a newer stream");
        }
        session.claimant = Some(token);
        session.state = SessionState::Running;
        Some(session.message.clone())
    }

    /// Ends `token`'s claim. The session is destroyed when `token` still owned
    /// it; returns false when another stream has taken over.
    pub fn finish_claim(&self, session_id: &str, token: RunToken) -> bool {
        let mut sessions = self.lock_sessions();
        let owned = match sessions.get(session_id) {
            Some(session) => session.claimant == Some(token),
            None => return true,
        };

        if owned {
            sessions.remove(session_id);
            debug!(session_id, "session destroyed");
        }
        owned
    }

    pub fn destroy(&self, session_id: &str) {
        if self.lock_sessions().remove(session_id).is_some() {
            debug!(session_id, "session destroyed");
        }
    }

    /// Takes the worker slot for `token`, preempting the current holder if
    /// the first wait times out.
    pub fn acquire_slot(
        self: &Arc<Self>,
        session_id: &str,
        token: RunToken,
    ) -> Result<SlotGuard, ConcurrencyFault> {
        if self.try_take_slot(session_id, token, self.first_wait) {
            return Ok(self.guard(session_id, token));
        }

        if let Some(holder) = lock_unpoisoned(&self.slot).clone() {
            warn!(
                session_id,
                holder_session = %holder.session_id,
                holder = holder.token,
                "worker slot busy, preempting holder"
            );
            lock_unpoisoned(&self.kill_queue).push_back(KillSignal {
                token: holder.token,
            });
        }

        if self.try_take_slot(session_id, token, self.second_wait) {
            return Ok(self.guard(session_id, token));
        }

        Err(ConcurrencyFault {
            session_id: session_id.to_string(),
            waited: self.first_wait + self.second_wait,
        })
    }

    /// True while some run holds the worker slot.
    #[must_use]
    pub fn slot_busy(&self) -> bool {
        lock_unpoisoned(&self.slot).is_some()
    }

    fn try_take_slot(&self, session_id: &str, token: RunToken, wait: Duration) -> bool {
        let slot = lock_unpoisoned(&self.slot);
        let (mut slot, _) = self
            .slot_released
            .wait_timeout_while(slot, wait, |holder| holder.is_some())
            .unwrap_or_else(PoisonError::into_inner);

        if slot.is_some() {
            return false;
        }

        *slot = Some(SlotHolder {
            token,
            session_id: session_id.to_string(),
        });
        info!(session_id, token, "worker slot acquired");
        true
    }

    fn guard(self: &Arc<Self>, session_id: &str, token: RunToken) -> SlotGuard {
        SlotGuard {
            arbiter: Arc::clone(self),
            token,
            session_id: session_id.to_string(),
            killed: AtomicBool::new(false),
        }
    }

    fn take_kill_signal(&self, token: RunToken) -> bool {
        let mut queue = lock_unpoisoned(&self.kill_queue);
        let before = queue.len();
        queue.retain(|signal| signal.token != token);
        before != queue.len()
    }

    fn release_slot(&self, token: RunToken) {
        let mut slot = lock_unpoisoned(&self.slot);
        if slot.as_ref().is_some_and(|holder| holder.token == token) {
            *slot = None;
            self.slot_released.notify_all();
            debug!(token, "worker slot released");
        }
        drop(slot);
        self.take_kill_signal(token);
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        lock_unpoisoned(&self.sessions)
    }
}

/// Ownership of the worker slot; released on drop.
#[derive(Debug)]
pub struct SlotGuard {
    arbiter: Arc<SessionArbiter>,
    token: RunToken,
    session_id: String,
    killed: AtomicBool,
}

impl SlotGuard {
    #[must_use]
    pub fn token(&self) -> RunToken {
        self.token
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Polls the kill queue; once a kill signal is seen it stays seen.
    #[must_use]
    pub fn preempted(&self) -> bool {
        if self.killed.load(Ordering::SeqCst) {
            return true;
        }

        let killed = self.arbiter.take_kill_signal(self.token);
        if killed {
            warn!(session_id = %self.session_id, token = self.token, "run preempted");
            self.killed.store(true, Ordering::SeqCst);
        }
        killed
    }
}

impl RunControl for SlotGuard {
    fn stop_reason(&self) -> Option<StopReason> {
        if self.preempted() {
            Some(StopReason::Preempted)
        } else if self.arbiter.stop_requested(&self.session_id) {
            Some(StopReason::UserStop)
        } else {
            None
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.arbiter.release_slot(self.token);
    }
}

fn non_empty_session_id(session_id: &str) -> Result<&str, SessionError> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        Err(SessionError::EmptySessionId)
    } else {
        Ok(session_id)
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
    use std::thread;

    use super::*;

    fn arbiter(first_wait: Duration, second_wait: Duration) -> Arc<SessionArbiter> {
        Arc::new(SessionArbiter::new().with_waits(first_wait, second_wait))
    }

    #[test]
    fn second_submit_for_the_same_session_is_locked() {
        let arbiter = SessionArbiter::new();

        arbiter.submit("s1", "hello").expect("first submit");

        assert_eq!(arbiter.submit("s1", "again"), Err(SessionError::Locked));
        assert_eq!(arbiter.submit("s2", "  "), Err(SessionError::EmptyMessage));
        assert_eq!(arbiter.submit(" ", "hi"), Err(SessionError::EmptySessionId));
        assert_eq!(arbiter.session_state("s1"), Some(SessionState::Idle));
    }

    #[test]
    fn claim_marks_running_and_finish_destroys() {
        let arbiter = SessionArbiter::new();
        arbiter.submit("s1", "do it").expect("submit");

        assert_eq!(arbiter.claim_message("s1", 7).as_deref(), Some("do it"));
        assert_eq!(arbiter.claim_message("s1", 7), None);
        assert_eq!(arbiter.session_state("s1"), Some(SessionState::Running));

        assert!(arbiter.finish_claim("s1", 7));
        assert_eq!(arbiter.session_state("s1"), None);
    }

    #[test]
    fn newer_stream_takes_over_a_claimed_session() {
        let arbiter = SessionArbiter::new();
        arbiter.submit("s1", "do it").expect("submit");

        assert!(arbiter.claim_message("s1", 1).is_some());
        assert!(arbiter.claim_message("s1", 2).is_some());

        assert!(!arbiter.finish_claim("s1", 1));
        assert_eq!(arbiter.session_state("s1"), Some(SessionState::Running));
        assert!(arbiter.finish_claim("s1", 2));
    }

    #[test]
    fn stop_on_unknown_session_is_ignored() {
        let arbiter = SessionArbiter::new();

        arbiter.post_stop("missing").expect("no-op");
        assert_eq!(arbiter.session_state("missing"), None);
        assert_eq!(arbiter.post_stop(""), Err(SessionError::EmptySessionId));
        assert_eq!(ControlCommand::parse("pause"), Err(SessionError::InvalidCommand));
    }

    #[test]
    fn busy_slot_holder_receives_kill_signal_and_release_lets_waiter_in() {
        let arbiter = arbiter(Duration::from_millis(20), Duration::from_secs(5));
        let holder = arbiter.acquire_slot("s1", 1).expect("free slot");

        let waiter = {
            let arbiter = Arc::clone(&arbiter);
            thread::spawn(move || arbiter.acquire_slot("s1", 2).map(|guard| guard.token()))
        };

        while !holder.preempted() {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(holder.stop_reason(), Some(StopReason::Preempted));
        drop(holder);

        assert_eq!(waiter.join().expect("waiter thread"), Ok(2));
        assert!(!arbiter.slot_busy());
    }

    #[test]
    fn holder_that_ignores_kill_signal_is_a_concurrency_fault() {
        let arbiter = arbiter(Duration::from_millis(10), Duration::from_millis(30));
        let _holder = arbiter.acquire_slot("s1", 1).expect("free slot");

        let fault = arbiter.acquire_slot("s1", 2).expect_err("slot never released");

        assert_eq!(fault.session_id, "s1");
        assert_eq!(fault.waited, Duration::from_millis(40));
    }

    #[test]
    fn user_stop_is_reported_through_slot_guard() {
        let arbiter = arbiter(Duration::from_millis(10), Duration::from_millis(10));
        arbiter.submit("s1", "work").expect("submit");
        let guard = arbiter.acquire_slot("s1", 1).expect("slot");

        assert_eq!(guard.stop_reason(), None);
        arbiter.post_stop("s1").expect("stop");
        assert_eq!(guard.stop_reason(), Some(StopReason::UserStop));
    }
}
