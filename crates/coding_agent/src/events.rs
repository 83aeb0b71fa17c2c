//! Output events streamed to connected clients.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Role attributed to system-originated events (heartbeats, status, `end`).
pub const SYSTEM_ROLE: &str = "system";

/// SSE terminator sent after the `end` event.
pub const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Info,
    Markdown,
    Error,
    Report,
    Status,
    Heartbeat,
    Warning,
    End,
}

/// One streamed unit: `{role, message, type, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub role: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
}

impl OutputEvent {
    #[must_use]
    pub fn new(role: impl Into<String>, kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            message: message.into(),
            kind,
            timestamp: now_seconds(),
        }
    }

    #[must_use]
    pub fn info(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(role, EventKind::Info, message)
    }

    #[must_use]
    pub fn markdown(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(role, EventKind::Markdown, message)
    }

    #[must_use]
    pub fn error(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(role, EventKind::Error, message)
    }

    #[must_use]
    pub fn report(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(role, EventKind::Report, message)
    }

    #[must_use]
    pub fn warning(role: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(role, EventKind::Warning, message)
    }

    #[must_use]
    pub fn status(message: impl Into<String>) -> Self {
        Self::new(SYSTEM_ROLE, EventKind::Status, message)
    }

    #[must_use]
    pub fn heartbeat() -> Self {
        Self::new(SYSTEM_ROLE, EventKind::Heartbeat, "")
    }

    #[must_use]
    pub fn end() -> Self {
        Self::new(SYSTEM_ROLE, EventKind::End, "")
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        self.kind == EventKind::End
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"role":"{SYSTEM_ROLE}","message":"","type":"error","timestamp":{}}}"#,
                self.timestamp
            )
        })
    }

    /// SSE `data:` payloads for this event; `end` is followed by [`DONE_MARKER`].
    #[must_use]
    pub fn sse_payloads(&self) -> Vec<String> {
        let mut payloads = vec![self.to_json()];
        if self.is_end() {
            payloads.push(DONE_MARKER.to_string());
        }
        payloads
    }
}

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
