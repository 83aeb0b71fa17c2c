//! IDE copilot agent core.
//!
//! A run takes one natural-language instruction, asks the model for one
//! command per step, executes it against the open project and streams
//! [`events::OutputEvent`]s until a report, an exit, an error or the step
//! budget ends it.
//!
//! ## Provider bootstrap
//!
//! Select the model provider with `COPILOT_PROVIDER`:
//!
//! - `COPILOT_PROVIDER=mock` (default) for deterministic local runs
//! - `COPILOT_PROVIDER=chat-api` for an OpenAI-compatible chat completions API
//!
//! When `COPILOT_PROVIDER=chat-api`, set `COPILOT_CHAT_CONFIG_PATH` to a
//! readable UTF-8 JSON file with this shape:
//!
//! ```json
//! {
//!   "api_key": "sk-...",
//!   "model": "gpt-4o-mini",
//!   "base_url": "https://api.openai.com/v1",
//!   "timeout_sec": 120,
//!   "max_output_tokens": 4096
//! }
//! ```
//!
//! `api_key` and `model` are required. `timeout_sec` must be > 0 when
//! provided. Unknown JSON fields are rejected.
//!
//! ## Project access
//!
//! File commands run through a [`project::ProjectService`]: the IDE's MCP
//! HTTP bridge (`IDE_MCP_HOST`) or a local directory
//! (`COPILOT_WORKSPACE_ROOT`). See [`config`] for every variable.
//!
//! ## Protocols
//!
//! `COPILOT_PROTOCOL=tools` sends role tools through native tool calling and
//! keeps a growing conversation. `COPILOT_PROTOCOL=tags` rebuilds a single
//! prompt each step and decodes `<command>`/`<arg>` tags from plain text.

pub mod agent;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod history;
pub mod interpreter;
pub mod model;
pub mod project;
pub mod providers;
pub mod roles;
pub mod runtime;
pub mod stream;
pub mod supervisor;
pub mod tag_protocol;

pub use agent::{Agent, AgentSettings, RunControl, RunOutcome, StopReason, Unstoppable};
pub use config::AgentConfig;
pub use error::{AgentError, DelegationError, StartupError};
pub use events::{EventKind, OutputEvent};
pub use roles::{AgentRole, Protocol};
pub use runtime::{SessionArbiter, SessionError};
pub use stream::{Copilot, SessionStream};
pub use supervisor::AgentFactory;
