//! HTTP front end for the coding copilot.
//!
//! Exposes three endpoints over one [`coding_agent::Copilot`]:
//! - `POST /send_message` claims a session and queues its instruction.
//! - `POST /control` posts `stop` to a session's run.
//! - `GET /events?session_id=..` streams the session's output events as
//!   server-sent events; a run closes with an `end` event and a `[DONE]`
//!   frame.
//!
//! Agent runs are blocking and execute on tokio's blocking pool, one per
//! connected stream. A [`coding_agent::runtime::ConcurrencyFault`] raised by
//! any stream is surfaced through [`Server::next_fault`] so the binary can
//! exit.

pub mod server;

pub use server::Server;
