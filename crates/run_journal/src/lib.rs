//! Append-only JSONL journal of one agent run.
//!
//! The first line of a journal is a `run` header; every following line is an
//! `entry` record holding either a rendered prompt, a raw model output or an
//! executed command with its result.

mod error;
mod paths;
mod schema;
mod store;

pub use error::JournalError;
pub use paths::{journal_file_name, sanitize_timestamp_for_filename};
pub use schema::{EntryRecordType, JournalEntry, JournalEntryKind, JournalHeader, RunRecordType};
pub use store::RunJournal;
