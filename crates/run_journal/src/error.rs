use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure reading, validating or appending a run journal. Line numbers are 1-based.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("{operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{path}:{line}: not a JSON journal record: {source}")]
    JsonLineParse {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: cannot encode journal record: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: journal is empty")]
    MissingHeader { path: PathBuf },

    #[error("{path}:{line}: first record is not a run header")]
    InvalidHeaderRecord { path: PathBuf, line: usize },

    #[error("{path}:{line}: a run header may only appear on the first line")]
    DuplicateHeader { path: PathBuf, line: usize },

    #[error("{path}:{line}: journal version {found} is not supported")]
    UnsupportedVersion {
        path: PathBuf,
        line: usize,
        found: u32,
    },

    #[error("{path}:{line}: entry seq {found} out of order, wanted {expected}")]
    OutOfOrderEntry {
        path: PathBuf,
        line: usize,
        expected: u64,
        found: u64,
    },

    #[error("{path}:{line}: '{field}' is not an RFC3339 timestamp: {value}")]
    InvalidTimestamp {
        path: PathBuf,
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("cannot format the current time: {0}")]
    Clock(#[source] time::error::Format),
}

impl JournalError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
