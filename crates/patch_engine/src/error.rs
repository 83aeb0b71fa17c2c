use std::path::PathBuf;

use thiserror::Error;

/// Reasons a patch request cannot be applied to a buffer.
///
/// Block indexes are zero-based; messages render them one-based because they
/// are fed back to the model verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("bad patch: {0}")]
    BadPatch(String),

    #[error("search fragment of block {} was not found in the file", .block + 1)]
    NotFound { block: usize },

    #[error(
        "search fragment of block {} matches {count} locations, make it unique by adding surrounding lines",
        .block + 1
    )]
    AmbiguousMatch { block: usize, count: usize },

    #[error("search fragment of block {} overlaps the lines matched by the previous block", .block + 1)]
    OverlappingBlocks { block: usize },
}

/// Failure while patching a file on disk through [`crate::apply_patch_to_file`].
#[derive(Debug, Error)]
pub enum PatchFileError {
    #[error("I/O error while {operation} {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Patch(#[from] PatchError),
}

impl PatchFileError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
