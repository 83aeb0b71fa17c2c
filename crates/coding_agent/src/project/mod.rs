//! Project services: where commands read and write files.
//!
//! [`WorkspaceProject`] works on a local directory; [`McpProject`] talks to
//! an IDE over its MCP-over-HTTP bridge. Both report failures as
//! [`ProjectError`] values, never panics.

use std::path::PathBuf;

use thiserror::Error;

mod manifest;
mod mcp;
mod workspace;

pub use manifest::{Manifest, MANIFEST_PATH};
pub use mcp::McpProject;
pub use workspace::WorkspaceProject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry of a directory listing; `path` uses `/` separators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub path: String,
    pub kind: EntryKind,
}

impl DirEntry {
    #[must_use]
    pub fn file(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
        }
    }

    #[must_use]
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
        }
    }

    /// Path as shown to the model: directories end in `/`.
    #[must_use]
    pub fn display_path(&self) -> String {
        let path = self.path.replace('\\', "/");
        match self.kind {
            EntryKind::Directory if !path.ends_with('/') => format!("{path}/"),
            _ => path,
        }
    }
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("{path} not found")]
    NotFound { path: String },

    #[error("Path escapes workspace root: {path}")]
    PathEscape { path: String },

    #[error("Path must not be empty")]
    EmptyPath,

    /// Error reported by the remote service itself.
    #[error("{0}")]
    Remote(String),

    #[error("project service request failed: {0}")]
    Transport(String),

    #[error("unexpected project service response: {0}")]
    InvalidResponse(String),

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProjectError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// True when the path simply does not exist (as opposed to a failed call).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Remote(_))
    }
}

/// Remote project collaborator used by the command interpreter.
pub trait ProjectService: Send + Sync {
    fn read_file(&self, path: &str) -> Result<String, ProjectError>;

    /// Lists one level of `path`.
    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, ProjectError>;

    fn create_file(&self, path: &str, text: &str) -> Result<(), ProjectError>;

    fn replace_file(&self, path: &str, text: &str) -> Result<(), ProjectError>;

    /// Absolute path of the file open in the editor, when the service knows one.
    fn open_file_path(&self) -> Result<Option<String>, ProjectError>;

    /// Base path used when the project has no manifest file.
    fn fallback_base_path(&self) -> Option<String> {
        None
    }

    /// Short project identification for status probes (the manifest base path).
    fn project_status(&self) -> Result<String, ProjectError>;
}
