use std::fs;
use std::path::{Path, PathBuf};

use super::{DirEntry, Manifest, ProjectError, ProjectService};

/// Project service backed by a local directory.
///
/// Every path is resolved against the workspace root and rejected when its
/// canonical form escapes it.
#[derive(Debug, Clone)]
pub struct WorkspaceProject {
    root: PathBuf,
    open_file: Option<String>,
}

impl WorkspaceProject {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ProjectError> {
        let root = root.into();
        let canonical_root = root
            .canonicalize()
            .map_err(|source| ProjectError::io("resolving workspace root", &root, source))?;

        if !canonical_root.is_dir() {
            return Err(ProjectError::NotFound {
                path: canonical_root.display().to_string(),
            });
        }

        Ok(Self {
            root: canonical_root,
            open_file: None,
        })
    }

    /// Reports `path` as the file open in the editor.
    #[must_use]
    pub fn with_open_file(mut self, path: impl Into<String>) -> Self {
        self.open_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_existing_path(&self, path: &str) -> Result<PathBuf, ProjectError> {
        if path.trim().is_empty() {
            return Err(ProjectError::EmptyPath);
        }

        let candidate = self.absolute_candidate(path);
        let canonical = candidate.canonicalize().map_err(|_| ProjectError::NotFound {
            path: path.to_string(),
        })?;

        self.ensure_inside_workspace(&canonical)?;
        Ok(canonical)
    }

    fn resolve_write_path(&self, path: &str) -> Result<PathBuf, ProjectError> {
        if path.trim().is_empty() {
            return Err(ProjectError::EmptyPath);
        }

        let candidate = self.absolute_candidate(path);
        let parent = candidate.parent().ok_or_else(|| ProjectError::PathEscape {
            path: candidate.display().to_string(),
        })?;

        let anchor = canonicalize_existing_ancestor(parent)?;
        self.ensure_inside_workspace(&anchor)?;

        Ok(candidate)
    }

    fn absolute_candidate(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn ensure_inside_workspace(&self, canonical_path: &Path) -> Result<(), ProjectError> {
        if canonical_path.starts_with(&self.root) {
            Ok(())
        } else {
            Err(ProjectError::PathEscape {
                path: canonical_path.display().to_string(),
            })
        }
    }

    fn write_text(&self, path: &str, text: &str) -> Result<(), ProjectError> {
        let resolved = self.resolve_write_path(path)?;

        if let Some(parent) = resolved.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ProjectError::io("creating parent directories", parent, source))?;
            let canonical_parent = parent
                .canonicalize()
                .map_err(|source| ProjectError::io("resolving write parent", parent, source))?;
            self.ensure_inside_workspace(&canonical_parent)?;
        }

        fs::write(&resolved, text)
            .map_err(|source| ProjectError::io("writing file", &resolved, source))
    }

    fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .map(|relative| relative.display().to_string())
            .unwrap_or_else(|_| path.display().to_string())
            .replace('\\', "/")
    }
}

impl ProjectService for WorkspaceProject {
    fn read_file(&self, path: &str) -> Result<String, ProjectError> {
        let resolved = self.resolve_existing_path(path)?;
        if !resolved.is_file() {
            return Err(ProjectError::NotFound {
                path: path.to_string(),
            });
        }

        fs::read_to_string(&resolved)
            .map_err(|source| ProjectError::io("reading file", &resolved, source))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, ProjectError> {
        let resolved = self.resolve_existing_path(path)?;
        if !resolved.is_dir() {
            return Err(ProjectError::NotFound {
                path: path.to_string(),
            });
        }

        let reader = fs::read_dir(&resolved)
            .map_err(|source| ProjectError::io("listing directory", &resolved, source))?;

        let mut entries = Vec::new();
        for entry in reader {
            let entry =
                entry.map_err(|source| ProjectError::io("listing directory", &resolved, source))?;
            let entry_path = entry.path();
            let display = self.relative_display(&entry_path);
            if entry_path.is_dir() {
                entries.push(DirEntry::directory(display));
            } else {
                entries.push(DirEntry::file(display));
            }
        }

        entries.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(entries)
    }

    fn create_file(&self, path: &str, text: &str) -> Result<(), ProjectError> {
        self.write_text(path, text)
    }

    fn replace_file(&self, path: &str, text: &str) -> Result<(), ProjectError> {
        let resolved = self.resolve_existing_path(path)?;
        if !resolved.is_file() {
            return Err(ProjectError::NotFound {
                path: path.to_string(),
            });
        }

        fs::write(&resolved, text)
            .map_err(|source| ProjectError::io("writing file", &resolved, source))
    }

    fn open_file_path(&self) -> Result<Option<String>, ProjectError> {
        Ok(self
            .open_file
            .as_ref()
            .map(|path| self.absolute_candidate(path).display().to_string()))
    }

    fn fallback_base_path(&self) -> Option<String> {
        Some(self.root.display().to_string())
    }

    fn project_status(&self) -> Result<String, ProjectError> {
        Manifest::load(self).map(|manifest| manifest.base_path)
    }
}

fn canonicalize_existing_ancestor(path: &Path) -> Result<PathBuf, ProjectError> {
    for ancestor in path.ancestors() {
        if ancestor.exists() {
            return ancestor
                .canonicalize()
                .map_err(|source| ProjectError::io("resolving path", ancestor, source));
        }
    }

    Err(ProjectError::NotFound {
        path: path.display().to_string(),
    })
}
