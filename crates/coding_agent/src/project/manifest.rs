use tracing::debug;

use super::{ProjectError, ProjectService};
use crate::tag_protocol::decode_tags;

/// Project manifest file, relative to the project root.
pub const MANIFEST_PATH: &str = "./.copilot_project.xml";

/// Project metadata read once at the start of a run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Manifest {
    pub base_path: String,
    pub description: String,
    /// Top-level entries; directories end in `/`.
    pub entries: Vec<String>,
    /// Open editor file, relative to `base_path` when it lies inside it.
    pub current_open_file: Option<String>,
}

impl Manifest {
    /// Reads `.copilot_project.xml` (`<path>`, `<description>`), the
    /// top-level listing and the open editor file.
    pub fn load(project: &dyn ProjectService) -> Result<Self, ProjectError> {
        let (base_path, description) = match project.read_file(MANIFEST_PATH) {
            Ok(text) => {
                let tags = decode_tags(&text, &["path", "description"]);
                let first = |name: &str| {
                    tags.get(name)
                        .and_then(|values| values.first())
                        .map(|value| value.trim().to_string())
                        .filter(|value| !value.is_empty())
                };
                let base_path = first("path").ok_or_else(|| {
                    ProjectError::InvalidResponse(format!("{MANIFEST_PATH} has no <path>"))
                })?;
                (base_path, first("description").unwrap_or_default())
            }
            Err(error) if error.is_not_found() => match project.fallback_base_path() {
                Some(base_path) => (base_path, String::new()),
                None => return Err(error),
            },
            Err(error) => return Err(error),
        };

        let entries = project
            .list_directory(".")?
            .iter()
            .map(|entry| entry.display_path())
            .collect();

        let current_open_file = project
            .open_file_path()?
            .map(|path| relative_to(&base_path, &path))
            .filter(|path| !path.is_empty());

        debug!(base_path = %base_path, "loaded project manifest");

        Ok(Self {
            base_path,
            description,
            entries,
            current_open_file,
        })
    }

    /// Top-level entries rendered as a `- entry` list.
    #[must_use]
    pub fn structure_listing(&self) -> String {
        self.entries
            .iter()
            .map(|entry| format!("- {entry}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// `path` relative to `root` (both normalized to `/`), or `path` unchanged
/// when it lies outside `root`.
fn relative_to(root: &str, path: &str) -> String {
    let root = root.replace('\\', "/");
    let root = root.trim_end_matches('/');
    let path = path.replace('\\', "/");

    match path.strip_prefix(root) {
        Some(rest) if root.is_empty() || rest.is_empty() || rest.starts_with('/') => {
            rest.trim_start_matches('/').to_string()
        }
        _ => path,
    }
}
