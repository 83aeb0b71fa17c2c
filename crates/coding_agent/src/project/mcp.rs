use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{DirEntry, Manifest, ProjectError, ProjectService};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Project service backed by an IDE's MCP-over-HTTP bridge.
///
/// Each operation is one `POST {host}/api/mcp/{tool}` with a JSON argument
/// object. The bridge answers `{"status": ...}` on success and
/// `{"error": "..."}` on failure.
#[derive(Debug, Clone)]
pub struct McpProject {
    host: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct ListedEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl McpProject {
    pub fn new(host: impl Into<String>) -> Result<Self, ProjectError> {
        Self::with_timeout(host, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(host: impl Into<String>, timeout: Duration) -> Result<Self, ProjectError> {
        let host = host.into().trim().trim_end_matches('/').to_string();
        if host.is_empty() {
            return Err(ProjectError::Transport("MCP host is empty".to_string()));
        }

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| ProjectError::Transport(error.to_string()))?;
        Ok(Self { host, http })
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn tool_url(&self, tool: &str) -> String {
        format!("{}/api/mcp/{tool}", self.host)
    }

    /// Calls one MCP tool and returns its `status` payload.
    pub fn call(&self, tool: &str, arguments: Value) -> Result<Value, ProjectError> {
        debug!(tool, "mcp call");
        let response = self
            .http
            .post(self.tool_url(tool))
            .json(&arguments)
            .send()
            .map_err(|error| ProjectError::Transport(error.to_string()))?;
        let body: Value = response
            .json()
            .map_err(|error| ProjectError::InvalidResponse(error.to_string()))?;

        if let Some(status) = body.get("status") {
            return Ok(status.clone());
        }

        match body.get("error") {
            Some(Value::String(message)) => Err(ProjectError::Remote(message.clone())),
            Some(other) => Err(ProjectError::Remote(other.to_string())),
            None => Err(ProjectError::InvalidResponse(body.to_string())),
        }
    }

    fn call_text(&self, tool: &str, arguments: Value) -> Result<String, ProjectError> {
        match self.call(tool, arguments)? {
            Value::String(text) => Ok(text),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

impl ProjectService for McpProject {
    fn read_file(&self, path: &str) -> Result<String, ProjectError> {
        self.call_text("get_file_text_by_path", json!({ "pathInProject": path }))
    }

    fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>, ProjectError> {
        let listed = match self.call("list_files_in_folder", json!({ "pathInProject": path }))? {
            Value::String(text) => serde_json::from_str::<Vec<ListedEntry>>(&text),
            other => serde_json::from_value::<Vec<ListedEntry>>(other),
        }
        .map_err(|error| ProjectError::InvalidResponse(format!("JSON decode: {error}")))?;

        Ok(listed
            .into_iter()
            .map(|entry| {
                let path = entry.path.replace('\\', "/").replace("//", "/");
                if entry.kind == "directory" {
                    DirEntry::directory(path)
                } else {
                    DirEntry::file(path)
                }
            })
            .collect())
    }

    fn create_file(&self, path: &str, text: &str) -> Result<(), ProjectError> {
        self.call(
            "create_new_file_with_text",
            json!({ "pathInProject": path, "text": text }),
        )
        .map(|_| ())
    }

    fn replace_file(&self, path: &str, text: &str) -> Result<(), ProjectError> {
        self.call(
            "replace_file_text_by_path",
            json!({ "pathInProject": path, "text": text }),
        )
        .map(|_| ())
    }

    fn open_file_path(&self) -> Result<Option<String>, ProjectError> {
        let path = self.call_text("get_open_in_editor_file_path", json!({}))?;
        let path = path.trim();
        Ok((!path.is_empty()).then(|| path.to_string()))
    }

    fn project_status(&self) -> Result<String, ProjectError> {
        Manifest::load(self).map(|manifest| manifest.base_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_url_joins_host_without_double_slash() {
        let project = McpProject::new("http://127.0.0.1:63342/").expect("client");
        assert_eq!(
            project.tool_url("get_file_text_by_path"),
            "http://127.0.0.1:63342/api/mcp/get_file_text_by_path"
        );
    }

    #[test]
    fn empty_host_is_rejected() {
        assert!(matches!(
            McpProject::new("  "),
            Err(ProjectError::Transport(_))
        ));
    }
}
