//! Environment configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `COPILOT_MAX_STEPS` (falls back to `MAX_ITERATION`) | 25 |
//! | `COPILOT_MARKDOWN_RETRIES` | 3 |
//! | `COPILOT_MODEL_RETRY_ATTEMPTS` | 5 |
//! | `COPILOT_MODEL_RETRY_DELAY_MS` | 1000 |
//! | `COPILOT_PROTOCOL` (`tools` or `tags`) | `tools` |
//! | `COPILOT_PROJECT` (`mcp` or `workspace`) | `mcp` when `IDE_MCP_HOST` is set |
//! | `IDE_MCP_HOST` | unset |
//! | `COPILOT_WORKSPACE_ROOT` | `.` |
//! | `COPILOT_JOURNAL_DIR` | unset (no journal) |
//! | `COPILOT_PROVIDER` (`mock` or `chat-api`) | `mock` |
//! | `COPILOT_CHAT_CONFIG_PATH` | required for `chat-api` |
//! | `COPILOT_ENTRY_ROLE` | `SUPERVISOR` |
//! | `HTTP_PORT` | 5000 |

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::agent::{AgentSettings, DEFAULT_MARKDOWN_RETRIES, DEFAULT_MAX_STEPS};
use crate::model::{DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::project::{McpProject, ProjectError, ProjectService, WorkspaceProject};
use crate::providers::{DEFAULT_PROVIDER_ID, PROVIDER_ENV_VAR};
use crate::roles::{AgentRole, Protocol};

pub const MAX_STEPS_ENV_VAR: &str = "COPILOT_MAX_STEPS";
pub const LEGACY_MAX_STEPS_ENV_VAR: &str = "MAX_ITERATION";
pub const MARKDOWN_RETRIES_ENV_VAR: &str = "COPILOT_MARKDOWN_RETRIES";
pub const RETRY_ATTEMPTS_ENV_VAR: &str = "COPILOT_MODEL_RETRY_ATTEMPTS";
pub const RETRY_DELAY_ENV_VAR: &str = "COPILOT_MODEL_RETRY_DELAY_MS";
pub const PROTOCOL_ENV_VAR: &str = "COPILOT_PROTOCOL";
pub const PROJECT_ENV_VAR: &str = "COPILOT_PROJECT";
pub const MCP_HOST_ENV_VAR: &str = "IDE_MCP_HOST";
pub const WORKSPACE_ROOT_ENV_VAR: &str = "COPILOT_WORKSPACE_ROOT";
pub const JOURNAL_DIR_ENV_VAR: &str = "COPILOT_JOURNAL_DIR";
pub const CHAT_CONFIG_PATH_ENV_VAR: &str = "COPILOT_CHAT_CONFIG_PATH";
pub const ENTRY_ROLE_ENV_VAR: &str = "COPILOT_ENTRY_ROLE";
pub const HTTP_PORT_ENV_VAR: &str = "HTTP_PORT";

pub const DEFAULT_HTTP_PORT: u16 = 5000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}': {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{name} must be set when {reason}")]
    MissingValue {
        name: &'static str,
        reason: &'static str,
    },
}

/// Where file commands are executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectSource {
    Mcp { host: String },
    Workspace { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub max_steps: usize,
    pub markdown_retries: usize,
    pub model_retry_attempts: u32,
    pub model_retry_delay: Duration,
    pub protocol: Protocol,
    pub project: ProjectSource,
    pub journal_dir: Option<PathBuf>,
    pub provider_id: String,
    pub chat_config_path: Option<PathBuf>,
    pub entry_role: AgentRole,
    pub http_port: u16,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let max_steps = match get(MAX_STEPS_ENV_VAR) {
            Some(value) => parse_positive(MAX_STEPS_ENV_VAR, &value)?,
            None => match get(LEGACY_MAX_STEPS_ENV_VAR) {
                Some(value) => parse_positive(LEGACY_MAX_STEPS_ENV_VAR, &value)?,
                None => DEFAULT_MAX_STEPS,
            },
        };

        let markdown_retries = get(MARKDOWN_RETRIES_ENV_VAR)
            .map(|value| parse_number(MARKDOWN_RETRIES_ENV_VAR, &value))
            .transpose()?
            .unwrap_or(DEFAULT_MARKDOWN_RETRIES);

        let model_retry_attempts = get(RETRY_ATTEMPTS_ENV_VAR)
            .map(|value| parse_positive(RETRY_ATTEMPTS_ENV_VAR, &value))
            .transpose()?
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS);

        let model_retry_delay = get(RETRY_DELAY_ENV_VAR)
            .map(|value| parse_number::<u64>(RETRY_DELAY_ENV_VAR, &value))
            .transpose()?
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RETRY_DELAY);

        let protocol = match get(PROTOCOL_ENV_VAR) {
            Some(value) => Protocol::parse(&value)
                .ok_or_else(|| invalid(PROTOCOL_ENV_VAR, &value, "expected 'tools' or 'tags'"))?,
            None => Protocol::default(),
        };

        let mcp_host = get(MCP_HOST_ENV_VAR);
        let workspace_root = || {
            PathBuf::from(get(WORKSPACE_ROOT_ENV_VAR).unwrap_or_else(|| ".".to_string()))
        };
        let project = match get(PROJECT_ENV_VAR).as_deref() {
            Some("mcp") => ProjectSource::Mcp {
                host: mcp_host.ok_or(ConfigError::MissingValue {
                    name: MCP_HOST_ENV_VAR,
                    reason: "COPILOT_PROJECT=mcp",
                })?,
            },
            Some("workspace") => ProjectSource::Workspace {
                root: workspace_root(),
            },
            Some(other) => {
                return Err(invalid(PROJECT_ENV_VAR, other, "expected 'mcp' or 'workspace'"))
            }
            None => match mcp_host {
                Some(host) => ProjectSource::Mcp { host },
                None => ProjectSource::Workspace {
                    root: workspace_root(),
                },
            },
        };

        let entry_role = match get(ENTRY_ROLE_ENV_VAR) {
            Some(value) => AgentRole::parse(&value).ok_or_else(|| {
                invalid(ENTRY_ROLE_ENV_VAR, &value, "expected ANALYTIC, CODER or SUPERVISOR")
            })?,
            None => AgentRole::Supervisor,
        };

        let http_port = get(HTTP_PORT_ENV_VAR)
            .map(|value| parse_number(HTTP_PORT_ENV_VAR, &value))
            .transpose()?
            .unwrap_or(DEFAULT_HTTP_PORT);

        Ok(Self {
            max_steps,
            markdown_retries,
            model_retry_attempts,
            model_retry_delay,
            protocol,
            project,
            journal_dir: get(JOURNAL_DIR_ENV_VAR).map(PathBuf::from),
            provider_id: get(PROVIDER_ENV_VAR).unwrap_or_else(|| DEFAULT_PROVIDER_ID.to_string()),
            chat_config_path: get(CHAT_CONFIG_PATH_ENV_VAR).map(PathBuf::from),
            entry_role,
            http_port,
        })
    }

    #[must_use]
    pub fn agent_settings(&self) -> AgentSettings {
        let settings = AgentSettings::default()
            .with_protocol(self.protocol)
            .with_max_steps(self.max_steps)
            .with_markdown_retries(self.markdown_retries);

        match &self.journal_dir {
            Some(dir) => settings.with_journal_dir(dir),
            None => settings,
        }
    }

    /// Opens the configured project service.
    ///
    /// `McpProject` wraps a blocking HTTP client; call this outside of any
    /// async runtime.
    pub fn project_service(&self) -> Result<Arc<dyn ProjectService>, ProjectError> {
        Ok(match &self.project {
            ProjectSource::Mcp { host } => Arc::new(McpProject::new(host.clone())?),
            ProjectSource::Workspace { root } => Arc::new(WorkspaceProject::new(root)?),
        })
    }
}

fn parse_number<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|error| invalid(name, value, &error.to_string()))
}

fn parse_positive<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let parsed = parse_number::<T>(name, value)?;
    if parsed <= T::default() {
        return Err(invalid(name, value, "must be greater than zero"));
    }
    Ok(parsed)
}

fn invalid(name: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
