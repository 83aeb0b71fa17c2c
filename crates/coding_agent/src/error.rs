use agent_provider::ProviderInitError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::project::ProjectError;

/// Misuse of `call_agent` by a supervising agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DelegationError {
    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("call_agent requires a non-empty instruction")]
    EmptyInstruction,
}

/// Structural failure that terminates one agent run.
///
/// Interpreter failures never show up here: they become `ERROR: ...` result
/// strings in the execution history instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("no commands, early stop")]
    NoCommands,

    #[error("MAX_STEP exceeded")]
    StepBudgetExceeded,

    #[error("model query failed after {attempts} attempt(s): {message}")]
    RetryBudgetExceeded { attempts: u32, message: String },

    #[error("model query failed: {0}")]
    Model(String),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error("project unavailable: {0}")]
    Project(String),
}

impl From<ProjectError> for AgentError {
    fn from(error: ProjectError) -> Self {
        Self::Project(error.to_string())
    }
}

impl AgentError {
    /// Budget exhaustion (steps or model retries), as opposed to misuse.
    #[must_use]
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(
            self,
            Self::StepBudgetExceeded | Self::RetryBudgetExceeded { .. }
        )
    }
}

/// Failure while wiring configuration, project and provider at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open project: {0}")]
    Project(#[from] ProjectError),

    #[error("failed to initialize model provider: {0}")]
    Provider(#[from] ProviderInitError),
}
