use std::sync::Arc;

use tracing::info;

use crate::agent::{Agent, AgentSettings, Delegator, RunControl, RunOutcome};
use crate::config::AgentConfig;
use crate::error::{DelegationError, StartupError};
use crate::events::OutputEvent;
use crate::interpreter::CommandInterpreter;
use crate::model::RetryingModel;
use crate::providers::provider_for_config;
use crate::roles::AgentRole;

/// Everything needed to build an [`Agent`] for any role.
///
/// Supervisors get a [`SubAgents`] delegator sharing the same model,
/// interpreter and settings.
#[derive(Clone)]
pub struct AgentFactory {
    model: RetryingModel,
    interpreter: Arc<CommandInterpreter>,
    settings: AgentSettings,
}

impl AgentFactory {
    #[must_use]
    pub fn new(
        model: RetryingModel,
        interpreter: Arc<CommandInterpreter>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            model,
            interpreter,
            settings,
        }
    }

    /// Wires provider, project service and settings from `config`.
    ///
    /// Must run outside any async runtime when the project is MCP-backed.
    pub fn from_config(config: &AgentConfig) -> Result<Self, StartupError> {
        let provider = provider_for_config(config)?;
        let profile = provider.profile();
        info!(
            provider = %profile.provider_id,
            model = %profile.model_id,
            protocol = ?config.protocol,
            "model provider ready"
        );

        let model = RetryingModel::new(provider)
            .with_retry(config.model_retry_attempts, config.model_retry_delay);
        let interpreter = Arc::new(CommandInterpreter::new(config.project_service()?));

        Ok(Self::new(model, interpreter, config.agent_settings()))
    }

    #[must_use]
    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    #[must_use]
    pub fn interpreter(&self) -> &Arc<CommandInterpreter> {
        &self.interpreter
    }

    #[must_use]
    pub fn agent(&self, role: AgentRole) -> Agent {
        let agent = Agent::new(
            role,
            self.model.clone(),
            Arc::clone(&self.interpreter),
            self.settings.clone(),
        );

        match role {
            AgentRole::Supervisor => agent.with_delegator(Arc::new(SubAgents {
                factory: self.clone(),
            })),
            AgentRole::Analytic | AgentRole::Coder => agent,
        }
    }
}

/// Runs `ANALYTIC` and `CODER` agents for a supervisor.
///
/// The nested run streams its events (start, progress, report or error) to
/// the supervisor's sink and shares its run control, so preempting the
/// session also stops the sub-agent.
pub struct SubAgents {
    factory: AgentFactory,
}

impl Delegator for SubAgents {
    fn delegate(
        &self,
        agent_name: &str,
        instruction: &str,
        control: &dyn RunControl,
        emit: &mut dyn FnMut(OutputEvent),
    ) -> Result<RunOutcome, DelegationError> {
        let role = AgentRole::parse(agent_name)
            .filter(|role| role.is_delegate())
            .ok_or_else(|| DelegationError::UnknownAgent(agent_name.trim().to_string()))?;

        if instruction.trim().is_empty() {
            return Err(DelegationError::EmptyInstruction);
        }

        info!(agent = role.as_str(), "delegating sub-task");
        Ok(self.factory.agent(role).run(instruction, control, emit))
    }
}
