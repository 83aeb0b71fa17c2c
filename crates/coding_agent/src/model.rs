use std::sync::Arc;
use std::thread;
use std::time::Duration;

use agent_provider::{ModelProvider, ModelReply, QueryError, QueryRequest};
use tracing::{debug, warn};

use crate::error::AgentError;

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 5;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Model query with a fixed-attempt, fixed-delay retry policy.
///
/// Retryable transport errors and empty replies are retried; fatal errors are
/// returned on the first occurrence.
#[derive(Clone)]
pub struct RetryingModel {
    provider: Arc<dyn ModelProvider>,
    attempts: u32,
    delay: Duration,
}

impl RetryingModel {
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            attempts: DEFAULT_RETRY_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    pub fn query(&self, request: &QueryRequest) -> Result<ModelReply, AgentError> {
        let mut last_error = String::new();

        for attempt in 1..=self.attempts {
            match self.provider.query(request) {
                Ok(reply) if !reply.is_empty() => {
                    debug!(attempt, text = %reply.text, "model reply");
                    return Ok(reply);
                }
                Ok(_) => last_error = "empty model reply".to_string(),
                Err(error) if error.is_retryable() => last_error = error.message().to_string(),
                Err(error) => return Err(fatal(&error)),
            }

            if attempt < self.attempts {
                warn!(attempt, error = %last_error, "model query failed, retrying");
                thread::sleep(self.delay);
            }
        }

        Err(AgentError::RetryBudgetExceeded {
            attempts: self.attempts,
            message: last_error,
        })
    }
}

fn fatal(error: &QueryError) -> AgentError {
    AgentError::Model(error.message().to_string())
}
