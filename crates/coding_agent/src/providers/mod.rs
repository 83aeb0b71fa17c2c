use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agent_provider::{ModelProvider, ProviderInitError};
use agent_provider_chat_api::{ChatApiProvider, ChatApiProviderConfig, CHAT_API_PROVIDER_ID};
use agent_provider_mock::{MockProvider, MOCK_PROVIDER_ID};
use serde::Deserialize;

use crate::config::{AgentConfig, CHAT_CONFIG_PATH_ENV_VAR};

pub const DEFAULT_PROVIDER_ID: &str = MOCK_PROVIDER_ID;
pub const PROVIDER_ENV_VAR: &str = "COPILOT_PROVIDER";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChatConfigFile {
    api_key: String,
    model: String,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    timeout_sec: Option<u64>,
    #[serde(default)]
    max_output_tokens: Option<u32>,
}

/// Resolves the model provider named by `config`.
pub fn provider_for_config(config: &AgentConfig) -> Result<Arc<dyn ModelProvider>, ProviderInitError> {
    provider_for_id(&config.provider_id, config.chat_config_path.as_deref())
}

pub fn provider_for_id(
    provider_id: &str,
    chat_config_path: Option<&Path>,
) -> Result<Arc<dyn ModelProvider>, ProviderInitError> {
    match provider_id {
        MOCK_PROVIDER_ID => Ok(Arc::new(MockProvider::default())),
        CHAT_API_PROVIDER_ID => {
            let path = chat_config_path.ok_or_else(|| {
                ProviderInitError::new(format!(
                    "{CHAT_CONFIG_PATH_ENV_VAR} must be set for provider '{CHAT_API_PROVIDER_ID}'"
                ))
            })?;
            let raw = std::fs::read_to_string(path).map_err(|error| {
                ProviderInitError::new(format!(
                    "failed to read chat config {}: {error}",
                    path.display()
                ))
            })?;
            Ok(Arc::new(ChatApiProvider::new(parse_chat_config(&raw)?)?))
        }
        unknown => Err(ProviderInitError::new(format!(
            "Unsupported provider '{unknown}'. Available providers: {MOCK_PROVIDER_ID}, {CHAT_API_PROVIDER_ID}"
        ))),
    }
}

/// Parses the chat provider JSON config.
///
/// `api_key` and `model` are required and non-empty; `timeout_sec` must be
/// positive when present. Unknown fields are rejected.
pub fn parse_chat_config(raw: &str) -> Result<ChatApiProviderConfig, ProviderInitError> {
    let file: ChatConfigFile = serde_json::from_str(raw)
        .map_err(|error| ProviderInitError::new(format!("invalid chat config: {error}")))?;

    if file.api_key.trim().is_empty() {
        return Err(ProviderInitError::new("chat config api_key must not be empty"));
    }
    if file.model.trim().is_empty() {
        return Err(ProviderInitError::new("chat config model must not be empty"));
    }

    let mut config = ChatApiProviderConfig::new(file.api_key, file.model);
    if let Some(base_url) = file.base_url {
        config = config.with_base_url(base_url);
    }
    match file.timeout_sec {
        Some(0) => {
            return Err(ProviderInitError::new(
                "chat config timeout_sec must be greater than zero",
            ))
        }
        Some(seconds) => config = config.with_timeout(Duration::from_secs(seconds)),
        None => {}
    }
    if let Some(max_output_tokens) = file.max_output_tokens {
        config = config.with_max_output_tokens(max_output_tokens);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_for_id_supports_mock() {
        let provider = provider_for_id("mock", None).expect("mock provider should resolve");
        assert_eq!(provider.profile().provider_id, "mock");
    }

    #[test]
    fn provider_for_id_rejects_unknown_provider() {
        let error = match provider_for_id("custom", None) {
            Ok(_) => panic!("unknown providers should fail"),
            Err(error) => error,
        };

        assert!(error.message().contains("Unsupported provider 'custom'"));
    }

    #[test]
    fn chat_api_requires_config_path() {
        let error = match provider_for_id("chat-api", None) {
            Ok(_) => panic!("chat-api without config should fail"),
            Err(error) => error,
        };

        assert!(error.message().contains(CHAT_CONFIG_PATH_ENV_VAR));
    }

    #[test]
    fn chat_api_resolves_from_config_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chat.json");
        std::fs::write(
            &path,
            r#"{"api_key": "sk-test", "model": "gpt-test", "base_url": "http://127.0.0.1:9/v1"}"#,
        )
        .expect("write config");

        let provider = provider_for_id("chat-api", Some(&path)).expect("provider");
        let profile = provider.profile();
        assert_eq!(profile.provider_id, "chat-api");
        assert_eq!(profile.model_id, "gpt-test");
    }

    #[test]
    fn parse_chat_config_reads_optional_fields() {
        let config = parse_chat_config(
            r#"{"api_key": "k", "model": "m", "timeout_sec": 30, "max_output_tokens": 2048}"#,
        )
        .expect("config");

        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.max_output_tokens, Some(2048));
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn parse_chat_config_rejects_bad_input() {
        for raw in [
            r#"{"api_key": "k", "model": "m", "timeout_sec": 0}"#,
            r#"{"api_key": "k", "model": "m", "temperature": 0.2}"#,
            r#"{"api_key": " ", "model": "m"}"#,
            r#"{"api_key": "k"}"#,
        ] {
            assert!(parse_chat_config(raw).is_err(), "accepted {raw}");
        }
    }
}
