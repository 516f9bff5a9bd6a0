//! Runtime configuration.
//!
//! Defaults are usable for a local Ollama install; `from_env` overlays the
//! `THREADLINE_*` variables on top of them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Environment variable selecting the completion provider.
pub const PROVIDER_ENV: &str = "THREADLINE_PROVIDER";
/// Environment variable overriding the model name.
pub const MODEL_ENV: &str = "THREADLINE_MODEL";
/// Environment variable overriding the provider base URL.
pub const BASE_URL_ENV: &str = "THREADLINE_BASE_URL";
/// Environment variable carrying the API credential.
pub const API_KEY_ENV: &str = "THREADLINE_API_KEY";
/// Fallback credential variable understood by most OpenAI tooling.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Environment variable carrying an optional system prompt.
pub const SYSTEM_PROMPT_ENV: &str = "THREADLINE_SYSTEM_PROMPT";
/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "THREADLINE_DATA_DIR";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or missing.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// A base URL does not parse.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Convenience result alias for configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ThreadlineConfig {
    /// Completion service settings.
    pub completion: CompletionConfig,
    /// Persistence settings.
    pub storage: StorageConfig,
}

impl ThreadlineConfig {
    /// Defaults overlaid with the `THREADLINE_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if the provider name is unknown.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Ok(provider) = std::env::var(PROVIDER_ENV) {
            config.completion.provider = provider.parse()?;
            if config.completion.provider == Provider::OpenAi {
                config.completion.model = OPENAI_DEFAULT_MODEL.to_string();
            }
        }
        if let Ok(model) = std::env::var(MODEL_ENV) {
            config.completion.model = model;
        }
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.completion.base_url = Some(base_url);
        }
        config.completion.api_key = std::env::var(API_KEY_ENV)
            .or_else(|_| std::env::var(OPENAI_API_KEY_ENV))
            .ok();
        if let Ok(prompt) = std::env::var(SYSTEM_PROMPT_ENV) {
            config.completion.system_prompt = Some(prompt);
        }
        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.storage.data_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> ConfigResult<()> {
        let completion = &self.completion;

        if completion.model.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "completion.model must not be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&completion.temperature) {
            return Err(ConfigError::Invalid(
                "completion.temperature must be within 0.0..=2.0".to_string(),
            ));
        }

        if completion.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "completion.timeout_secs must be > 0".to_string(),
            ));
        }

        if completion.max_tokens == Some(0) {
            return Err(ConfigError::Invalid(
                "completion.max_tokens must be > 0 when set".to_string(),
            ));
        }

        if let Some(base_url) = &completion.base_url {
            Url::parse(base_url)?;
        }

        if completion.provider == Provider::OpenAi
            && completion.api_key.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Invalid(format!(
                "the openai provider needs a credential in {API_KEY_ENV} or {OPENAI_API_KEY_ENV}"
            )));
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "storage.data_dir must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Default model for the OpenAI provider.
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Which completion API to talk to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// OpenAI-compatible `chat/completions` endpoint.
    #[serde(rename = "openai")]
    OpenAi,
    /// Ollama `/api/chat` endpoint.
    #[default]
    Ollama,
}

impl Provider {
    /// Base URL used when none is configured.
    #[must_use]
    pub const fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://127.0.0.1:11434",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Invalid(format!("unknown provider: {other}"))),
        }
    }
}

/// Completion service settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Provider flavour.
    pub provider: Provider,
    /// Model name as known to the provider.
    pub model: String,
    /// Optional custom base URL.
    pub base_url: Option<String>,
    /// Bearer credential, required by the OpenAI provider.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
    /// Optional cap on generated tokens.
    pub max_tokens: Option<u32>,
    /// Optional system prompt sent ahead of the history.
    pub system_prompt: Option<String>,
    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,
}

impl CompletionConfig {
    /// Base URL with any trailing slash removed.
    #[must_use]
    pub fn resolved_base_url(&self) -> String {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Ollama,
            model: "llama3.2".to_string(),
            base_url: None,
            api_key: None,
            temperature: 0.7,
            max_tokens: None,
            system_prompt: None,
            timeout_secs: 120,
        }
    }
}

/// Persistence settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the conversation blob.
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".threadline"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ThreadlineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_openai_requires_credential() {
        let mut config = ThreadlineConfig::default();
        config.completion.provider = Provider::OpenAi;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.completion.api_key = Some("sk-test".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_base_url_is_rejected() {
        let mut config = ThreadlineConfig::default();
        config.completion.base_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Url(_))));
    }

    #[test]
    fn test_temperature_range() {
        let mut config = ThreadlineConfig::default();
        config.completion.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_wire_names() {
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"openai\"");
        assert_eq!(serde_json::to_string(&Provider::Ollama).unwrap(), "\"ollama\"");
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" ollama ".parse::<Provider>().unwrap(), Provider::Ollama);
        assert!("bard".parse::<Provider>().is_err());
    }

    #[test]
    fn test_resolved_base_url_strips_slash() {
        let mut completion = CompletionConfig::default();
        assert_eq!(completion.resolved_base_url(), "http://127.0.0.1:11434");
        completion.base_url = Some("http://localhost:8080/v1/".to_string());
        assert_eq!(completion.resolved_base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let mut config = ThreadlineConfig::default();
        config.completion.api_key = Some("secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
