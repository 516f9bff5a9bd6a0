//! Completion client contract shared by every provider.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::chat::types::Message;
use crate::config::{CompletionConfig, Provider};

use super::errors::{CompletionError, CompletionResult};
use super::ollama::OllamaClient;
use super::openai::OpenAiClient;

/// Boxed future type for completion requests.
pub type CompletionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A text-generation service answering a message history.
///
/// One request, one reply: no retries and no streaming.
pub trait CompletionClient: Send + Sync {
    /// Send the full history and return the reply text.
    ///
    /// # Errors
    /// Returns an error on transport failure, a non-success status, or a
    /// response without reply text.
    fn complete(&self, history: Vec<Message>) -> CompletionFuture<'_, CompletionResult<String>>;

    /// Model name used for requests.
    fn model(&self) -> &str;
}

/// Connect timeout for provider endpoints.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Role/content pair as most chat APIs expect it.
#[derive(Debug, Serialize)]
pub(crate) struct WireMessage<'a> {
    pub(crate) role: &'a str,
    pub(crate) content: &'a str,
}

/// Flatten the history into wire messages, with an optional leading system prompt.
pub(crate) fn wire_messages<'a>(
    system_prompt: Option<&'a str>,
    history: &'a [Message],
) -> Vec<WireMessage<'a>> {
    let system = system_prompt
        .filter(|prompt| !prompt.trim().is_empty())
        .map(|prompt| WireMessage {
            role: "system",
            content: prompt,
        });

    system
        .into_iter()
        .chain(history.iter().map(|message| WireMessage {
            role: message.role.as_str(),
            content: &message.content,
        }))
        .collect()
}

/// Build the HTTP client every provider shares.
pub(crate) fn http_client(config: &CompletionConfig) -> CompletionResult<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| CompletionError::InvalidConfig(format!("http client: {e}")))
}

/// Build the client selected by `config.provider`.
///
/// # Errors
/// Returns an error if the provider needs a credential that is missing or the
/// HTTP client cannot be built.
pub fn build_client(config: &CompletionConfig) -> CompletionResult<Arc<dyn CompletionClient>> {
    let client: Arc<dyn CompletionClient> = match config.provider {
        Provider::OpenAi => Arc::new(OpenAiClient::new(config)?),
        Provider::Ollama => Arc::new(OllamaClient::new(config)?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_messages_keep_order_and_roles() {
        let history = vec![Message::user("hi"), Message::assistant("hello")];
        let wire = wire_messages(None, &history);
        let pairs: Vec<_> = wire.iter().map(|m| (m.role, m.content)).collect();
        assert_eq!(pairs, vec![("user", "hi"), ("assistant", "hello")]);
    }

    #[test]
    fn test_wire_messages_prepend_system_prompt() {
        let history = vec![Message::user("hi")];
        let wire = wire_messages(Some("be brief"), &history);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "system");
        assert_eq!(wire[0].content, "be brief");

        let blank = wire_messages(Some("   "), &history);
        assert_eq!(blank.len(), 1);
    }

    #[test]
    fn test_build_client_for_each_provider() {
        let mut config = CompletionConfig::default();
        let ollama = build_client(&config).unwrap();
        assert_eq!(ollama.model(), config.model);

        config.provider = Provider::OpenAi;
        assert!(matches!(
            build_client(&config).err(),
            Some(CompletionError::MissingCredential)
        ));

        config.api_key = Some("sk-test".to_string());
        config.model = "gpt-4o-mini".to_string();
        assert_eq!(build_client(&config).unwrap().model(), "gpt-4o-mini");
    }
}
