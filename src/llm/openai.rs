//! Client for OpenAI-compatible `chat/completions` endpoints.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::types::Message;
use crate::config::CompletionConfig;

use super::completion::{CompletionClient, CompletionFuture, WireMessage, http_client, wire_messages};
use super::errors::{CompletionError, CompletionResult, truncate_body};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Pull the first choice's text out of a `chat/completions` response body.
fn extract_reply(body: &str) -> CompletionResult<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| CompletionError::MalformedResponse("no choices in response".to_string()))
}

/// Async client for the OpenAI chat completions API (or a compatible server).
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
}

impl OpenAiClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Returns [`CompletionError::MissingCredential`] without an API key, or an
    /// error if the HTTP client cannot be built.
    pub fn new(config: &CompletionConfig) -> CompletionResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(CompletionError::MissingCredential)?;

        Ok(Self {
            client: http_client(config)?,
            endpoint: format!("{}/chat/completions", config.resolved_base_url()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        })
    }
}

impl CompletionClient for OpenAiClient {
    fn complete(&self, history: Vec<Message>) -> CompletionFuture<'_, CompletionResult<String>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: &self.model,
                messages: wire_messages(self.system_prompt.as_deref(), &history),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            debug!(
                "POST {} ({} messages, model {})",
                self.endpoint,
                request.messages.len(),
                self.model
            );

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            let body = response.text().await?;
            if !status.is_success() {
                return Err(CompletionError::HttpStatus {
                    status: status.as_u16(),
                    body: truncate_body(&body),
                });
            }

            extract_reply(&body)
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;

    #[test]
    fn test_extract_reply_reads_first_choice() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "Hello!"}},
                {"index": 1, "message": {"role": "assistant", "content": "Other"}}
            ]
        }"#;
        assert_eq!(extract_reply(body).unwrap(), "Hello!");
    }

    #[test]
    fn test_extract_reply_without_choices() {
        let err = extract_reply(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[test]
    fn test_extract_reply_on_garbage() {
        let err = extract_reply("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[test]
    fn test_request_payload_shape() {
        let history = vec![Message::user("hi")];
        let request = ChatRequest {
            model: "gpt-3.5-turbo",
            messages: wire_messages(None, &history),
            temperature: 0.7,
            max_tokens: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-3.5-turbo");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hi");
        assert!(value.get("max_tokens").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_network_error() {
        let config = CompletionConfig {
            provider: Provider::OpenAi,
            base_url: Some("http://127.0.0.1:1".to_string()),
            api_key: Some("sk-test".to_string()),
            timeout_secs: 5,
            ..CompletionConfig::default()
        };
        let client = OpenAiClient::new(&config).unwrap();
        let err = client.complete(vec![Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, CompletionError::Network(_)));
    }
}
