//! Client for a local or remote Ollama server.
//!
//! Behaviour:
//! - Replies come from `POST /api/chat` with `stream: false`.
//! - `GET /api/version` is used as a cheap readiness probe.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::chat::types::Message;
use crate::config::CompletionConfig;

use super::completion::{CompletionClient, CompletionFuture, WireMessage, http_client, wire_messages};
use super::errors::{CompletionError, CompletionResult, truncate_body};

/// Target context length (tokens).
const CONTEXT_LENGTH: u32 = 8_192;

/// Keep the model loaded between turns.
const KEEP_ALIVE: &str = "1h";

#[derive(Serialize)]
struct ChatOptions {
    num_ctx: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    keep_alive: &'a str,
    options: ChatOptions,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

fn extract_reply(body: &str) -> CompletionResult<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

    response
        .message
        .map(|message| message.content)
        .ok_or_else(|| CompletionError::MalformedResponse("missing message".to_string()))
}

/// Async Ollama chat client.
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
}

impl OllamaClient {
    /// Build a client from configuration. No credential is needed.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &CompletionConfig) -> CompletionResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.resolved_base_url(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
        })
    }

    /// Whether the server answers `GET /api/version`.
    ///
    /// # Errors
    /// Returns an error if the server cannot be reached at all.
    pub async fn is_ready(&self) -> CompletionResult<bool> {
        let url = format!("{}/api/version", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

impl CompletionClient for OllamaClient {
    fn complete(&self, history: Vec<Message>) -> CompletionFuture<'_, CompletionResult<String>> {
        Box::pin(async move {
            let request = ChatRequest {
                model: &self.model,
                messages: wire_messages(self.system_prompt.as_deref(), &history),
                stream: false,
                keep_alive: KEEP_ALIVE,
                options: ChatOptions {
                    num_ctx: CONTEXT_LENGTH,
                    temperature: self.temperature,
                    num_predict: self.max_tokens,
                },
            };

            let url = format!("{}/api/chat", self.base_url);
            debug!("POST {url} ({} messages)", request.messages.len());

            let response = self.client.post(&url).json(&request).send().await?;
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

    #[test]
    fn test_extract_reply() {
        let body = r#"{
            "model": "llama3",
            "message": {"role": "assistant", "content": "Bonjour"},
            "done": true
        }"#;
        assert_eq!(extract_reply(body).unwrap(), "Bonjour");
    }

    #[test]
    fn test_extract_reply_missing_message() {
        let err = extract_reply(r#"{"error": "model not found"}"#).unwrap_err();
        assert!(matches!(err, CompletionError::MalformedResponse(_)));
    }

    #[test]
    fn test_request_is_not_streamed() {
        let history = vec![Message::user("hi")];
        let request = ChatRequest {
            model: "llama3",
            messages: wire_messages(Some("sys"), &history),
            stream: false,
            keep_alive: KEEP_ALIVE,
            options: ChatOptions {
                num_ctx: CONTEXT_LENGTH,
                temperature: 0.2,
                num_predict: Some(64),
            },
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["stream"], false);
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["content"], "hi");
        assert_eq!(value["options"]["num_predict"], 64);
        assert_eq!(value["options"]["num_ctx"], 8192);
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let config = CompletionConfig {
            base_url: Some("http://127.0.0.1:1".to_string()),
            timeout_secs: 5,
            ..CompletionConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert!(client.is_ready().await.is_err());
    }
}
