//! Completion clients for the language-model APIs.

pub mod completion;
pub mod errors;
pub mod ollama;
pub mod openai;

pub use completion::{CompletionClient, CompletionFuture, build_client};
pub use errors::{CompletionError, CompletionResult};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
