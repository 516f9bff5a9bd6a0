//! Startup helpers for the terminal client.

use std::process::ExitCode;
use std::sync::Arc;

use crate::chat::storage::ChatStorage;
use crate::chat::store::ConversationStore;
use crate::cli;
use crate::config::{Provider, ThreadlineConfig};
use crate::llm::{OllamaClient, build_client};

/// Run the terminal client until `/quit` or end of input.
///
/// # Returns
/// `ExitCode::SUCCESS` on a clean exit, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting threadline v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(1);
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    if let Err(e) = rt.block_on(run_with_config(config)) {
        tracing::error!("Client error: {e}");
        return ExitCode::from(1);
    }

    ExitCode::SUCCESS
}

/// Read and validate configuration from the environment.
///
/// # Errors
/// Returns an error if a variable is malformed or the result is invalid.
pub fn load_config() -> Result<ThreadlineConfig, Box<dyn std::error::Error + Send + Sync>> {
    let config = ThreadlineConfig::from_env()?;
    config.validate()?;
    Ok(config)
}

/// Open the store described by `config` and run the terminal loop.
///
/// # Errors
/// Returns an error if the completion client cannot be built or stdin fails.
pub async fn run_with_config(
    config: ThreadlineConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let completion = &config.completion;
    if completion.provider == Provider::Ollama {
        warn_if_ollama_down(&OllamaClient::new(completion)?).await;
    }

    let client = build_client(completion)?;
    tracing::info!(
        "Completion endpoint: {} ({:?}, model {})",
        completion.resolved_base_url(),
        completion.provider,
        client.model()
    );
    let storage = ChatStorage::in_dir(&config.storage.data_dir);
    tracing::info!("Data directory: {}", config.storage.data_dir.display());

    let store = Arc::new(ConversationStore::open(storage, client).await);
    cli::run_repl(store).await?;
    Ok(())
}

async fn warn_if_ollama_down(client: &OllamaClient) {
    match client.is_ready().await {
        Ok(true) => {}
        Ok(false) => tracing::warn!("Ollama answered but is not ready"),
        Err(e) => tracing::warn!("Ollama is not reachable yet: {e}"),
    }
}
