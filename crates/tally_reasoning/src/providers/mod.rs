pub mod mock;
pub mod ollama;
mod sse;

pub use mock::{MockProvider, MockReply, MockStep};
pub use ollama::OllamaClient;

use crate::llm::GenerationClient;
use anyhow::Result;
use std::sync::Arc;
use tally_core::config::LlmConfig;

/// Build the generation client named by `config.provider`.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn GenerationClient>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(config)?)),
        "mock" => Ok(Arc::new(MockProvider::new(&config.model))),
        other => anyhow::bail!("Unknown provider '{}' (expected 'ollama' or 'mock')", other),
    }
}
