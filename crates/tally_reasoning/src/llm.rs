use crate::api_types::{Message, StreamEvent};
use anyhow::Result;
use async_trait::async_trait;

/// Parameters for one generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    /// Sampling seed; fixed for every resumption within one submitted prompt.
    pub seed: u64,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            seed: 0,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }
}

/// The text-generation service. Treated as an opaque stream of deltas.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Open a streaming chat completion over the full message log.
    ///
    /// The receiver yields deltas in generation order and ends with either
    /// `Done` or `Error`. Dropping it stops the producer.
    async fn stream_chat(
        &self,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<tokio::sync::mpsc::Receiver<StreamEvent>>;

    /// Forget any server-side chat context before a fresh prompt.
    async fn reset_context(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the service is reachable and ready to generate.
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
