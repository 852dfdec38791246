//! Ollama provider.
//!
//! Ollama (and llama.cpp's server, LM Studio, ...) expose an OpenAI-compatible
//! API at `localhost:11434/v1`. Chat completions are streamed as SSE.

use super::sse::SseBuffer;
use crate::api_types::{Message, StreamEvent};
use crate::llm::{CompletionParams, GenerationClient};
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tally_core::config::LlmConfig;
use tokio::sync::mpsc;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";

#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .context("Failed to build HTTP client")?,
            base_url,
            model: config.model.clone(),
            retry: RetryConfig::default(),
        })
    }

    fn request_body(&self, messages: &[Message], params: &CompletionParams) -> Value {
        json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "seed": params.seed,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        })
    }
}

#[async_trait::async_trait]
impl GenerationClient for OllamaClient {
    async fn stream_chat(
        &self,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&messages, &params);
        tracing::debug!(
            "Ollama request: model={}, messages={}, seed={}, temperature={:.2}",
            self.model,
            messages.len(),
            params.seed,
            params.temperature
        );

        let client = &self.client;
        let response = with_retry(&self.retry, "Ollama", || async {
            client
                .post(&url)
                .json(&body)
                .send()
                .await
                .context("Failed to send streaming request to Ollama")
        })
        .await?;

        let (tx, rx) = mpsc::channel(64);
        let byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            if let Err(e) = parse_openai_sse(byte_stream, &tx).await {
                let _ = tx.send(StreamEvent::Error(format!("{e:#}"))).await;
            }
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/models", self.base_url);
        let client = &self.client;
        let response = with_retry(&RetryConfig::once(), "Ollama", || async {
            client
                .get(&url)
                .send()
                .await
                .context("Failed to reach Ollama")
        })
        .await?;

        let listing: Value = response.json().await.context("Invalid /models response")?;
        let available = listing["data"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["id"].as_str())
                    .any(|id| id == self.model || id.split(':').next() == Some(&self.model))
            })
            .unwrap_or(false);
        if !available {
            tracing::warn!(
                "Model {} not listed by Ollama; it may need `ollama pull {}`",
                self.model,
                self.model
            );
        }
        Ok(())
    }
}

/// Forward the text deltas of an OpenAI-style SSE stream.
///
/// Stops quietly once the receiver is gone. A stream that closes without
/// `[DONE]` still ends with `Done`.
pub(crate) async fn parse_openai_sse<S>(mut byte_stream: S, tx: &mpsc::Sender<StreamEvent>) -> Result<()>
where
    S: futures_util::Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin + Send,
{
    let mut buffer = SseBuffer::new();
    let mut stop_reason: Option<String> = None;

    while let Some(chunk) = byte_stream.next().await {
        let chunk = chunk.context("Error reading SSE chunk")?;
        buffer.push_bytes(&chunk);

        for line in buffer.extract_lines() {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                continue;
            };
            if data == "[DONE]" {
                let _ = tx.send(StreamEvent::Done { stop_reason }).await;
                return Ok(());
            }

            let event: Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(e) => {
                    tracing::debug!("Skipping unparsable SSE data ({}): {}", e, data);
                    continue;
                }
            };
            if let Some(err) = event.get("error") {
                let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                return Ok(());
            }

            let choice = &event["choices"][0];
            if let Some(reason) = choice["finish_reason"].as_str() {
                stop_reason = Some(reason.to_string());
            }
            if let Some(text) = choice["delta"]["content"].as_str() {
                if !text.is_empty() && tx.send(StreamEvent::TextDelta(text.to_string())).await.is_err() {
                    tracing::debug!("Stream receiver dropped, stopping");
                    return Ok(());
                }
            }
        }
    }

    if !buffer.residue().trim().is_empty() {
        tracing::debug!("Discarding trailing SSE data: {}", buffer.residue());
    }
    let _ = tx.send(StreamEvent::Done { stop_reason }).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_stream(
        chunks: &[&str],
    ) -> impl futures_util::Stream<Item = std::result::Result<bytes::Bytes, reqwest::Error>> + Unpin + Send
    {
        let items: Vec<_> = chunks
            .iter()
            .map(|c| Ok(bytes::Bytes::from(c.to_string())))
            .collect();
        futures_util::stream::iter(items)
    }

    async fn collect(chunks: &[&str]) -> Vec<StreamEvent> {
        let (tx, mut rx) = mpsc::channel(32);
        parse_openai_sse(fake_stream(chunks), &tx).await.unwrap();
        drop(tx);
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[test]
    fn test_client_defaults() {
        let client = OllamaClient::new(&LlmConfig::default()).unwrap();
        assert_eq!(client.model, "hermes3:8b");
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_request_body_carries_seed_and_stream() {
        let config = LlmConfig {
            base_url: Some("http://box:11434/v1/".into()),
            ..LlmConfig::default()
        };
        let client = OllamaClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://box:11434/v1");

        let params = CompletionParams {
            seed: 7,
            ..CompletionParams::default()
        };
        let body = client.request_body(&[Message::user("hi")], &params);
        assert_eq!(body["stream"], true);
        assert_eq!(body["seed"], 7);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[tokio::test]
    async fn test_sse_text_deltas() {
        let events = collect(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        ])
        .await;
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("Hel".into()),
                StreamEvent::TextDelta("lo".into()),
                StreamEvent::Done {
                    stop_reason: Some("stop".into())
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_sse_event_split_across_chunks() {
        let events = collect(&[
            "data: {\"choices\":[{\"delta\":{\"con",
            "tent\":\"<function>\"}}]}\n\ndata: [DONE]\n\n",
        ])
        .await;
        assert_eq!(events[0], StreamEvent::TextDelta("<function>".into()));
        assert!(matches!(events[1], StreamEvent::Done { .. }));
    }

    #[tokio::test]
    async fn test_sse_without_done_marker_still_finishes() {
        let events = collect(&["data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n"]).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], StreamEvent::Done { stop_reason: None });
    }

    #[tokio::test]
    async fn test_sse_error_payload() {
        let events = collect(&["data: {\"error\":{\"message\":\"model not found\"}}\n\n"]).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Error(e) => assert!(e.contains("model not found")),
            other => panic!("Expected error, got {:?}", other),
        }
    }
}
