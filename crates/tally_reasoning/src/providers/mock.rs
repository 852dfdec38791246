//! Mock generation client: scripted streams for tests and offline runs.

use crate::api_types::{Message, StreamEvent};
use crate::llm::{CompletionParams, GenerationClient};
use anyhow::Result;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum MockStep {
    Delta(String),
    /// Hold the stream open until the notify fires.
    Pause(Arc<Notify>),
    /// End the stream with an error.
    Fail(String),
}

/// What one `stream_chat` call produces.
#[derive(Debug, Clone)]
pub enum MockReply {
    Stream(Vec<MockStep>),
    /// `stream_chat` itself fails, as when the server is down.
    Unavailable(String),
}

impl MockReply {
    /// A stream of the given deltas that finishes normally.
    pub fn deltas<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        MockReply::Stream(parts.into_iter().map(|p| MockStep::Delta(p.into())).collect())
    }
}

/// A request as the mock received it.
#[derive(Debug, Clone)]
pub struct MockRequest {
    pub messages: Vec<Message>,
    pub params: CompletionParams,
}

#[derive(Debug, Default)]
pub struct MockProvider {
    model: String,
    script: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<MockRequest>>,
    resets: Mutex<usize>,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }

    /// Replies are used in order, one per `stream_chat`. Once they run out
    /// every stream is the default text reply.
    pub fn with_script(model: &str, script: Vec<MockReply>) -> Self {
        Self {
            model: model.to_string(),
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn reset_count(&self) -> usize {
        self.resets.lock().map(|r| *r).unwrap_or_default()
    }

    fn next_reply(&self) -> MockReply {
        self.script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or_else(|| {
                MockReply::deltas([format!(
                    "(Mock {} Response) I received your prompt.",
                    self.model
                )])
            })
    }
}

#[async_trait::async_trait]
impl GenerationClient for MockProvider {
    async fn stream_chat(
        &self,
        messages: Vec<Message>,
        params: CompletionParams,
    ) -> Result<mpsc::Receiver<StreamEvent>> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(MockRequest { messages, params });
        }

        let steps = match self.next_reply() {
            MockReply::Stream(steps) => steps,
            MockReply::Unavailable(reason) => anyhow::bail!("Mock unavailable: {}", reason),
        };

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            for step in steps {
                let event = match step {
                    MockStep::Delta(text) => StreamEvent::TextDelta(text),
                    MockStep::Pause(gate) => {
                        gate.notified().await;
                        continue;
                    }
                    MockStep::Fail(reason) => {
                        let _ = tx.send(StreamEvent::Error(reason)).await;
                        return;
                    }
                };
                if tx.send(event).await.is_err() {
                    return;
                }
            }
            let _ = tx
                .send(StreamEvent::Done {
                    stop_reason: Some("stop".into()),
                })
                .await;
        });
        Ok(rx)
    }

    async fn reset_context(&self) -> Result<()> {
        if let Ok(mut resets) = self.resets.lock() {
            *resets += 1;
        }
        Ok(())
    }
}
