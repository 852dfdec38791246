//! The chat session: streams model output, runs the function calls it
//! contains, folds their results back into the conversation and resumes
//! generation until the model answers in plain text.
//!
//! Phases: `Idle → Streaming → (FunctionCallPending → ToolExecuting →
//! Streaming)* → Idle`. Cancellation is a flag checked once per stream event.
//!
//! The `started` flag is the run guard. It is set for the whole time a
//! stream is being consumed or a tool turn has been claimed, and it is only
//! ever checked-and-set under the state lock, so a function call is executed
//! exactly once no matter how often detection fires.

use crate::api_types::{Message, StreamEvent};
use crate::conversation::Conversation;
use crate::function_call::{is_function_call, parse_function_calls, strip_function_calls};
use crate::llm::{CompletionParams, GenerationClient};
use crate::projection::ReplyProjection;
use crate::prompts::SystemPrompt;
use crate::tool_registry::{ToolRegistry, ToolResult};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tally_core::config::CallDetection;
use tally_core::TallyConfig;
use tokio::sync::{watch, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Streaming,
    /// The raw buffer holds (part of) a function call; the stream is still open.
    FunctionCallPending,
    ToolExecuting,
}

/// How a submitted prompt (or a resumption) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed { reply: String, tool_rounds: usize },
    Cancelled,
}

/// Result of running function-call detection on the current raw buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    NotACall,
    /// Another detection already owns this call; nothing was done.
    AlreadyRunning,
    /// The call was executed and generation resumed to completion.
    Resumed(TurnOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a turn is already running")]
    Busy,
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("stopped after {0} tool round(s); the model kept calling functions")]
    ToolRoundLimit(usize),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub system_prompt: String,
    pub detection: CallDetection,
    pub max_tool_rounds: usize,
    pub placeholder: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl SessionOptions {
    /// Options with the prompt generated from the registered tools.
    pub fn new(registry: &ToolRegistry) -> Self {
        let defaults = TallyConfig::default();
        Self {
            system_prompt: SystemPrompt::build(&registry.available_tools()),
            detection: defaults.session.call_detection,
            max_tool_rounds: defaults.session.max_tool_rounds,
            placeholder: defaults.session.placeholder,
            temperature: defaults.llm.temperature,
            max_tokens: defaults.llm.max_tokens,
        }
    }

    /// Options from config. A configured prompt file replaces the generated prompt.
    pub fn from_config(config: &TallyConfig, registry: &ToolRegistry) -> anyhow::Result<Self> {
        let system_prompt = match &config.session.system_prompt_path {
            Some(path) => SystemPrompt::load(path)?,
            None => SystemPrompt::build(&registry.available_tools()),
        };
        Ok(Self {
            system_prompt,
            detection: config.session.call_detection,
            max_tool_rounds: config.session.max_tool_rounds,
            placeholder: config.session.placeholder.clone(),
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        })
    }
}

struct SessionState {
    conversation: Conversation,
    raw: String,
    seed: u64,
    started: bool,
    phase: SessionPhase,
    /// The buffer belongs to a cancelled stream; any call in it must not run.
    abandoned: bool,
}

/// How one stream ended.
enum StreamEnd {
    Cancelled,
    Reply(String),
    /// The buffer holds a call and the run guard is still held for it.
    CallClaimed(String),
    /// The buffer holds a call but no more tool rounds are allowed.
    CallRefused,
}

pub struct ChatSession {
    client: Arc<dyn GenerationClient>,
    registry: Arc<ToolRegistry>,
    options: SessionOptions,
    state: Mutex<SessionState>,
    projection: ReplyProjection,
    cancelled: AtomicBool,
}

impl ChatSession {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        registry: Arc<ToolRegistry>,
        options: SessionOptions,
    ) -> Self {
        let projection = ReplyProjection::new(options.detection, options.placeholder.clone());
        Self {
            client,
            registry,
            options,
            state: Mutex::new(SessionState {
                conversation: Conversation::new(),
                raw: String::new(),
                seed: 0,
                started: false,
                phase: SessionPhase::Idle,
                abandoned: false,
            }),
            projection,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Start a fresh exchange: `[system, user]` with a new seed.
    ///
    /// Returns once the model has answered in plain text, the turn was
    /// cancelled, or generation failed. Rejected with `Busy` while another
    /// turn is running.
    #[tracing::instrument(skip(self, prompt))]
    pub async fn submit(&self, prompt: &str) -> Result<TurnOutcome, SessionError> {
        {
            let mut st = self.state.lock().await;
            if st.started || st.phase != SessionPhase::Idle {
                return Err(SessionError::Busy);
            }
            st.started = true;
            st.phase = SessionPhase::Streaming;
            self.cancelled.store(false, Ordering::Release);
        }

        if let Err(e) = self.client.reset_context().await {
            self.settle_idle().await;
            return Err(SessionError::Generation(format!("{e:#}")));
        }

        {
            let mut st = self.state.lock().await;
            st.seed += 1;
            st.conversation.start(&self.options.system_prompt, prompt);
            tracing::info!("Submitted prompt (seed {})", st.seed);
        }

        match self.stream_once(self.options.max_tool_rounds > 0).await? {
            StreamEnd::Cancelled => Ok(TurnOutcome::Cancelled),
            StreamEnd::Reply(reply) => Ok(TurnOutcome::Completed {
                reply,
                tool_rounds: 0,
            }),
            StreamEnd::CallClaimed(raw) => self.resume(raw).await,
            StreamEnd::CallRefused => Err(SessionError::ToolRoundLimit(0)),
        }
    }

    /// Run function-call detection on the current raw buffer.
    ///
    /// A no-op while the run guard is held. Otherwise a complete call in the
    /// buffer is claimed, executed and generation resumes.
    pub async fn detect(&self) -> Result<Detection, SessionError> {
        let raw = {
            let mut st = self.state.lock().await;
            if st.abandoned || !is_function_call(&st.raw, self.options.detection) {
                return Ok(Detection::NotACall);
            }
            if st.started {
                tracing::debug!("Detection fired while a turn is running, ignoring");
                return Ok(Detection::AlreadyRunning);
            }
            st.started = true;
            st.phase = SessionPhase::ToolExecuting;
            self.cancelled.store(false, Ordering::Release);
            st.raw.clone()
        };

        Ok(Detection::Resumed(self.resume(raw).await?))
    }

    /// Interrupt the running turn, or clear the displayed reply when idle.
    /// Never touches the conversation.
    pub async fn reset(&self) {
        let mut st = self.state.lock().await;
        if st.started || st.phase != SessionPhase::Idle {
            tracing::info!("Cancel requested ({:?})", st.phase);
            self.cancelled.store(true, Ordering::Release);
            return;
        }
        st.raw.clear();
        self.projection.refresh(&st.raw);
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    pub async fn seed(&self) -> u64 {
        self.state.lock().await.seed
    }

    pub async fn is_running(&self) -> bool {
        let st = self.state.lock().await;
        st.started || st.phase != SessionPhase::Idle
    }

    pub async fn raw_buffer(&self) -> String {
        self.state.lock().await.raw.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.conversation.messages().to_vec()
    }

    /// The reply as currently displayed.
    pub fn reply(&self) -> String {
        self.projection.current()
    }

    /// Watch the displayed reply change as the stream arrives.
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.projection.subscribe()
    }

    /// Execute a claimed call, then keep streaming and executing until the
    /// model answers in plain text.
    async fn resume(&self, mut raw: String) -> Result<TurnOutcome, SessionError> {
        let mut rounds = 0;
        loop {
            self.execute_tool_turn(&raw).await;
            rounds += 1;

            if self.cancelled.load(Ordering::Acquire) {
                tracing::info!("Cancelled after tool execution, not resuming");
                self.settle_idle().await;
                return Ok(TurnOutcome::Cancelled);
            }

            match self
                .stream_once(rounds < self.options.max_tool_rounds)
                .await?
            {
                StreamEnd::Cancelled => return Ok(TurnOutcome::Cancelled),
                StreamEnd::Reply(reply) => {
                    return Ok(TurnOutcome::Completed {
                        reply,
                        tool_rounds: rounds,
                    })
                }
                StreamEnd::CallClaimed(next) => raw = next,
                StreamEnd::CallRefused => return Err(SessionError::ToolRoundLimit(rounds)),
            }
        }
    }

    /// Consume one generation stream into the raw buffer.
    ///
    /// On a normal end the run guard is released unless the buffer holds a
    /// call that is allowed to run, in which case it stays claimed.
    async fn stream_once(&self, allow_call: bool) -> Result<StreamEnd, SessionError> {
        let (messages, seed) = {
            let mut st = self.state.lock().await;
            st.raw.clear();
            st.started = true;
            st.abandoned = false;
            st.phase = SessionPhase::Streaming;
            self.projection.refresh(&st.raw);
            (st.conversation.messages().to_vec(), st.seed)
        };

        let params = CompletionParams {
            seed,
            max_tokens: self.options.max_tokens,
            temperature: self.options.temperature,
        };
        tracing::debug!("Opening stream over {} message(s)", messages.len());

        let mut rx = match self.client.stream_chat(messages, params).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!("Failed to open generation stream: {:#}", e);
                self.settle_idle().await;
                return Err(SessionError::Generation(format!("{e:#}")));
            }
        };

        while let Some(event) = rx.recv().await {
            if self.cancelled.load(Ordering::Acquire) {
                tracing::info!("Generation cancelled");
                self.settle_cancelled().await;
                return Ok(StreamEnd::Cancelled);
            }

            match event {
                StreamEvent::TextDelta(delta) => {
                    let mut st = self.state.lock().await;
                    st.raw.push_str(&delta);
                    if self.projection.refresh(&st.raw) {
                        st.phase = SessionPhase::FunctionCallPending;
                    }
                }
                StreamEvent::Done { stop_reason } => {
                    tracing::debug!("Stream finished: {:?}", stop_reason);
                    break;
                }
                StreamEvent::Error(e) => {
                    tracing::warn!("Stream error: {}", e);
                    self.settle_idle().await;
                    return Err(SessionError::Generation(e));
                }
            }
        }

        // reset() raises the flag under this lock, so a cancel either lands
        // here or after the call has been claimed.
        let mut st = self.state.lock().await;
        if self.cancelled.load(Ordering::Acquire) {
            tracing::info!("Generation cancelled");
            st.started = false;
            st.phase = SessionPhase::Idle;
            st.abandoned = true;
            return Ok(StreamEnd::Cancelled);
        }
        if !is_function_call(&st.raw, self.options.detection) {
            st.started = false;
            st.phase = SessionPhase::Idle;
            return Ok(StreamEnd::Reply(st.raw.clone()));
        }
        if !allow_call {
            tracing::warn!("Tool round limit reached, leaving the call unexecuted");
            st.started = false;
            st.phase = SessionPhase::Idle;
            return Ok(StreamEnd::CallRefused);
        }
        st.phase = SessionPhase::ToolExecuting;
        Ok(StreamEnd::CallClaimed(st.raw.clone()))
    }

    /// Run every call in `raw` and append the assistant/tool message pair.
    ///
    /// A malformed or truncated call is answered with an error result so the
    /// model can correct itself.
    async fn execute_tool_turn(&self, raw: &str) {
        let prose = strip_function_calls(raw);
        if !prose.is_empty() {
            tracing::debug!("Text around the call: {}", prose);
        }
        let content = match parse_function_calls(raw) {
            Ok(calls) => {
                let mut results = Vec::with_capacity(calls.len());
                for call in &calls {
                    tracing::info!("Calling {} with {:?}", call.name, call.parameters);
                    results.push(self.registry.invoke(&call.name, &call.parameters).await);
                }
                ToolResult::serialize_all(&results)
            }
            Err(e) => {
                tracing::warn!("Could not parse function call: {}", e);
                json!({ "error": "malformed call", "detail": e.to_string() }).to_string()
            }
        };

        let mut st = self.state.lock().await;
        st.conversation.push_tool_turn(raw, &content);
        st.raw.clear();
        self.projection.refresh(&st.raw);
    }

    async fn settle_idle(&self) {
        let mut st = self.state.lock().await;
        st.started = false;
        st.phase = SessionPhase::Idle;
    }

    /// Go idle after a cancel. The partial buffer stays visible for
    /// inspection, but a call in it is dropped along with the stream.
    async fn settle_cancelled(&self) {
        let mut st = self.state.lock().await;
        st.started = false;
        st.phase = SessionPhase::Idle;
        st.abandoned = true;
    }
}
