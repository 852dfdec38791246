use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

impl TallyConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: TallyConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("TALLY_PROVIDER") {
            self.llm.provider = v;
        }
        if let Ok(v) = std::env::var("TALLY_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("OLLAMA_BASE_URL") {
            self.llm.base_url = Some(v);
        }
        if let Ok(v) = std::env::var("TALLY_MAX_TOKENS") {
            if let Ok(n) = v.parse() {
                self.llm.max_tokens = n;
            }
        }
        if let Ok(v) = std::env::var("TALLY_TEMPERATURE") {
            if let Ok(n) = v.parse() {
                self.llm.temperature = n;
            }
        }
        if let Ok(v) = std::env::var("TALLY_MAX_TOOL_ROUNDS") {
            if let Ok(n) = v.parse() {
                self.session.max_tool_rounds = n;
            }
        }
        if let Ok(v) = std::env::var("TALLY_DB_PATH") {
            self.storage.db_path = PathBuf::from(v);
        }
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `ollama` (any OpenAI-compatible local server) or `mock`.
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Per-request timeout for the generation server.
    pub request_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "hermes3:8b".to_string(),
            base_url: None,
            max_tokens: 1024,
            temperature: 0.7,
            request_timeout_secs: 120,
        }
    }
}

/// Where the `<function>` marker must appear for text to count as a call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDetection {
    /// Marker anywhere in the generated text.
    #[default]
    Anywhere,
    /// Text must open with the marker (leading whitespace ignored).
    Prefix,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub call_detection: CallDetection,
    /// Maximum tool-execution resumptions per submitted prompt.
    pub max_tool_rounds: usize,
    /// Shown in place of the reply while a function call is pending.
    pub placeholder: String,
    /// Replaces the generated system prompt when set.
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_detection: CallDetection::Anywhere,
            max_tool_rounds: 5,
            placeholder: "...".to_string(),
            system_prompt_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: PathBuf,
    /// Key under which the serialized todo list is stored.
    pub todos_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("tally.db"),
            todos_key: "todos".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
