//! Tool abstraction types shared between the tool registry and the
//! todo handlers that back it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// JSON tool definition advertised to the model in the system prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
}

/// JSON Schema for tool input parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: Value,
    pub required: Vec<String>,
}

impl ToolInputSchema {
    /// Schema for a tool that takes no parameters.
    pub fn empty() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Value::Object(Map::new()),
            required: vec![],
        }
    }
}

/// Parameter validation failures raised by a tool handler.
///
/// These are reported back to the model as `{"error": ...}`; they never
/// abort the conversation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolError {
    #[error("missing required parameter \"{0}\"")]
    MissingParameter(&'static str),
    #[error("invalid parameter \"{name}\": {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Trait for tool handlers that can be registered and dispatched.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique name used for dispatch (must match the tool name in schema).
    fn name(&self) -> &str;
    /// Human-readable description for logging.
    fn description(&self) -> &str;
    /// JSON schema declared to the model so it knows how to call this tool.
    fn schema(&self) -> Tool;
    /// Execute the tool with the parsed call parameters.
    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError>;
}
