use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tally_core::{Tool, ToolHandler};

/// Outcome of one function call, folded back into the conversation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub name: String,
    /// `true`/`false` for mutations, the payload for queries, `false` for
    /// unknown functions, `{"error": ...}` for rejected parameters.
    pub response: Value,
}

impl ToolResult {
    /// Serialize results as one compact JSON object per line, in call order.
    pub fn serialize_all(results: &[ToolResult]) -> String {
        results
            .iter()
            .map(|r| serde_json::to_string(r).unwrap_or_else(|_| "null".to_string()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// ToolRegistry
// ============================================================================

#[derive(Default)]
pub struct ToolRegistry {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler. Overwrites any existing handler with the same name.
    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        let name = handler.name().to_string();
        tracing::debug!("Registered tool: {}", name);
        self.handlers.insert(name, handler);
    }

    /// Tool schemas for the system prompt, sorted by name.
    pub fn available_tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.handlers.values().map(|h| h.schema()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Dispatch a function call by name.
    ///
    /// Unknown names are not an error: they answer `false` ("not handled").
    pub async fn invoke(&self, name: &str, parameters: &Map<String, Value>) -> ToolResult {
        let response = match self.handlers.get(name) {
            Some(handler) => match handler.execute(parameters).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!("Tool '{}' rejected its parameters: {}", name, e);
                    json!({ "error": e.to_string() })
                }
            },
            None => {
                tracing::warn!("Model called unknown function '{}'", name);
                Value::Bool(false)
            }
        };

        ToolResult {
            name: name.to_string(),
            response,
        }
    }
}
