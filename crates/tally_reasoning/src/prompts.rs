//! System prompt assembly.
//!
//! The prompt declares every callable function with its JSON schema and the
//! exact `<function>` call syntax the parser understands.

use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;
use tally_core::Tool;

const CALL_RULES: &str = r#"If you choose to call a function ONLY reply in the following format:
<function>{"name": function name, "parameters": dictionary of argument name and its value}</function>
Here is an example,
<function>{"name": "example_function_name", "parameters": {"example_name": "example_value"}}</function>
Reminder:
- Function calls MUST follow the specified format and use BOTH <function> and </function>
- Required parameters MUST be specified
- You may call several functions in one reply; put each call in its own <function></function> pair
- When calling functions, do NOT add any other words, ONLY the function calls
- Put each function call on one line
- After the function results arrive, answer the user in plain text"#;

pub struct SystemPrompt;

impl SystemPrompt {
    /// Build the prompt declaring `tools`.
    pub fn build(tools: &[Tool]) -> String {
        let declarations = tools
            .iter()
            .map(|t| {
                let decl = json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    }
                });
                serde_json::to_string_pretty(&decl).unwrap_or_default()
            })
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "# Tool Instructions\n\
             - You help the user manage their todo list.\n\
             - Use the functions below whenever the user asks to read or change the list.\n\
             You have access to the following functions:\n\n\
             {}\n\n\
             {}\n\
             You are a helpful Assistant.",
            declarations, CALL_RULES
        )
    }

    /// Load a hand-written prompt from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<String> {
        std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read system prompt: {}", path.as_ref().display())
        })
    }
}
