pub mod api_types;
pub mod conversation;
pub mod function_call;
pub mod llm;
pub mod projection;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod session;
pub mod tool_registry;
pub mod tools;

pub use api_types::{Message, Role, StreamEvent};
pub use function_call::{FunctionCall, FunctionCallError};
pub use llm::{CompletionParams, GenerationClient};
pub use session::{ChatSession, Detection, SessionError, SessionOptions, SessionPhase, TurnOutcome};
pub use tool_registry::{ToolRegistry, ToolResult};
pub use tools::register_todo_tools;
