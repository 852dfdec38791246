pub mod config;
pub mod storage;
pub mod todo;
pub mod tools;

pub use config::TallyConfig;
pub use storage::{KvStore, MemoryKvStore};
pub use todo::{Todo, TodoStore};
pub use tools::{Tool, ToolError, ToolHandler, ToolInputSchema};
