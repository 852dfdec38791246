use crate::tool_registry::ToolRegistry;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tally_core::{Tool, ToolError, ToolHandler, ToolInputSchema, TodoStore};

/// Register the four todo functions against a shared store.
pub fn register_todo_tools(registry: &mut ToolRegistry, store: Arc<TodoStore>) {
    registry.register(Box::new(AddTodoTool::new(store.clone())));
    registry.register(Box::new(RemoveTodoTool::new(store.clone())));
    registry.register(Box::new(ToggleCompletedTool::new(store.clone())));
    registry.register(Box::new(GetTodoListTool::new(store)));
}

/// Read todo ids from `ids` (array) or a single `id`.
///
/// Models are loose with numbers, so numeric strings are accepted too.
fn parse_ids(parameters: &Map<String, Value>) -> Result<Vec<u64>, ToolError> {
    let raw: Vec<&Value> = match (parameters.get("ids"), parameters.get("id")) {
        (Some(Value::Array(items)), _) => items.iter().collect(),
        (Some(single), _) => vec![single],
        (None, Some(single)) => vec![single],
        (None, None) => return Err(ToolError::MissingParameter("ids")),
    };

    raw.into_iter()
        .map(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| ToolError::InvalidParameter {
                    name: "ids",
                    reason: format!("{} is not a todo id", v),
                })
        })
        .collect()
}

fn ids_schema(description: &str) -> Value {
    json!({
        "type": "array",
        "items": { "type": "number" },
        "description": description
    })
}

// ============================================================================
// add_todo
// ============================================================================

pub struct AddTodoTool {
    store: Arc<TodoStore>,
}

impl AddTodoTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ToolHandler for AddTodoTool {
    fn name(&self) -> &str {
        "add_todo"
    }

    fn description(&self) -> &str {
        "Add a new todo item"
    }

    fn schema(&self) -> Tool {
        Tool {
            name: "add_todo".to_string(),
            description: "add new user todo item".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: json!({
                    "title": {
                        "type": "string",
                        "description": "title of the todo item"
                    }
                }),
                required: vec!["title".to_string()],
            },
        }
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let title = parameters
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or(ToolError::MissingParameter("title"))?;
        if title.trim().is_empty() {
            return Err(ToolError::InvalidParameter {
                name: "title",
                reason: "title is empty".into(),
            });
        }

        let todo = self.store.add(title).await;
        tracing::info!("Added todo #{}: {}", todo.id, todo.title);
        Ok(Value::Bool(true))
    }
}

// ============================================================================
// remove_todo
// ============================================================================

pub struct RemoveTodoTool {
    store: Arc<TodoStore>,
}

impl RemoveTodoTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ToolHandler for RemoveTodoTool {
    fn name(&self) -> &str {
        "remove_todo"
    }

    fn description(&self) -> &str {
        "Remove todo items by id"
    }

    fn schema(&self) -> Tool {
        Tool {
            name: "remove_todo".to_string(),
            description: "remove the user todo items by id".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: json!({ "ids": ids_schema("ids of the todo items to remove") }),
                required: vec!["ids".to_string()],
            },
        }
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let ids = parse_ids(parameters)?;
        let removed = self.store.remove(&ids).await;
        tracing::info!("Removed {} of {} requested todo(s)", removed, ids.len());
        Ok(Value::Bool(true))
    }
}

// ============================================================================
// toggle_completed
// ============================================================================

pub struct ToggleCompletedTool {
    store: Arc<TodoStore>,
}

impl ToggleCompletedTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ToolHandler for ToggleCompletedTool {
    fn name(&self) -> &str {
        "toggle_completed"
    }

    fn description(&self) -> &str {
        "Set or flip completion of todo items"
    }

    fn schema(&self) -> Tool {
        Tool {
            name: "toggle_completed".to_string(),
            description: "toggle the user todo items completion by id".to_string(),
            input_schema: ToolInputSchema {
                schema_type: "object".to_string(),
                properties: json!({
                    "ids": ids_schema("ids of the todo items"),
                    "completed": {
                        "type": "boolean",
                        "description": "whether the items are completed; omit to flip"
                    }
                }),
                required: vec!["ids".to_string()],
            },
        }
    }

    async fn execute(&self, parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let ids = parse_ids(parameters)?;
        let completed = match parameters.get("completed") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                return Err(ToolError::InvalidParameter {
                    name: "completed",
                    reason: format!("expected a boolean, got {}", other),
                })
            }
        };

        let matched = self.store.set_completed(&ids, completed).await;
        tracing::info!("Updated completion of {} todo(s)", matched);
        Ok(Value::Bool(true))
    }
}

// ============================================================================
// get_todo_list
// ============================================================================

pub struct GetTodoListTool {
    store: Arc<TodoStore>,
}

impl GetTodoListTool {
    pub fn new(store: Arc<TodoStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetTodoListTool {
    fn name(&self) -> &str {
        "get_todo_list"
    }

    fn description(&self) -> &str {
        "List all todo items"
    }

    fn schema(&self) -> Tool {
        Tool {
            name: "get_todo_list".to_string(),
            description: "get the user todo list, each item has id, title and completed"
                .to_string(),
            input_schema: ToolInputSchema::empty(),
        }
    }

    async fn execute(&self, _parameters: &Map<String, Value>) -> Result<Value, ToolError> {
        let todos = self.store.list().await;
        Ok(serde_json::to_value(todos).unwrap_or_else(|_| Value::Array(vec![])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<TodoStore>, ToolRegistry) {
        let store = Arc::new(TodoStore::in_memory());
        let mut registry = ToolRegistry::new();
        register_todo_tools(&mut registry, store.clone());
        (store, registry)
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_all_tools_registered() {
        let (_, registry) = setup();
        let names: Vec<_> = registry.available_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec!["add_todo", "get_todo_list", "remove_todo", "toggle_completed"]
        );
    }

    #[tokio::test]
    async fn test_add_todo() {
        let (store, registry) = setup();
        let result = registry
            .invoke("add_todo", &params(json!({"title": "  milk  "})))
            .await;
        assert_eq!(result.response, json!(true));
        let todos = store.list().await;
        assert_eq!(todos.len(), 1);
        assert_eq!(todos[0].title, "milk");
        assert!(!todos[0].completed);
    }

    #[tokio::test]
    async fn test_add_todo_rejects_blank_title() {
        let (store, registry) = setup();
        let result = registry.invoke("add_todo", &params(json!({"title": "  "}))).await;
        assert!(result.response.get("error").is_some());
        assert!(store.is_empty().await);

        let result = registry.invoke("add_todo", &Map::new()).await;
        assert!(result.response.get("error").is_some());
    }

    #[tokio::test]
    async fn test_add_then_remove_round_trip() {
        let (store, registry) = setup();
        registry.invoke("add_todo", &params(json!({"title": "a"}))).await;
        let id = store.list().await[0].id;

        let result = registry
            .invoke("remove_todo", &params(json!({"ids": [id]})))
            .await;
        assert_eq!(result.response, json!(true));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_absent_ids_still_succeeds() {
        let (store, registry) = setup();
        store.add("keep").await;
        let result = registry
            .invoke("remove_todo", &params(json!({"ids": [99, 100]})))
            .await;
        assert_eq!(result.response, json!(true));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_accepts_single_id_and_strings() {
        let (store, registry) = setup();
        let a = store.add("a").await;
        let b = store.add("b").await;
        registry.invoke("remove_todo", &params(json!({"id": a.id}))).await;
        registry
            .invoke("remove_todo", &params(json!({"ids": [b.id.to_string()]})))
            .await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_rejects_garbage_ids() {
        let (_, registry) = setup();
        let result = registry
            .invoke("remove_todo", &params(json!({"ids": ["first"]})))
            .await;
        assert!(result.response.get("error").is_some());
    }

    #[tokio::test]
    async fn test_toggle_completed_explicit_twice() {
        let (store, registry) = setup();
        let todo = store.add("a").await;
        for _ in 0..2 {
            let result = registry
                .invoke(
                    "toggle_completed",
                    &params(json!({"ids": [todo.id], "completed": true})),
                )
                .await;
            assert_eq!(result.response, json!(true));
            assert!(store.list().await[0].completed);
        }
    }

    #[tokio::test]
    async fn test_toggle_completed_flips_without_value() {
        let (store, registry) = setup();
        let todo = store.add("a").await;
        registry
            .invoke("toggle_completed", &params(json!({"ids": [todo.id]})))
            .await;
        assert!(store.list().await[0].completed);
        registry
            .invoke("toggle_completed", &params(json!({"ids": [todo.id]})))
            .await;
        assert!(!store.list().await[0].completed);
    }

    #[tokio::test]
    async fn test_toggle_rejects_non_boolean() {
        let (_, registry) = setup();
        let result = registry
            .invoke(
                "toggle_completed",
                &params(json!({"ids": [1], "completed": "yes"})),
            )
            .await;
        assert!(result.response.get("error").is_some());
    }

    #[tokio::test]
    async fn test_get_todo_list() {
        let (store, registry) = setup();
        store.add("milk").await;
        let result = registry.invoke("get_todo_list", &Map::new()).await;
        assert_eq!(
            result.response,
            json!([{"id": 1, "title": "milk", "completed": false}])
        );
    }
}
