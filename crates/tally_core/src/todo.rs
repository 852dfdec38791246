//! The todo list the assistant manipulates.
//!
//! Every mutation is written through to the configured [`KvStore`]. Storage
//! is best effort: unreadable data loads as an empty list, and the first
//! failed write switches the store to in-memory only for the rest of the
//! session.

use crate::storage::KvStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: u64,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Default)]
struct TodoList {
    todos: Vec<Todo>,
    /// Next id to hand out. Never decreases, so ids are not reused after deletes.
    next_id: u64,
}

pub struct TodoStore {
    list: RwLock<TodoList>,
    storage: Option<Arc<dyn KvStore>>,
    key: String,
    persist_disabled: AtomicBool,
}

impl TodoStore {
    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            list: RwLock::new(TodoList {
                todos: Vec::new(),
                next_id: 1,
            }),
            storage: None,
            key: String::new(),
            persist_disabled: AtomicBool::new(false),
        }
    }

    /// Recover the list stored under `key`. Never fails: missing or corrupt
    /// data yields an empty list.
    pub async fn load(storage: Arc<dyn KvStore>, key: &str) -> Self {
        let mut todos = match storage.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<Vec<Todo>>(&bytes) {
                Ok(todos) => todos,
                Err(e) => {
                    tracing::warn!("Stored todo list is corrupt, starting empty: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read todo list, starting empty: {}", e);
                Vec::new()
            }
        };

        let stored_counter = match storage.get(&counter_key(key)).await {
            Ok(Some(bytes)) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .unwrap_or(0),
            _ => 0,
        };
        let after_max = match todos.iter().map(|t| t.id).max() {
            None => 1,
            Some(max) => max.checked_add(1).unwrap_or_else(|| {
                tracing::warn!("Stored todo list has an out of range id, starting empty");
                todos.clear();
                1
            }),
        };
        let next_id = stored_counter.max(after_max);

        tracing::info!("Loaded {} todo(s), next id {}", todos.len(), next_id);

        Self {
            list: RwLock::new(TodoList { todos, next_id }),
            storage: Some(storage),
            key: key.to_string(),
            persist_disabled: AtomicBool::new(false),
        }
    }

    /// Append a new, not yet completed todo. The title is trimmed.
    pub async fn add(&self, title: &str) -> Todo {
        let mut list = self.list.write().await;
        let id = match list.next_id.checked_add(1) {
            Some(next) => std::mem::replace(&mut list.next_id, next),
            None => lowest_free_id(&list.todos),
        };
        let todo = Todo {
            id,
            title: title.trim().to_string(),
            completed: false,
        };
        list.todos.push(todo.clone());
        self.persist(&list).await;
        todo
    }

    /// Remove every todo whose id is in `ids`. Absent ids are ignored.
    /// Returns how many todos were removed.
    pub async fn remove(&self, ids: &[u64]) -> usize {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        let mut list = self.list.write().await;
        let before = list.todos.len();
        list.todos.retain(|t| !ids.contains(&t.id));
        let removed = before - list.todos.len();
        if removed > 0 {
            self.persist(&list).await;
        }
        removed
    }

    /// Set `completed` on every matching todo, or flip it when `completed`
    /// is `None`. Returns how many todos matched.
    pub async fn set_completed(&self, ids: &[u64], completed: Option<bool>) -> usize {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        let mut list = self.list.write().await;
        let mut matched = 0;
        for todo in list.todos.iter_mut().filter(|t| ids.contains(&t.id)) {
            todo.completed = completed.unwrap_or(!todo.completed);
            matched += 1;
        }
        if matched > 0 {
            self.persist(&list).await;
        }
        matched
    }

    /// Snapshot of the current list, in insertion order.
    pub async fn list(&self) -> Vec<Todo> {
        self.list.read().await.todos.clone()
    }

    pub async fn len(&self) -> usize {
        self.list.read().await.todos.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// True once a write has failed and persistence was switched off.
    pub fn is_degraded(&self) -> bool {
        self.persist_disabled.load(Ordering::Acquire)
    }

    async fn persist(&self, list: &TodoList) {
        let Some(storage) = &self.storage else {
            return;
        };
        if self.persist_disabled.load(Ordering::Acquire) {
            return;
        }

        let result = match serde_json::to_vec(&list.todos) {
            Ok(bytes) => match storage.set(&self.key, &bytes).await {
                Ok(()) => {
                    storage
                        .set(&counter_key(&self.key), list.next_id.to_string().as_bytes())
                        .await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e.into()),
        };

        if let Err(e) = result {
            self.persist_disabled.store(true, Ordering::Release);
            tracing::warn!(
                "Failed to persist todo list, keeping changes in memory only: {}",
                e
            );
        }
    }
}

fn counter_key(key: &str) -> String {
    format!("{key}.next_id")
}

/// Fallback once the counter can no longer advance.
fn lowest_free_id(todos: &[Todo]) -> u64 {
    let used: HashSet<u64> = todos.iter().map(|t| t.id).collect();
    tracing::warn!("Todo id counter exhausted, reusing a free id");
    (1..u64::MAX).find(|id| !used.contains(id)).unwrap_or(u64::MAX)
}
