//! TodoStore on top of the SQLite key-value store.

use std::sync::Arc;
use tally_core::{KvStore, TodoStore};
use tally_memory::SqliteKvStore;

#[tokio::test]
async fn test_todos_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tally.db");

    {
        let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(&path).await.unwrap());
        let store = TodoStore::load(kv, "todos").await;
        let milk = store.add("milk").await;
        store.add("eggs").await;
        store.set_completed(&[milk.id], Some(true)).await;
    }

    let kv: Arc<dyn KvStore> = Arc::new(SqliteKvStore::new(&path).await.unwrap());
    let store = TodoStore::load(kv, "todos").await;
    let todos = store.list().await;
    assert_eq!(todos.len(), 2);
    assert_eq!(todos[0].title, "milk");
    assert!(todos[0].completed);
    assert_eq!(todos[1].title, "eggs");
    assert!(!todos[1].completed);
}

#[tokio::test]
async fn test_corrupt_row_loads_empty() {
    let kv = Arc::new(SqliteKvStore::in_memory().await.unwrap());
    kv.set("todos", b"\x00\x01garbage").await.unwrap();

    let store = TodoStore::load(kv, "todos").await;
    assert!(store.is_empty().await);
    assert!(!store.is_degraded());
}
