//! Property-based tests for tally_core.
//!
//! Random sequences of todo operations are replayed against TodoStore and a
//! plain Vec model; both must agree after every step.

use proptest::prelude::*;
use std::sync::Arc;
use tally_core::{MemoryKvStore, Todo, TodoStore};

#[derive(Debug, Clone)]
enum Op {
    Add(String),
    /// Index into the ids handed out so far (may point at a removed todo).
    Remove(usize),
    Toggle(usize, Option<bool>),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-z ]{1,12}".prop_map(Op::Add),
        (0usize..16).prop_map(Op::Remove),
        (0usize..16, proptest::option::of(any::<bool>())).prop_map(|(i, c)| Op::Toggle(i, c)),
    ]
}

fn rt() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// The store behaves like a Vec with never-reused ids.
    #[test]
    fn store_matches_model(ops in proptest::collection::vec(arb_op(), 0..40)) {
        rt().block_on(async {
            let store = TodoStore::in_memory();
            let mut model: Vec<Todo> = Vec::new();
            let mut issued: Vec<u64> = Vec::new();

            for op in ops {
                match op {
                    Op::Add(title) => {
                        let todo = store.add(&title).await;
                        prop_assert!(!issued.contains(&todo.id), "id {} reused", todo.id);
                        issued.push(todo.id);
                        model.push(todo);
                    }
                    Op::Remove(i) => {
                        if let Some(&id) = issued.get(i) {
                            let expected = model.iter().filter(|t| t.id == id).count();
                            prop_assert_eq!(store.remove(&[id]).await, expected);
                            model.retain(|t| t.id != id);
                        }
                    }
                    Op::Toggle(i, completed) => {
                        if let Some(&id) = issued.get(i) {
                            store.set_completed(&[id], completed).await;
                            for t in model.iter_mut().filter(|t| t.id == id) {
                                t.completed = completed.unwrap_or(!t.completed);
                            }
                        }
                    }
                }
                prop_assert_eq!(store.list().await, model.clone());
            }

            let ids: Vec<u64> = model.iter().map(|t| t.id).collect();
            prop_assert!(ids.windows(2).all(|w| w[0] < w[1]));
            Ok(())
        })?;
    }

    /// Whatever was written reloads identically, and new ids stay fresh.
    #[test]
    fn reload_preserves_list(titles in proptest::collection::vec("[a-z]{1,8}", 0..10), drop_first in any::<bool>()) {
        rt().block_on(async {
            let kv = Arc::new(MemoryKvStore::new());
            let store = TodoStore::load(kv.clone(), "todos").await;
            for title in &titles {
                store.add(title).await;
            }
            if drop_first && !titles.is_empty() {
                store.remove(&[1]).await;
            }
            let before = store.list().await;

            let reloaded = TodoStore::load(kv, "todos").await;
            prop_assert_eq!(reloaded.list().await, before);
            let fresh = reloaded.add("new").await;
            prop_assert_eq!(fresh.id, titles.len() as u64 + 1);
            Ok(())
        })?;
    }
}
