//! Integration tests for undo/redo history and history plugins.

mod common;

use arbor::{
    create_store, AppliedAction, HistoryChange, HistoryOperation, Path, Store, StoreOptions,
    StorePlugin, Value,
};
use common::{Calls, Counter};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn store_with_history(initial: serde_json::Value, limit: usize) -> Store {
    create_store(initial, StoreOptions::new().history_limit(limit)).unwrap()
}

// ============================================================================
// Unscoped undo / redo
// ============================================================================

#[test]
fn test_counter_undo_redo() {
    let store = store_with_history(json!({"count": 0}), 10);
    store.dispatch(json!({"count": 5}));
    assert_eq!(store.get_state()["count"], 5);

    assert!(store.undo(1));
    assert_eq!(store.get_state()["count"], 0);
    assert!(store.redo(1));
    assert_eq!(store.get_state()["count"], 5);
}

#[test]
fn test_undo_then_redo_restores_identical_state() {
    let store = store_with_history(json!({"a": {"list": [1]}, "b": 0}), 10);
    store.update_path("a.list.1", 2);
    store.dispatch(json!({"b": 1}));
    store.transaction(|draft| {
        draft.push("a.list", 3)?;
        Ok(())
    });

    for steps in 1..=3 {
        let before = store.get_state();
        assert!(store.undo(steps));
        assert!(store.redo(steps));
        assert!(store.get_state().same(&before));
    }
}

#[test]
fn test_multi_step_moves_and_bounds() {
    let store = store_with_history(json!({"n": 0}), 10);
    for n in 1..=3 {
        store.dispatch(json!({ "n": n }));
    }

    assert!(!store.undo(0));
    assert!(!store.undo(4));
    assert!(store.undo(3));
    assert_eq!(store.get_state()["n"], 0);
    assert!(!store.can_undo());
    assert!(store.can_redo());

    assert!(!store.redo(4));
    assert!(store.redo(2));
    assert_eq!(store.get_state()["n"], 2);
    assert_eq!(store.history().cursor, 2);
}

#[test]
fn test_commit_after_undo_truncates_redo_branch() {
    let store = store_with_history(json!({"n": 0}), 10);
    store.dispatch(json!({"n": 1}));
    store.dispatch(json!({"n": 2}));
    store.undo(1);

    store.dispatch(json!({"n": 10}));
    assert!(!store.can_redo());
    assert!(!store.redo(1));

    assert!(store.undo(1));
    assert_eq!(store.get_state()["n"], 1);
    assert_eq!(store.history().len(), 3);
}

#[test]
fn test_limit_evicts_oldest_entries() {
    let store = store_with_history(json!({"n": 0}), 2);
    for n in 1..=3 {
        store.dispatch(json!({ "n": n }));
    }

    let history = store.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history.limit, 2);
    assert_eq!(history.entries[0].state, json!({"n": 1}));

    assert!(!store.undo(3));
    assert!(store.undo(2));
    assert_eq!(store.get_state()["n"], 1);
}

#[test]
fn test_history_disabled_by_default() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    store.dispatch(json!({"n": 1}));
    assert!(!store.can_undo());
    assert!(!store.undo(1));
    assert_eq!(store.history().len(), 1);
    assert_eq!(store.get_state()["n"], 1);
}

#[test]
fn test_unbounded_history_limit() {
    let store = store_with_history(json!({"n": 0}), usize::MAX);
    for n in 1..=3 {
        store.dispatch(json!({ "n": n }));
    }
    assert_eq!(store.history().len(), 4);
    assert!(store.undo(3));
    assert_eq!(store.get_state()["n"], 0);
}

#[test]
fn test_undo_notifies_without_recording() {
    let store = store_with_history(json!({"n": 0}), 10);
    store.dispatch(json!({"n": 1}));
    let calls = Calls::default();
    store.subscribe(calls.listener());

    store.undo(1);
    assert_eq!(calls.all(), vec![(Value::from(json!({"n": 0})), Value::from(json!({"n": 1})))]);
    assert_eq!(store.history().len(), 2);
    assert_eq!(store.history().cursor, 0);
}

#[test]
fn test_undo_inside_batch_is_rejected() {
    let store = store_with_history(json!({"n": 0}), 10);
    store.dispatch(json!({"n": 1}));

    let moved = store.batch(|| store.undo(1));
    assert!(!moved);
    assert_eq!(store.get_state()["n"], 1);
    assert!(store.undo(1));
}

// ============================================================================
// Scoped undo / redo
// ============================================================================

#[test]
fn test_scoped_undo_restores_only_that_branch() {
    let store = store_with_history(json!({"a": 0, "b": 0}), 10);
    store.dispatch(json!({"b": 1}));
    store.dispatch(json!({"a": 1}));

    assert!(store.undo_at("b", 2));
    assert_eq!(store.get_state(), json!({"a": 1, "b": 0}));
    assert_eq!(store.history().cursor, 0);
}

#[test]
fn test_scoped_undo_deletes_branch_absent_in_target() {
    let store = store_with_history(json!({"a": 0}), 10);
    store.update_path("extra.flag", true);
    store.dispatch(json!({"a": 5}));

    assert!(store.undo_at("extra", 2));
    assert_eq!(store.get_state(), json!({"a": 5}));
}

#[test]
fn test_scoped_redo() {
    let store = store_with_history(json!({"a": 0, "b": 0}), 10);
    store.dispatch(json!({"a": 1, "b": 1}));
    store.undo(1);
    store.update_path_with("b", |_| Some(Value::from(0)));

    assert!(store.can_redo());
    assert!(store.redo_at(Path::parse("a"), 1));
    assert_eq!(store.get_state(), json!({"a": 1, "b": 0}));
}

// ============================================================================
// Plugins
// ============================================================================

#[derive(Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl StorePlugin for Recorder {
    fn id(&self) -> &str {
        "recorder"
    }

    fn on_store_create(&self, store: &Store) {
        self.events.lock().push(format!("create:{}", store.name()));
    }

    fn on_state_change(&self, new: &Value, _prev: &Value, action: &AppliedAction) {
        self.events.lock().push(format!("{}:{}", action.kind(), new["n"]));
    }

    fn before_history_change(&self, change: &HistoryChange) -> bool {
        self.events
            .lock()
            .push(format!("before:{:?}:{}", change.operation, change.steps));
        true
    }

    fn on_destroy(&self, _store: &Store) {
        self.events.lock().push("destroy".to_string());
    }
}

struct ScopedOnly;

impl StorePlugin for ScopedOnly {
    fn id(&self) -> &str {
        "scoped_only"
    }

    fn before_history_change(&self, change: &HistoryChange) -> bool {
        change.path.is_some()
    }
}

#[test]
fn test_plugin_hooks_fire_in_lifecycle_order() {
    let recorder = Recorder::default();
    let events = recorder.events.clone();
    let store = create_store(
        json!({"n": 0}),
        StoreOptions::new().name("counter").history_limit(5).plugin(recorder),
    )
    .unwrap();

    store.dispatch(json!({"n": 1}));
    store.undo(1);
    store.destroy(Default::default());

    assert_eq!(
        *events.lock(),
        vec![
            "create:counter".to_string(),
            "dispatch:1".to_string(),
            "before:Undo:1".to_string(),
            "undo:0".to_string(),
            "destroy".to_string(),
        ]
    );
}

#[test]
fn test_plugin_can_veto_history_moves() {
    let store = create_store(
        json!({"a": 0, "b": 0}),
        StoreOptions::new().history_limit(5).plugin(ScopedOnly),
    )
    .unwrap();
    store.dispatch(json!({"a": 1, "b": 1}));

    assert!(!store.undo(1));
    assert_eq!(store.get_state(), json!({"a": 1, "b": 1}));

    assert!(store.undo_at("a", 1));
    assert_eq!(store.get_state(), json!({"a": 0, "b": 1}));
}

#[test]
fn test_veto_stops_later_plugins() {
    let recorder = Recorder::default();
    let events = recorder.events.clone();
    let store = create_store(
        json!({"n": 0}),
        StoreOptions::new()
            .history_limit(5)
            .plugin(ScopedOnly)
            .plugin(recorder),
    )
    .unwrap();
    store.dispatch(json!({"n": 1}));
    events.lock().clear();

    assert!(!store.undo(1));
    assert!(events.lock().is_empty());
}

#[test]
fn test_out_of_range_skips_plugins() {
    let recorder = Recorder::default();
    let events = recorder.events.clone();
    let store = create_store(json!({"n": 0}), StoreOptions::new().history_limit(5).plugin(recorder)).unwrap();
    events.lock().clear();

    assert!(!store.undo(1));
    assert!(events.lock().is_empty());
}

// ============================================================================
// Reset
// ============================================================================

#[test]
fn test_reset_restores_initial_state_and_clears_history() {
    let store = store_with_history(json!({"n": 0}), 5);
    store.dispatch(json!({"n": 1}));
    store.dispatch(json!({"n": 2}));
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe(move |_, _| hits.hit());

    assert!(store.reset());
    assert_eq!(store.get_state(), json!({"n": 0}));
    assert_eq!(calls.get(), 1);
    assert_eq!(store.history().len(), 1);
    assert!(!store.can_undo());
}

#[test]
fn test_reset_without_changes_is_silent() {
    let store = store_with_history(json!({"n": 0}), 5);
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe(move |_, _| hits.hit());

    store.reset();
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_reset_inside_batch_is_rejected() {
    let store = store_with_history(json!({"n": 0}), 5);
    store.dispatch(json!({"n": 1}));

    let reset = store.batch(|| {
        store.dispatch(json!({"n": 2}));
        store.reset()
    });

    assert!(!reset);
    assert_eq!(store.get_state()["n"], 2);
    let history = store.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history.cursor, 2);

    assert!(store.reset());
    assert_eq!(store.get_state(), json!({"n": 0}));
    assert_eq!(store.history().len(), 1);
    assert!(!store.can_undo());
}
