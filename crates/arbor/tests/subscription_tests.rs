//! Integration tests for subscriptions, batching and debouncing.

mod common;

use arbor::{create_store, DestroyOptions, Input, StoreOptions, SubscribeOptions, SubscriptionHandle, Value};
use common::{Calls, Counter, ErrorLog};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Whole-state subscriptions
// ============================================================================

#[test]
fn test_subscribe_receives_new_and_prev() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Calls::default();
    store.subscribe(calls.listener());

    store.dispatch(json!({"n": 1}));
    assert_eq!(
        calls.all(),
        vec![(Value::from(json!({"n": 1})), Value::from(json!({"n": 0})))]
    );
}

#[test]
fn test_listeners_run_in_registration_order() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));
    for id in 0..3 {
        let order = order.clone();
        store.subscribe(move |_, _| order.lock().push(id));
    }
    store.dispatch(json!({"n": 1}));
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[test]
fn test_unsubscribe_is_idempotent() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    let handle = store.subscribe(move |_, _| hits.hit());
    assert_eq!(store.subscriber_count(), 1);

    handle.unsubscribe();
    handle.unsubscribe();
    store.dispatch(json!({"n": 1}));

    assert!(!handle.is_active());
    assert_eq!(store.subscriber_count(), 0);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_dropping_handle_keeps_subscription() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    drop(store.subscribe(move |_, _| hits.hit()));

    store.dispatch(json!({"n": 1}));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_listener_added_during_pass_waits_for_next_pass() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let late = Counter::default();
    let added = Arc::new(Mutex::new(false));

    let inner_store = store.clone();
    let late_hits = late.clone();
    store.subscribe(move |_, _| {
        let mut added = added.lock();
        if !*added {
            *added = true;
            let hits = late_hits.clone();
            inner_store.subscribe(move |_, _| hits.hit());
        }
    });

    store.dispatch(json!({"n": 1}));
    assert_eq!(late.get(), 0);
    store.dispatch(json!({"n": 2}));
    assert_eq!(late.get(), 1);
}

#[test]
fn test_listener_removed_during_pass_is_skipped() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let victim: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::default();
    let victim_calls = Counter::default();

    let target = victim.clone();
    store.subscribe(move |_, _| {
        if let Some(handle) = target.lock().as_ref() {
            handle.unsubscribe();
        }
    });
    let hits = victim_calls.clone();
    *victim.lock() = Some(store.subscribe(move |_, _| hits.hit()));

    store.dispatch(json!({"n": 1}));
    assert_eq!(victim_calls.get(), 0);
}

#[test]
fn test_nested_commit_supersedes_outer_pass() {
    let store = create_store(json!({"a": 0}), StoreOptions::default()).unwrap();
    let inner_store = store.clone();
    store.subscribe(move |new, _| {
        if new["a"] == 1 && new["b"].is_null() {
            inner_store.dispatch(json!({"b": 1}));
        }
    });
    let calls = Calls::default();
    store.subscribe(calls.listener());

    store.dispatch(json!({"a": 1}));
    assert_eq!(
        calls.all(),
        vec![(Value::from(json!({"a": 1, "b": 1})), Value::from(json!({"a": 1})))]
    );
}

// ============================================================================
// Selector subscriptions
// ============================================================================

#[test]
fn test_selector_subscription_fires_only_on_output_change() {
    let store = create_store(json!({"items": [1, 2], "other": 0}), StoreOptions::default()).unwrap();
    let count = store.select([Input::path("items")], |inputs| Ok(Value::from(inputs[0].len())));
    let calls = Calls::default();
    store.subscribe_to(&count, calls.listener(), SubscribeOptions::new());

    store.dispatch(json!({"other": 1}));
    store.update_path("items.0", 10);
    assert_eq!(calls.len(), 0);

    store.update_path("items.2", 3);
    assert_eq!(calls.all(), vec![(Value::from(3), Value::from(2))]);
}

#[test]
fn test_immediate_subscription_fires_on_registration() {
    let store = create_store(json!({"n": 4}), StoreOptions::default()).unwrap();
    let n = store.select([Input::path("n")], |inputs| Ok(inputs[0].clone()));
    let calls = Calls::default();
    store.subscribe_to(&n, calls.listener(), SubscribeOptions::new().immediate(true));
    assert_eq!(calls.all(), vec![(Value::from(4), Value::from(4))]);
}

#[test]
fn test_custom_equality_suppresses_notifications() {
    let store = create_store(json!({"user": {"id": 1, "seen": 0}}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe_to_path(
        "user",
        move |_, _| hits.hit(),
        SubscribeOptions::new().equality(|a, b| a["id"] == b["id"]),
    );

    store.update_path("user.seen", 1);
    assert_eq!(calls.get(), 0);
    store.update_path("user.id", 2);
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_multiple_selectors_deliver_slices() {
    let store = create_store(json!({"a": 1, "b": 2, "c": 3}), StoreOptions::default()).unwrap();
    let a = store.select([Input::path("a")], |inputs| Ok(inputs[0].clone()));
    let b = store.select([Input::path("b")], |inputs| Ok(inputs[0].clone()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe_to_multiple(
        &[a, b],
        move |new: &[Value], old: &[Value]| sink.lock().push((new.to_vec(), old.to_vec())),
        SubscribeOptions::new(),
    );

    store.dispatch(json!({"c": 30}));
    assert!(seen.lock().is_empty());

    store.dispatch(json!({"b": 20}));
    assert_eq!(
        *seen.lock(),
        vec![(
            vec![Value::from(1), Value::from(20)],
            vec![Value::from(1), Value::from(2)]
        )]
    );
}

#[test]
fn test_multiple_selectors_use_member_equality() {
    let store = create_store(json!({"a": 1.0, "b": 2}), StoreOptions::default()).unwrap();
    let a = store.select([Input::path("a")], |inputs| Ok(inputs[0].clone()));
    let b = store.select([Input::path("b")], |inputs| Ok(inputs[0].clone()));
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe_to_multiple(
        &[a, b],
        move |_: &[Value], _: &[Value]| hits.hit(),
        SubscribeOptions::new().equality(|x, y| {
            match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() < 0.5,
                _ => x == y,
            }
        }),
    );

    store.dispatch(json!({"a": 1.2}));
    assert_eq!(calls.get(), 0);
    store.dispatch(json!({"a": 2.0}));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_foreign_selector_is_rejected() {
    let errors = ErrorLog::default();
    let other = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let store = create_store(json!({"n": 0}), errors.options()).unwrap();
    let foreign = other.select([Input::path("n")], |inputs| Ok(inputs[0].clone()));

    let handle = store.subscribe_to(&foreign, |_, _| {}, SubscribeOptions::new());
    assert!(!handle.is_active());
    assert_eq!(errors.kinds(), vec!["selector"]);
    assert_eq!(store.subscriber_count(), 0);
}

#[test]
fn test_selector_error_during_notification_is_reported() {
    let errors = ErrorLog::default();
    let store = create_store(json!({"n": 1}), errors.options()).unwrap();
    let positive = store.select([Input::path("n")], |inputs| {
        if inputs[0].as_i64().unwrap_or(0) < 0 {
            return Err("negative".into());
        }
        Ok(inputs[0].clone())
    });
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe_to(&positive, move |_, _| hits.hit(), SubscribeOptions::new());

    store.dispatch(json!({"n": -1}));
    assert_eq!(errors.kinds(), vec!["selector"]);
    assert_eq!(calls.get(), 0);
    assert_eq!(store.get_state()["n"], -1);
}

// ============================================================================
// Path subscriptions
// ============================================================================

#[test]
fn test_path_subscription_reports_absent_as_null() {
    let store = create_store(json!({}), StoreOptions::default()).unwrap();
    let calls = Calls::default();
    store.subscribe_to_path(vec!["a", "b"], calls.listener(), SubscribeOptions::new());

    store.update_path("a.b", 1);
    store.delete_path("a.b");
    assert_eq!(
        calls.all(),
        vec![
            (Value::from(1), Value::Null),
            (Value::Null, Value::from(1)),
        ]
    );
}

#[test]
fn test_path_subscription_ignores_siblings() {
    let store = create_store(json!({"a": {"x": 1, "y": 1}}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe_to_path("a.x", move |_, _| hits.hit(), SubscribeOptions::new());

    store.update_path("a.y", 2);
    store.dispatch(json!({"b": true}));
    assert_eq!(calls.get(), 0);

    store.update_path("a", json!({"x": 5}));
    assert_eq!(calls.get(), 1);
}

// ============================================================================
// Batching
// ============================================================================

#[test]
fn test_batch_notifies_once() {
    let store = create_store(json!({"n": 0}), StoreOptions::new().history_limit(10)).unwrap();
    let calls = Calls::default();
    store.subscribe(calls.listener());

    store.batch(|| {
        for n in 1..=5 {
            store.dispatch(json!({ "n": n }));
        }
        store.update_path("done", true);
    });

    assert_eq!(
        calls.all(),
        vec![(
            Value::from(json!({"n": 5, "done": true})),
            Value::from(json!({"n": 0}))
        )]
    );
    assert_eq!(store.history().len(), 2);
}

#[test]
fn test_empty_batch_notifies_nobody() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe(move |_, _| hits.hit());

    let value = store.batch(|| 7);
    assert_eq!(value, 7);
    assert_eq!(calls.get(), 0);
}

#[test]
fn test_batch_with_no_net_change_is_silent() {
    let store = create_store(json!({"n": 0}), StoreOptions::new().history_limit(5)).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe(move |_, _| hits.hit());
    let before = store.get_state();

    store.batch(|| {
        store.dispatch(json!({"n": 1}));
        store.dispatch(json!({"n": 0}));
    });

    assert_eq!(calls.get(), 0);
    assert!(store.get_state().same(&before));
    assert!(!store.can_undo());
}

#[test]
fn test_nested_batches_flush_at_outermost_exit() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe(move |_, _| hits.hit());

    store.batch(|| {
        store.batch(|| {
            store.dispatch(json!({"n": 1}));
        });
        assert_eq!(calls.get(), 0);
        assert_eq!(store.get_state()["n"], 1);
        store.dispatch(json!({"n": 2}));
    });
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_panicking_batch_rolls_back() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe(move |_, _| hits.hit());

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        store.batch(|| {
            store.dispatch(json!({"n": 1}));
            panic!("abort batch");
        })
    }));

    assert!(result.is_err());
    assert_eq!(store.get_state(), json!({"n": 0}));
    assert_eq!(calls.get(), 0);

    store.dispatch(json!({"n": 2}));
    assert_eq!(calls.get(), 1);
}

// ============================================================================
// Debounce
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_debounce_coalesces_changes() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Calls::default();
    store.subscribe_to_path(
        "n",
        calls.listener(),
        SubscribeOptions::new().debounce(Duration::from_millis(50)),
    );

    store.dispatch(json!({"n": 1}));
    store.dispatch(json!({"n": 2}));
    store.dispatch(json!({"n": 3}));
    assert_eq!(calls.len(), 0);

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(calls.all(), vec![(Value::from(3), Value::from(0))]);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_skips_changes_that_settle_back() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe_to_path(
        "n",
        move |_, _| hits.hit(),
        SubscribeOptions::new().debounce(Duration::from_millis(50)),
    );

    store.dispatch(json!({"n": 1}));
    store.dispatch(json!({"n": 0}));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(calls.get(), 0);

    store.dispatch(json!({"n": 5}));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(calls.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_applies_to_joint_selector_tuple() {
    let store = create_store(json!({"a": 1, "b": 2}), StoreOptions::default()).unwrap();
    let a = store.select([Input::path("a")], |inputs| Ok(inputs[0].clone()));
    let b = store.select([Input::path("b")], |inputs| Ok(inputs[0].clone()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    store.subscribe_to_multiple(
        &[a, b],
        move |new: &[Value], old: &[Value]| sink.lock().push((new.to_vec(), old.to_vec())),
        SubscribeOptions::new().debounce(Duration::from_millis(50)),
    );

    store.dispatch(json!({"a": 2}));
    tokio::time::sleep(Duration::from_millis(10)).await;
    store.dispatch(json!({"b": 20}));
    store.dispatch(json!({"a": 3}));
    assert!(seen.lock().is_empty());

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(
        *seen.lock(),
        vec![(
            vec![Value::from(3), Value::from(20)],
            vec![Value::from(1), Value::from(2)]
        )]
    );
}

#[test]
fn test_debounce_without_runtime_fires_immediately() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe_to_path(
        "n",
        move |_, _| hits.hit(),
        SubscribeOptions::new().debounce(Duration::from_millis(50)),
    );
    store.dispatch(json!({"n": 1}));
    assert_eq!(calls.get(), 1);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_destroy_drops_subscriptions() {
    let errors = ErrorLog::default();
    let store = create_store(json!({"n": 0}), errors.options()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    let handle = store.subscribe(move |_, _| hits.hit());

    store.destroy(DestroyOptions::default());
    assert!(!handle.is_active());
    assert_eq!(store.subscriber_count(), 0);

    let late = store.subscribe(|_, _| {});
    assert!(!late.is_active());
    assert_eq!(errors.kinds(), vec!["destroyed"]);
}

#[test]
fn test_read_only_view_can_subscribe() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let view = store.as_read_only();
    let calls = Counter::default();
    let hits = calls.clone();
    view.subscribe_to_path("n", move |_, _| hits.hit(), SubscribeOptions::new());

    store.dispatch(json!({"n": 1}));
    assert_eq!(calls.get(), 1);
}
