//! Integration tests for asynchronous thunks.

mod common;

use arbor::{create_store, Action, DestroyOptions, StoreError, StoreOptions};
use common::{Counter, ErrorLog};
use serde_json::json;
use std::future::IntoFuture;
use std::time::Duration;

#[tokio::test]
async fn test_async_thunk_commits_each_dispatch() {
    let store = create_store(json!({"loading": false}), StoreOptions::default()).unwrap();
    let calls = Counter::default();
    let hits = calls.clone();
    store.subscribe(move |_, _| hits.hit());

    store
        .dispatch(Action::async_thunk(|ctx| async move {
            ctx.dispatch(json!({"loading": true}));
            tokio::time::sleep(Duration::from_millis(5)).await;
            ctx.dispatch(json!({"loading": false, "data": [1, 2]}));
            Ok(())
        }))
        .await
        .unwrap();

    assert_eq!(store.get_state(), json!({"loading": false, "data": [1, 2]}));
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn test_async_thunk_runs_when_awaited() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let pending = store.dispatch(Action::async_thunk(|ctx| async move {
        ctx.dispatch(json!({"n": 1}));
        Ok(())
    }));

    assert!(pending.is_pending());
    assert_eq!(store.get_state()["n"], 0);

    pending.await.unwrap();
    assert_eq!(store.get_state()["n"], 1);
}

#[tokio::test]
async fn test_rejection_propagates_and_keeps_earlier_commits() {
    let errors = ErrorLog::default();
    let store = create_store(json!({"step": 0}), errors.options()).unwrap();

    let result = store
        .dispatch(Action::async_thunk(|ctx| async move {
            ctx.dispatch(json!({"step": 1}));
            tokio::task::yield_now().await;
            Err::<(), _>(arbor::BoxError::from("network down"))
        }))
        .await;

    assert!(matches!(result, Err(StoreError::Thunk { .. })));
    assert_eq!(store.get_state()["step"], 1);
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_async_thunk_on_destroyed_store() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let pending = store.dispatch(Action::async_thunk(|ctx| async move {
        ctx.dispatch(json!({"n": 1}));
        Ok(())
    }));
    store.destroy(DestroyOptions::default());

    let result = pending.await;
    assert!(matches!(result, Err(StoreError::Destroyed { .. })));
    assert_eq!(store.get_state()["n"], 0);
}

#[tokio::test]
async fn test_late_dispatch_after_destroy_is_dropped() {
    let errors = ErrorLog::default();
    let store = create_store(json!({"n": 0}), errors.options()).unwrap();
    let inner = store.clone();

    store
        .dispatch(Action::async_thunk(move |ctx| async move {
            ctx.dispatch(json!({"n": 1}));
            inner.destroy(DestroyOptions::default());
            ctx.dispatch(json!({"n": 2}));
            Ok(())
        }))
        .await
        .unwrap();

    assert_eq!(store.get_state()["n"], 1);
    assert_eq!(errors.kinds(), vec!["destroyed"]);
}

#[tokio::test]
async fn test_sync_thunk_can_start_async_work() {
    let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    let slot = std::sync::Arc::new(parking_lot::Mutex::new(None));
    let keep = slot.clone();

    store.dispatch(Action::thunk(move |ctx| {
        ctx.dispatch(json!({"n": 1}));
        *keep.lock() = Some(ctx.dispatch(Action::async_thunk(|ctx| async move {
            ctx.dispatch(json!({"n": 2}));
            Ok(())
        })));
        Ok(())
    }));
    assert_eq!(store.get_state()["n"], 1);

    let pending = slot.lock().take().unwrap();
    pending.await.unwrap();
    assert_eq!(store.get_state()["n"], 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_thunks_on_worker_threads() {
    let store = create_store(json!({"a": 0, "b": 0}), StoreOptions::default()).unwrap();

    let first = tokio::spawn(store.dispatch(Action::async_thunk(|ctx| async move {
        ctx.dispatch(json!({"a": 1}));
        Ok(())
    })).into_future());
    let second = tokio::spawn(store.dispatch(Action::async_thunk(|ctx| async move {
        ctx.dispatch(json!({"b": 1}));
        Ok(())
    })).into_future());

    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let state = store.get_state();
    assert_eq!(state["a"], 1);
    assert_eq!(state["b"], 1);
}
