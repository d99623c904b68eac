//! Shared fixtures for integration tests.

#![allow(dead_code)]

use arbor::{StorageAdapter, StoreError, StoreOptions, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Error kinds seen by a store's error handler.
#[derive(Clone, Default)]
pub struct ErrorLog(Arc<Mutex<Vec<&'static str>>>);

impl ErrorLog {
    pub fn options(&self) -> StoreOptions {
        let log = self.clone();
        StoreOptions::new().on_error(move |err| log.0.lock().push(kind(err)))
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.0.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

fn kind(err: &StoreError) -> &'static str {
    match err {
        StoreError::Middleware { .. } => "middleware",
        StoreError::Thunk { .. } => "thunk",
        StoreError::InvalidPatch { .. } => "invalid_patch",
        StoreError::Path(_) => "path",
        StoreError::Transaction(_) => "transaction",
        StoreError::Selector(_) => "selector",
        StoreError::Destroyed { .. } => "destroyed",
    }
}

/// Counts listener invocations.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Records `(new, old)` pairs handed to a listener.
#[derive(Clone, Default)]
pub struct Calls(Arc<Mutex<Vec<(Value, Value)>>>);

impl Calls {
    pub fn listener(&self) -> impl Fn(&Value, &Value) + Send + Sync + 'static {
        let calls = self.clone();
        move |new: &Value, old: &Value| calls.0.lock().push((new.clone(), old.clone()))
    }

    pub fn all(&self) -> Vec<(Value, Value)> {
        self.0.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }
}

/// In-memory storage adapter.
#[derive(Default)]
pub struct MemoryStorage {
    pub items: Mutex<HashMap<String, Value>>,
    pub writes: AtomicUsize,
    pub fail_writes: bool,
}

impl MemoryStorage {
    pub fn with(key: &str, value: impl Into<Value>) -> Self {
        let storage = Self::default();
        storage.items.lock().insert(key.to_string(), value.into());
        storage
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn stored(&self, key: &str) -> Option<Value> {
        self.items.lock().get(key).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl StorageAdapter for MemoryStorage {
    fn get(&self, key: &str) -> Option<Value> {
        self.stored(key)
    }

    fn set(&self, key: &str, value: &Value) -> bool {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return false;
        }
        self.items.lock().insert(key.to_string(), value.clone());
        true
    }

    fn remove(&self, key: &str) {
        self.items.lock().remove(key);
    }
}
