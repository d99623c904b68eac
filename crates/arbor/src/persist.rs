//! Persistence adapter contract.
//!
//! The store only consumes this trait; adapters for concrete storage live
//! outside the crate.

use crate::Value;

/// Key/value storage for persisted state.
///
/// Implementations absorb their own failures: `get` returns `None`, `set`
/// returns `false`. None of the methods may panic.
pub trait StorageAdapter: Send + Sync {
    /// Load the value stored under `key`.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`. Returns whether the write succeeded.
    fn set(&self, key: &str, value: &Value) -> bool;

    /// Remove the value stored under `key`.
    fn remove(&self, key: &str);
}
