//! Store plugins.
//!
//! Plugins observe the store lifecycle through a fixed set of hooks. Every
//! hook has a default no-op implementation, so a plugin only overrides the
//! ones it needs. Plugins run in registration order.
//!
//! # Example
//!
//! ```
//! use arbor::{create_store, AppliedAction, HistoryChange, StoreOptions, StorePlugin, Value};
//! use serde_json::json;
//!
//! struct NoUndo;
//!
//! impl StorePlugin for NoUndo {
//!     fn id(&self) -> &str {
//!         "no_undo"
//!     }
//!
//!     fn before_history_change(&self, _change: &HistoryChange) -> bool {
//!         false
//!     }
//! }
//!
//! let store = create_store(
//!     json!({"n": 0}),
//!     StoreOptions::new().history_limit(10).plugin(NoUndo),
//! )
//! .unwrap();
//! store.dispatch(json!({"n": 1}));
//! assert!(!store.undo(1));
//! assert_eq!(store.get_state()["n"], 1);
//! ```

use crate::{AppliedAction, Path, Store, Value};

/// Direction of a history move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum HistoryOperation {
    /// Move the cursor back.
    Undo,
    /// Move the cursor forward.
    Redo,
}

/// A pending history move, offered to plugins before it happens.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryChange {
    /// Direction.
    pub operation: HistoryOperation,
    /// Number of entries to move.
    pub steps: usize,
    /// Branch to restore, if scoped.
    pub path: Option<Path>,
}

/// Lifecycle hooks for extending a store.
pub trait StorePlugin: Send + Sync {
    /// Plugin identifier for logging and debugging.
    fn id(&self) -> &str;

    /// Called once after the store is constructed.
    fn on_store_create(&self, _store: &Store) {}

    /// Called after each committed change, before listeners run.
    fn on_state_change(&self, _new: &Value, _prev: &Value, _action: &AppliedAction) {}

    /// Called before an undo or redo. Returning `false` vetoes it.
    fn before_history_change(&self, _change: &HistoryChange) -> bool {
        true
    }

    /// Called once when the store is destroyed.
    fn on_destroy(&self, _store: &Store) {}
}
