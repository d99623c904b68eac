//! In-process reactive state tree.
//!
//! `arbor` holds one application state tree and lets many independent parts
//! of a program read it, change it and react to changes without coordinating
//! with each other.
//!
//! # Core Concepts
//!
//! - **Value**: Immutable tree with shared branches; unchanged subtrees keep
//!   their reference across commits, so identity checks are cheap.
//! - **Store**: Owns the tree and funnels every change through one commit
//!   path (history, plugins, persistence, notifications).
//! - **Draft**: Scratch copy handed to [`Store::transaction`]; its edits are
//!   committed all at once or not at all.
//! - **Selector**: Memoized derived view; recomputes only when its inputs
//!   change by reference.
//! - **Subscription**: Listener on the whole state, a selector or a path.
//! - **History**: Bounded undo/redo log, optionally scoped to a branch.
//!
//! # Quick Start
//!
//! ```
//! use arbor::{create_store, Input, StoreOptions, SubscribeOptions, Value};
//! use serde_json::json;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let store = create_store(
//!     json!({"todos": [], "filter": "all"}),
//!     StoreOptions::new().history_limit(20),
//! )
//! .unwrap();
//!
//! let count = store.select([Input::path("todos")], |inputs| Ok(Value::from(inputs[0].len())));
//!
//! let calls = Arc::new(AtomicUsize::new(0));
//! let seen = calls.clone();
//! store.subscribe_to(&count, move |_, _| { seen.fetch_add(1, Ordering::SeqCst); }, SubscribeOptions::new());
//!
//! store.transaction(|draft| {
//!     draft.push("todos", json!({"title": "write docs"}))?;
//!     Ok(())
//! });
//! store.dispatch(json!({"filter": "done"}));
//!
//! assert_eq!(count.get().unwrap(), 1);
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//!
//! store.undo(2);
//! assert_eq!(store.get_state(), json!({"todos": [], "filter": "all"}));
//! ```
//!
//! # Sharing
//!
//! ```text
//! old root ──┬── todos      (replaced)
//!            └── settings ──┐
//! new root ──┬── todos'     │ same reference
//!            └──────────────┘
//! ```
//!
//! Every write path (`dispatch`, `update_path`, `transaction`) produces a new
//! root that reuses every branch it did not touch, and a branch that was
//! rewritten but ends up structurally equal keeps its old reference.

pub mod action;
pub mod apply;
pub mod diff;
pub mod draft;
pub mod error;
pub mod history;
pub mod middleware;
pub mod op;
pub mod options;
pub mod patch;
pub mod path;
pub mod persist;
pub mod plugin;
pub mod selector;
pub mod store;
pub mod subscription;
pub mod value;

pub use action::{Action, Dispatched, IntoThunkOutput, ThunkContext};
pub use apply::{
    apply_patch, delete_at_path, get_at_path, set_at_path, update_at_path, MAX_ARRAY_PADDING,
};
pub use diff::{diff, share_unchanged, Diff};
pub use draft::{Draft, IntoReplacement};
pub use error::{
    BoxError, PathError, SelectorError, StateError, StoreError, StoreResult, TransactionError,
};
pub use history::{AppliedAction, HistoryEntry, HistorySnapshot};
pub use middleware::{middleware_fn, FnMiddleware, Middleware, Next};
pub use op::Op;
pub use options::{ErrorHandler, StoreConfig, StoreOptions, DEFAULT_MAX_DEPTH, DEFAULT_STORE_NAME};
pub use patch::Patch;
pub use path::{Path, Seg};
pub use persist::StorageAdapter;
pub use plugin::{HistoryChange, HistoryOperation, StorePlugin};
pub use selector::{Input, Selector, SelectorFamily};
pub use store::{create_store, DestroyOptions, ReadOnlyStore, Store};
pub use subscription::{SubscribeOptions, SubscriptionHandle};
pub use value::{Key, Map, Number, Object, Set, Value};
