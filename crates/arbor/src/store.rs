//! The store.
//!
//! A [`Store`] owns one state tree and funnels every mutation channel into
//! the same commit path:
//!
//! ```text
//! dispatch / update_path / transaction
//!     -> new root (unchanged branches shared)
//!     -> history entry
//!     -> plugins, persistence
//!     -> one notification pass
//! ```
//!
//! Inside a [`Store::batch`] the new root is installed immediately but the
//! last three steps are deferred until the outermost batch exits, where they
//! run once for the net change.
//!
//! No internal lock is held while user code (middleware, thunks, mutators,
//! combiners, listeners, plugins, storage adapters) runs.

use crate::action::{Action, AsyncThunk, Dispatched, SyncThunk, ThunkContext};
use crate::diff::share_unchanged;
use crate::draft::{Draft, IntoReplacement};
use crate::error::{BoxError, StateError, StoreError, TransactionError};
use crate::history::{AppliedAction, History, HistorySnapshot};
use crate::middleware::{run_chain, Middleware};
use crate::options::{ErrorHandler, StoreOptions, DEFAULT_STORE_NAME};
use crate::persist::StorageAdapter;
use crate::plugin::{HistoryChange, HistoryOperation, StorePlugin};
use crate::selector::{Input, Selector, SelectorFamily, SelectorGraph};
use crate::subscription::{Registry, SubscribeOptions, SubscriptionHandle, Watch};
use crate::value::Object;
use crate::{delete_at_path, get_at_path, set_at_path, update_at_path, Op, Path, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Default)]
struct BatchState {
    depth: usize,
    base: Option<Value>,
    actions: Vec<AppliedAction>,
}

struct Persistence {
    adapter: Arc<dyn StorageAdapter>,
    key: String,
}

pub(crate) struct StoreInner {
    pub(crate) id: u64,
    name: String,
    session_id: Uuid,
    initial: Value,
    state: Mutex<Value>,
    history: Mutex<History>,
    batch: Mutex<BatchState>,
    middleware: Vec<Arc<dyn Middleware>>,
    plugins: Vec<Arc<dyn StorePlugin>>,
    on_error: Option<ErrorHandler>,
    persistence: Option<Persistence>,
    pub(crate) graph: SelectorGraph,
    subscriptions: Registry,
    destroyed: AtomicBool,
}

impl StoreInner {
    #[inline]
    pub(crate) fn current_state(&self) -> Value {
        self.state.lock().clone()
    }

    #[inline]
    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

/// Options for [`Store::destroy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestroyOptions {
    /// Put the construction-time state back before tearing down.
    pub reset_state: bool,
    /// Remove the persisted copy of the state.
    pub clear_persisted: bool,
}

/// A reactive state container.
///
/// `Store` is a cheap handle; clones refer to the same container.
///
/// ```
/// use arbor::{create_store, StoreOptions};
/// use serde_json::json;
///
/// let store = create_store(json!({"count": 0}), StoreOptions::new().history_limit(10)).unwrap();
/// store.dispatch(json!({"count": 5}));
/// assert_eq!(store.get_state()["count"], 5);
///
/// assert!(store.undo(1));
/// assert_eq!(store.get_state()["count"], 0);
/// assert!(store.redo(1));
/// assert_eq!(store.get_state()["count"], 5);
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

/// Create a store. See [`Store::new`].
pub fn create_store(initial: impl Into<Value>, options: StoreOptions) -> Result<Store, StateError> {
    Store::new(initial, options)
}

fn validate(value: &Value, max_depth: usize) -> Result<(), StateError> {
    if !value.is_object() {
        return Err(StateError::RootNotObject {
            found: value.type_name(),
        });
    }
    let depth = value.depth();
    if depth > max_depth {
        return Err(StateError::DepthExceeded {
            depth,
            limit: max_depth,
        });
    }
    Ok(())
}

/// Merge the top-level fields of `patch` into `current`. `None` if nothing
/// would change.
fn merge_shallow(current: &Value, patch: &Object) -> Option<Value> {
    let existing = current.as_object()?;
    let mut merged: Option<Object> = None;
    for (key, value) in patch {
        let old = existing.get(key);
        let shared = match old {
            Some(old) => share_unchanged(old, value.clone()),
            None => value.clone(),
        };
        if old.is_some_and(|old| old.same(&shared)) {
            continue;
        }
        merged
            .get_or_insert_with(|| existing.clone())
            .insert(key.clone(), shared);
    }
    merged.map(Value::from)
}

impl Store {
    /// Create a store holding `initial`.
    ///
    /// The root must be an object nested no deeper than the configured
    /// `max_depth`. With persistence configured, a valid stored state
    /// replaces `initial` as the starting state; `initial` remains the
    /// target of [`Store::reset`].
    pub fn new(initial: impl Into<Value>, options: StoreOptions) -> Result<Self, StateError> {
        let initial = initial.into();
        validate(&initial, options.max_depth)?;

        let name = options
            .name
            .unwrap_or_else(|| DEFAULT_STORE_NAME.to_string());
        let persistence = match (options.storage, options.persist_key) {
            (Some(adapter), Some(key)) => Some(Persistence { adapter, key }),
            (None, Some(key)) => {
                warn!(store = %name, key = %key, "persist key set without a storage adapter");
                None
            }
            (Some(_), None) => {
                warn!(store = %name, "storage adapter set without a persist key");
                None
            }
            (None, None) => None,
        };

        let hydrated = persistence.as_ref().and_then(|p| {
            let stored = p.adapter.get(&p.key)?;
            match validate(&stored, options.max_depth) {
                Ok(()) => Some(stored),
                Err(err) => {
                    warn!(store = %name, key = %p.key, error = %err, "ignoring persisted state");
                    None
                }
            }
        });
        let state = hydrated.unwrap_or_else(|| initial.clone());

        let store = Self {
            inner: Arc::new(StoreInner {
                id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
                name,
                session_id: Uuid::new_v4(),
                history: Mutex::new(History::new(state.clone(), options.history_limit)),
                state: Mutex::new(state),
                initial,
                batch: Mutex::new(BatchState::default()),
                middleware: options.middleware,
                plugins: options.plugins,
                on_error: options.on_error,
                persistence,
                graph: SelectorGraph::default(),
                subscriptions: Registry::default(),
                destroyed: AtomicBool::new(false),
            }),
        };

        for plugin in &store.inner.plugins {
            plugin.on_store_create(&store);
        }
        debug!(
            store = %store.inner.name,
            session = %store.inner.session_id,
            "store created"
        );
        Ok(store)
    }

    /// Label given at construction.
    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Identifier unique to this store instance.
    #[inline]
    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    /// Whether [`Store::destroy`] has run.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    /// The current state snapshot.
    #[inline]
    pub fn get_state(&self) -> Value {
        self.inner.current_state()
    }

    /// Number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Number of selector nodes still referenced.
    pub fn selector_count(&self) -> usize {
        self.inner.graph.live()
    }

    /// A view limited to reads and subscriptions.
    pub fn as_read_only(&self) -> ReadOnlyStore {
        ReadOnlyStore {
            store: self.clone(),
        }
    }

    fn report(&self, err: StoreError) {
        match &self.inner.on_error {
            Some(handler) => handler(&err),
            None => error!(store = %self.inner.name, error = %err, "store operation failed"),
        }
    }

    fn ensure_alive(&self) -> bool {
        if self.is_destroyed() {
            self.report(StoreError::Destroyed {
                name: self.inner.name.clone(),
            });
            return false;
        }
        true
    }

    // ---- mutation channels ------------------------------------------------

    /// Dispatch an action.
    ///
    /// - A partial-state value runs through the middleware chain and its
    ///   top-level fields replace the matching branches of the root.
    /// - A [`Action::Thunk`] runs immediately inside an implicit batch and its
    ///   return value comes back in [`Dispatched::Completed`]. If it fails,
    ///   state rolls back to its value at thunk entry.
    /// - A [`Action::AsyncThunk`] is returned as [`Dispatched::Pending`] and
    ///   runs when awaited; its rejection is the awaited error.
    ///
    /// Failures of synchronous actions go to the error handler.
    pub fn dispatch(&self, action: impl Into<Action>) -> Dispatched {
        match action.into() {
            Action::Patch(patch) => {
                if self.ensure_alive() {
                    self.dispatch_patch(patch);
                }
                Dispatched::Completed(None)
            }
            Action::Thunk(thunk) => {
                let output = if self.ensure_alive() {
                    self.run_thunk(thunk)
                } else {
                    None
                };
                Dispatched::Completed(output)
            }
            Action::AsyncThunk(thunk) => self.dispatch_async(thunk),
        }
    }

    fn dispatch_patch(&self, patch: Value) {
        let prev = self.get_state();
        let patch = match run_chain(&self.inner.middleware, patch, &prev) {
            Ok(Some(patch)) => patch,
            Ok(None) => {
                debug!(store = %self.inner.name, "dispatch aborted by middleware");
                return;
            }
            Err(source) => {
                self.report(StoreError::Middleware { source });
                return;
            }
        };
        let Some(fields) = patch.as_object() else {
            self.report(StoreError::InvalidPatch {
                found: patch.type_name(),
            });
            return;
        };
        let swapped = {
            let mut state = self.inner.state.lock();
            merge_shallow(&state, fields).map(|next| (std::mem::replace(&mut *state, next.clone()), next))
        };
        if let Some((prev, next)) = swapped {
            self.settle(prev, next, AppliedAction::Dispatch(patch));
        }
    }

    fn run_thunk(&self, thunk: SyncThunk) -> Option<Value> {
        let ctx = ThunkContext::new(self.clone());
        let savepoint = self.get_state();
        let result = {
            let guard = BatchGuard::enter(self);
            let result = thunk(&ctx);
            if result.is_err() {
                self.inner.batch.lock().actions.truncate(guard.mark);
                *self.inner.state.lock() = savepoint;
            }
            result
        };
        match result {
            Ok(output) => output,
            Err(source) => {
                debug!(store = %self.inner.name, "thunk failed, state rolled back");
                self.report(StoreError::Thunk { source });
                None
            }
        }
    }

    fn dispatch_async(&self, thunk: AsyncThunk) -> Dispatched {
        let ctx = ThunkContext::new(self.clone());
        Dispatched::Pending(Box::pin(async move {
            let name = ctx.store().name().to_string();
            if ctx.store().is_destroyed() {
                return Err(StoreError::Destroyed { name });
            }
            thunk(ctx).await.map_err(|source| {
                debug!(store = %name, error = %source, "async thunk rejected");
                StoreError::Thunk { source }
            })
        }))
    }

    /// Replace the value at `path`. Returns whether state changed.
    ///
    /// Missing intermediates are created (objects for key segments, arrays
    /// for index segments). Writing a value equal to the current one is a
    /// no-op.
    pub fn update_path(&self, path: impl Into<Path>, value: impl Into<Value>) -> bool {
        let value = value.into();
        self.update_path_with(path, move |_| Some(value))
    }

    /// Replace the value at `path` with the result of `f`.
    ///
    /// `f` receives the current value (`None` if absent). Returning `None`
    /// deletes the key; array elements are spliced out.
    ///
    /// ```
    /// use arbor::{create_store, StoreOptions};
    /// use serde_json::json;
    ///
    /// let store = create_store(json!({}), StoreOptions::default()).unwrap();
    /// store.update_path_with(vec!["a", "b"], |_| Some(1.into()));
    /// assert_eq!(store.get_state(), json!({"a": {"b": 1}}));
    ///
    /// store.update_path_with(vec!["a", "b"], |_| None);
    /// assert_eq!(store.get_state(), json!({"a": {}}));
    /// ```
    pub fn update_path_with<F>(&self, path: impl Into<Path>, f: F) -> bool
    where
        F: FnOnce(Option<&Value>) -> Option<Value>,
    {
        if !self.ensure_alive() {
            return false;
        }
        let path = path.into();
        let current = self.get_state();
        match update_at_path(&current, &path, f) {
            Ok(Some(next)) => self.commit(next, AppliedAction::UpdatePath(path)),
            Ok(None) => false,
            Err(err) => {
                self.report(err.into());
                false
            }
        }
    }

    /// Delete the value at `path`. Returns whether state changed.
    pub fn delete_path(&self, path: impl Into<Path>) -> bool {
        self.update_path_with(path, |_| None)
    }

    /// Run `mutator` against a draft and commit the result atomically.
    ///
    /// Returning a value from the mutator replaces the state wholesale;
    /// returning `()` commits the draft. An error discards the draft and is
    /// reported; the call then returns `false`.
    pub fn transaction<F, R>(&self, mutator: F) -> bool
    where
        F: FnOnce(&mut Draft) -> Result<R, BoxError>,
        R: IntoReplacement,
    {
        if !self.ensure_alive() {
            return false;
        }
        let base = self.get_state();
        let mut draft = Draft::new(base.clone());
        let replacement = match mutator(&mut draft) {
            Ok(returned) => returned.into_replacement(),
            Err(source) => {
                debug!(store = %self.inner.name, "transaction aborted");
                self.report(TransactionError { source }.into());
                return false;
            }
        };

        let (working, mut patch) = draft.finish();
        let next = match replacement {
            Some(value) => {
                patch.push(Op::set(Path::root(), value.clone()));
                value
            }
            None => working,
        };
        if !next.is_object() {
            let source = StateError::RootNotObject {
                found: next.type_name(),
            };
            self.report(
                TransactionError {
                    source: Box::new(source),
                }
                .into(),
            );
            return false;
        }

        let next = share_unchanged(&base, next);
        if !next.same(&base) {
            self.commit(next, AppliedAction::Transaction(patch));
        }
        true
    }

    /// Run `f` with notifications deferred.
    ///
    /// Batches nest; the outermost exit runs one notification pass and
    /// records one history entry for the net change. A batch with no net
    /// change notifies nobody.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = BatchGuard::enter(self);
        f()
    }

    // ---- commit path ------------------------------------------------------

    fn commit(&self, next: Value, action: AppliedAction) -> bool {
        let prev = {
            let mut state = self.inner.state.lock();
            if state.same(&next) {
                return false;
            }
            std::mem::replace(&mut *state, next.clone())
        };
        self.settle(prev, next, action);
        true
    }

    /// Record and publish a change already installed as the current state,
    /// or defer it to the enclosing batch.
    fn settle(&self, prev: Value, next: Value, action: AppliedAction) {
        {
            let mut batch = self.inner.batch.lock();
            if batch.depth > 0 {
                batch.actions.push(action);
                return;
            }
        }
        debug!(store = %self.inner.name, action = action.kind(), "state committed");
        self.publish(&prev, &next, action, true);
    }

    /// Install `next` without recording it in history.
    fn restore(&self, next: Value, action: AppliedAction) {
        let prev = {
            let mut state = self.inner.state.lock();
            if state.same(&next) {
                return;
            }
            std::mem::replace(&mut *state, next.clone())
        };
        debug!(store = %self.inner.name, action = action.kind(), "state restored");
        self.publish(&prev, &next, action, false);
    }

    fn publish(&self, prev: &Value, next: &Value, action: AppliedAction, record: bool) {
        if record {
            self.inner.history.lock().record(next.clone(), action.clone());
        }
        for plugin in &self.inner.plugins {
            plugin.on_state_change(next, prev, &action);
        }
        if let Some(p) = &self.inner.persistence {
            if !p.adapter.set(&p.key, next) {
                warn!(store = %self.inner.name, key = %p.key, "failed to persist state");
            }
        }
        self.inner.subscriptions.notify(
            prev,
            next,
            &|| !self.inner.state.lock().same(next),
            &|err| self.report(err),
        );
    }

    fn enter_batch(&self) -> usize {
        let mut batch = self.inner.batch.lock();
        if batch.depth == 0 {
            batch.base = Some(self.inner.state.lock().clone());
            batch.actions.clear();
        }
        batch.depth += 1;
        batch.actions.len()
    }

    fn exit_batch(&self, unwinding: bool) {
        let (base, actions) = {
            let mut batch = self.inner.batch.lock();
            batch.depth = batch.depth.saturating_sub(1);
            if batch.depth > 0 {
                return;
            }
            (batch.base.take(), std::mem::take(&mut batch.actions))
        };
        let Some(base) = base else {
            return;
        };
        if unwinding {
            *self.inner.state.lock() = base;
            return;
        }

        let current = self.get_state();
        if current.same(&base) {
            return;
        }
        if current == base {
            *self.inner.state.lock() = base;
            return;
        }
        let action = AppliedAction::batched(actions);
        debug!(store = %self.inner.name, action = action.kind(), "batch committed");
        self.publish(&base, &current, action, true);
    }

    // ---- selectors --------------------------------------------------------

    /// Create a memoized selector over `inputs`.
    pub fn select<F>(&self, inputs: impl IntoIterator<Item = Input>, combiner: F) -> Selector
    where
        F: Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Selector::new(
            Arc::downgrade(&self.inner),
            self.inner.id,
            inputs.into_iter().collect(),
            Arc::new(combiner),
        )
    }

    /// Create a family of selectors parameterized by an argument value.
    ///
    /// ```
    /// use arbor::{create_store, Input, StoreOptions, Value};
    /// use serde_json::json;
    ///
    /// let store = create_store(json!({"users": {"1": "ann", "2": "bob"}}), StoreOptions::default()).unwrap();
    /// let by_id = store.select_with([Input::path("users")], |inputs, id| {
    ///     let key = id.as_str().unwrap_or_default();
    ///     Ok(inputs[0][key].clone())
    /// });
    ///
    /// assert_eq!(by_id.get("2").get().unwrap(), "bob");
    /// assert_eq!(by_id.get("2").id(), by_id.get("2").id());
    /// ```
    pub fn select_with<F>(
        &self,
        inputs: impl IntoIterator<Item = Input>,
        combiner: F,
    ) -> SelectorFamily
    where
        F: Fn(&[Value], &Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        SelectorFamily::new(&self.inner, inputs.into_iter().collect(), Arc::new(combiner))
    }

    // ---- subscriptions ----------------------------------------------------

    fn add_subscription(
        &self,
        watch: Watch,
        listener: crate::subscription::Listener,
        options: SubscribeOptions,
    ) -> SubscriptionHandle {
        if !self.ensure_alive() {
            return SubscriptionHandle::inert();
        }
        let root = self.get_state();
        match self.inner.subscriptions.add(watch, listener, options, &root) {
            Ok(handle) => handle,
            Err(err) => {
                self.report(err.into());
                SubscriptionHandle::inert()
            }
        }
    }

    fn owns(&self, selector: &Selector) -> bool {
        if selector.store_id() == self.inner.id {
            return true;
        }
        self.report(crate::SelectorError::ForeignStore { id: selector.id() }.into());
        false
    }

    /// Call `listener(new, prev)` after every committed change.
    ///
    /// If a listener commits while being notified, listeners after it skip
    /// the outer change and only see the nested one, with `prev` set to the
    /// state the outer change produced.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.add_subscription(Watch::State, Arc::new(listener), SubscribeOptions::new())
    }

    /// Call `listener(new, old)` when the output of `selector` changes.
    pub fn subscribe_to<F>(
        &self,
        selector: &Selector,
        listener: F,
        options: SubscribeOptions,
    ) -> SubscriptionHandle
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        if !self.owns(selector) {
            return SubscriptionHandle::inert();
        }
        self.add_subscription(
            Watch::Selector(selector.clone()),
            Arc::new(listener),
            options,
        )
    }

    /// Call `listener(new, old)` with the outputs of `selectors` when any
    /// of them changes.
    pub fn subscribe_to_multiple<F>(
        &self,
        selectors: &[Selector],
        listener: F,
        options: SubscribeOptions,
    ) -> SubscriptionHandle
    where
        F: Fn(&[Value], &[Value]) + Send + Sync + 'static,
    {
        if !selectors.iter().all(|selector| self.owns(selector)) {
            return SubscriptionHandle::inert();
        }
        let listener = move |new: &Value, old: &Value| {
            let new = new.as_array().map_or(&[][..], Vec::as_slice);
            let old = old.as_array().map_or(&[][..], Vec::as_slice);
            listener(new, old);
        };
        self.add_subscription(
            Watch::Selectors(selectors.to_vec()),
            Arc::new(listener),
            options,
        )
    }

    /// Call `listener(new, old)` when the value at `path` changes. Absent
    /// values are reported as `Null`.
    pub fn subscribe_to_path<F>(
        &self,
        path: impl Into<Path>,
        listener: F,
        options: SubscribeOptions,
    ) -> SubscriptionHandle
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.add_subscription(Watch::Path(path.into()), Arc::new(listener), options)
    }

    // ---- history ----------------------------------------------------------

    /// Step back `steps` entries. Returns `false` if out of range or vetoed.
    pub fn undo(&self, steps: usize) -> bool {
        self.travel(HistoryOperation::Undo, steps, None)
    }

    /// Step forward `steps` entries. Returns `false` if out of range or
    /// vetoed.
    pub fn redo(&self, steps: usize) -> bool {
        self.travel(HistoryOperation::Redo, steps, None)
    }

    /// Step back `steps` entries, restoring only the branch at `path`.
    pub fn undo_at(&self, path: impl Into<Path>, steps: usize) -> bool {
        self.travel(HistoryOperation::Undo, steps, Some(path.into()))
    }

    /// Step forward `steps` entries, restoring only the branch at `path`.
    pub fn redo_at(&self, path: impl Into<Path>, steps: usize) -> bool {
        self.travel(HistoryOperation::Redo, steps, Some(path.into()))
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        self.inner.history.lock().can_undo()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        self.inner.history.lock().can_redo()
    }

    /// A copy of the history log.
    pub fn history(&self) -> HistorySnapshot {
        self.inner.history.lock().snapshot()
    }

    fn travel(&self, operation: HistoryOperation, steps: usize, path: Option<Path>) -> bool {
        if !self.ensure_alive() {
            return false;
        }
        if self.inner.batch.lock().depth > 0 {
            warn!(store = %self.inner.name, ?operation, "history moves are not allowed inside a batch");
            return false;
        }

        let target = {
            let history = self.inner.history.lock();
            let index = match operation {
                HistoryOperation::Undo => history.undo_target(steps),
                HistoryOperation::Redo => history.redo_target(steps),
            };
            index.and_then(|i| history.entry(i).map(|entry| (i, entry.state.clone())))
        };
        let Some((index, snapshot)) = target else {
            debug!(store = %self.inner.name, ?operation, steps, "history move out of range");
            return false;
        };

        let change = HistoryChange {
            operation,
            steps,
            path: path.clone(),
        };
        if let Some(plugin) = self
            .inner
            .plugins
            .iter()
            .find(|plugin| !plugin.before_history_change(&change))
        {
            debug!(store = %self.inner.name, plugin = plugin.id(), ?operation, "history move vetoed");
            return false;
        }

        let next = match &path {
            None => snapshot,
            Some(path) => {
                let current = self.get_state();
                let restored = match get_at_path(&snapshot, path) {
                    Some(value) => set_at_path(&current, path, value.clone()),
                    None => delete_at_path(&current, path),
                };
                match restored {
                    Ok(Some(next)) => next,
                    Ok(None) => current,
                    Err(err) => {
                        self.report(err.into());
                        return false;
                    }
                }
            }
        };

        self.inner.history.lock().move_to(index);
        let action = match operation {
            HistoryOperation::Undo => AppliedAction::Undo { steps, path },
            HistoryOperation::Redo => AppliedAction::Redo { steps, path },
        };
        self.restore(next, action);
        true
    }

    /// Restore the construction-time state and discard history.
    ///
    /// Notifies only if the state actually differs. Like history moves, a
    /// reset is rejected inside a batch (including a thunk) and returns
    /// `false`.
    pub fn reset(&self) -> bool {
        if !self.ensure_alive() {
            return false;
        }
        if self.inner.batch.lock().depth > 0 {
            warn!(store = %self.inner.name, "reset is not allowed inside a batch");
            return false;
        }
        let initial = self.inner.initial.clone();
        self.inner.history.lock().reset(initial.clone());
        let prev = std::mem::replace(&mut *self.inner.state.lock(), initial.clone());
        if prev != initial {
            debug!(store = %self.inner.name, "state reset");
            self.publish(&prev, &initial, AppliedAction::Reset, false);
        }
        true
    }

    // ---- lifecycle --------------------------------------------------------

    /// Tear the store down.
    ///
    /// Runs `on_destroy` hooks, drops every subscription, releases selector
    /// caches and clears history. Later mutations are reported as
    /// [`StoreError::Destroyed`] and do nothing. Destroying twice is a no-op.
    pub fn destroy(&self, options: DestroyOptions) {
        if self.inner.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        for plugin in &self.inner.plugins {
            plugin.on_destroy(self);
        }
        self.inner.subscriptions.clear();
        self.inner.graph.release();
        if options.reset_state {
            *self.inner.state.lock() = self.inner.initial.clone();
        }
        let state = self.get_state();
        self.inner.history.lock().reset(state);
        if options.clear_persisted {
            if let Some(p) = &self.inner.persistence {
                p.adapter.remove(&p.key);
            }
        }
        debug!(store = %self.inner.name, "store destroyed");
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.inner.name)
            .field("session_id", &self.inner.session_id)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

struct BatchGuard<'a> {
    store: &'a Store,
    mark: usize,
}

impl<'a> BatchGuard<'a> {
    fn enter(store: &'a Store) -> Self {
        let mark = store.enter_batch();
        Self { store, mark }
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.store.exit_batch(std::thread::panicking());
    }
}

/// Read and subscribe access to a [`Store`].
#[derive(Clone, Debug)]
pub struct ReadOnlyStore {
    store: Store,
}

impl ReadOnlyStore {
    /// See [`Store::get_state`].
    pub fn get_state(&self) -> Value {
        self.store.get_state()
    }

    /// See [`Store::name`].
    pub fn name(&self) -> &str {
        self.store.name()
    }

    /// See [`Store::session_id`].
    pub fn session_id(&self) -> Uuid {
        self.store.session_id()
    }

    /// See [`Store::select`].
    pub fn select<F>(&self, inputs: impl IntoIterator<Item = Input>, combiner: F) -> Selector
    where
        F: Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.store.select(inputs, combiner)
    }

    /// See [`Store::select_with`].
    pub fn select_with<F>(
        &self,
        inputs: impl IntoIterator<Item = Input>,
        combiner: F,
    ) -> SelectorFamily
    where
        F: Fn(&[Value], &Value) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.store.select_with(inputs, combiner)
    }

    /// See [`Store::subscribe`].
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    /// See [`Store::subscribe_to`].
    pub fn subscribe_to<F>(
        &self,
        selector: &Selector,
        listener: F,
        options: SubscribeOptions,
    ) -> SubscriptionHandle
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.store.subscribe_to(selector, listener, options)
    }

    /// See [`Store::subscribe_to_multiple`].
    pub fn subscribe_to_multiple<F>(
        &self,
        selectors: &[Selector],
        listener: F,
        options: SubscribeOptions,
    ) -> SubscriptionHandle
    where
        F: Fn(&[Value], &[Value]) + Send + Sync + 'static,
    {
        self.store.subscribe_to_multiple(selectors, listener, options)
    }

    /// See [`Store::subscribe_to_path`].
    pub fn subscribe_to_path<F>(
        &self,
        path: impl Into<Path>,
        listener: F,
        options: SubscribeOptions,
    ) -> SubscriptionHandle
    where
        F: Fn(&Value, &Value) + Send + Sync + 'static,
    {
        self.store.subscribe_to_path(path, listener, options)
    }

    /// See [`Store::history`].
    pub fn history(&self) -> HistorySnapshot {
        self.store.history()
    }

    /// See [`Store::can_undo`].
    pub fn can_undo(&self) -> bool {
        self.store.can_undo()
    }

    /// See [`Store::can_redo`].
    pub fn can_redo(&self) -> bool {
        self.store.can_redo()
    }
}
