//! Dispatchable actions.

use crate::error::{BoxError, StoreError};
use crate::{Store, Value};
use futures::future::BoxFuture;
use std::fmt;
use std::future::{Future, IntoFuture};

pub(crate) type ThunkResult = Result<Option<Value>, BoxError>;
pub(crate) type SyncThunk = Box<dyn FnOnce(&ThunkContext) -> ThunkResult + Send>;
pub(crate) type AsyncThunk = Box<dyn FnOnce(ThunkContext) -> BoxFuture<'static, ThunkResult> + Send>;

/// Values a thunk may return to its dispatcher.
///
/// `()` returns nothing; a value is handed back through [`Dispatched`].
pub trait IntoThunkOutput {
    /// The value handed back, if any.
    fn into_output(self) -> Option<Value>;
}

impl IntoThunkOutput for () {
    fn into_output(self) -> Option<Value> {
        None
    }
}

impl IntoThunkOutput for Value {
    fn into_output(self) -> Option<Value> {
        Some(self)
    }
}

impl IntoThunkOutput for Option<Value> {
    fn into_output(self) -> Option<Value> {
        self
    }
}

impl IntoThunkOutput for serde_json::Value {
    fn into_output(self) -> Option<Value> {
        Some(Value::from(self))
    }
}

/// Input to [`Store::dispatch`].
pub enum Action {
    /// Fields to apply to the root object.
    Patch(Value),
    /// Synchronous logic that may dispatch any number of times.
    Thunk(SyncThunk),
    /// Logic that may suspend between dispatches.
    AsyncThunk(AsyncThunk),
}

impl Action {
    /// A partial-state action.
    pub fn patch(value: impl Into<Value>) -> Self {
        Action::Patch(value.into())
    }

    /// A synchronous thunk. Its return value comes back from
    /// [`Store::dispatch`] as [`Dispatched::Completed`].
    ///
    /// ```
    /// use arbor::{create_store, Action, StoreOptions};
    /// use serde_json::json;
    ///
    /// let store = create_store(json!({"n": 0}), StoreOptions::default()).unwrap();
    /// let done = store.dispatch(Action::thunk(|ctx| {
    ///     let n = ctx.get_state()["n"].as_i64().unwrap_or(0);
    ///     ctx.dispatch(json!({ "n": n + 1 }));
    ///     Ok(json!(n + 1))
    /// }));
    /// assert_eq!(store.get_state()["n"], 1);
    /// assert_eq!(done.into_value().unwrap(), 1);
    /// ```
    pub fn thunk<F, T>(f: F) -> Self
    where
        F: FnOnce(&ThunkContext) -> Result<T, BoxError> + Send + 'static,
        T: IntoThunkOutput,
    {
        Action::Thunk(Box::new(move |ctx| f(ctx).map(IntoThunkOutput::into_output)))
    }

    /// An asynchronous thunk. It runs when the returned [`Dispatched`] is
    /// awaited.
    pub fn async_thunk<F, Fut, T>(f: F) -> Self
    where
        F: FnOnce(ThunkContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
        T: IntoThunkOutput + 'static,
    {
        Action::AsyncThunk(Box::new(move |ctx| {
            Box::pin(async move { f(ctx).await.map(IntoThunkOutput::into_output) })
        }))
    }

    /// Short name of the action kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Patch(_) => "patch",
            Action::Thunk(_) => "thunk",
            Action::AsyncThunk(_) => "async_thunk",
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Patch(value) => f.debug_tuple("Patch").field(value).finish(),
            Action::Thunk(_) => f.write_str("Thunk(..)"),
            Action::AsyncThunk(_) => f.write_str("AsyncThunk(..)"),
        }
    }
}

impl From<Value> for Action {
    fn from(value: Value) -> Self {
        Action::Patch(value)
    }
}

impl From<serde_json::Value> for Action {
    fn from(value: serde_json::Value) -> Self {
        Action::Patch(Value::from(value))
    }
}

/// Store access handed to thunks.
#[derive(Clone)]
pub struct ThunkContext {
    store: Store,
}

impl ThunkContext {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Dispatch through the same pipeline as [`Store::dispatch`].
    pub fn dispatch(&self, action: impl Into<Action>) -> Dispatched {
        self.store.dispatch(action)
    }

    /// Current state snapshot.
    pub fn get_state(&self) -> Value {
        self.store.get_state()
    }

    /// The store the thunk was dispatched on.
    pub fn store(&self) -> &Store {
        &self.store
    }
}

impl fmt::Debug for ThunkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThunkContext")
            .field("store", &self.store.name())
            .finish()
    }
}

/// Outcome of [`Store::dispatch`].
///
/// Synchronous actions have already run when `dispatch` returns, and a
/// successful thunk's return value is carried in `Completed`. An async
/// thunk is returned pending and runs when awaited; the awaited result
/// carries its return value or its rejection.
pub enum Dispatched {
    /// The action ran synchronously.
    Completed(Option<Value>),
    /// An async thunk waiting to be driven.
    Pending(BoxFuture<'static, Result<Option<Value>, StoreError>>),
}

impl Dispatched {
    /// True for an async thunk that has not been awaited.
    pub fn is_pending(&self) -> bool {
        matches!(self, Dispatched::Pending(_))
    }

    /// Value returned by a synchronous thunk.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Dispatched::Completed(value) => value.as_ref(),
            Dispatched::Pending(_) => None,
        }
    }

    /// Take the value returned by a synchronous thunk.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Dispatched::Completed(value) => value,
            Dispatched::Pending(_) => None,
        }
    }
}

impl fmt::Debug for Dispatched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatched::Completed(value) => f.debug_tuple("Completed").field(value).finish(),
            Dispatched::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

impl IntoFuture for Dispatched {
    type Output = Result<Option<Value>, StoreError>;
    type IntoFuture = BoxFuture<'static, Result<Option<Value>, StoreError>>;

    fn into_future(self) -> Self::IntoFuture {
        match self {
            Dispatched::Completed(value) => Box::pin(futures::future::ready(Ok(value))),
            Dispatched::Pending(fut) => fut,
        }
    }
}
