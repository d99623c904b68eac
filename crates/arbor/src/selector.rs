//! Memoized derived views.
//!
//! A [`Selector`] combines one or more inputs with a combiner function.
//! Evaluation is memoized at three levels:
//!
//! 1. If the state root is the same reference as on the previous call, the
//!    cached output is returned without touching the inputs.
//! 2. Otherwise the inputs are resolved (upstream selectors first). If every
//!    input is the same reference as the cached one, the cached output is
//!    returned without running the combiner.
//! 3. Otherwise the combiner runs once. If its result is structurally equal
//!    to the previous output, the previous reference is kept, so downstream
//!    selectors and subscriptions see an unchanged input.
//!
//! Selectors hold their store weakly. Once the store is destroyed or dropped,
//! [`Selector::get`] fails with [`SelectorError::StoreDestroyed`].

use crate::error::{BoxError, SelectorError};
use crate::store::StoreInner;
use crate::{get_at_path, Path, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

static NEXT_SELECTOR_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) type Combiner = Arc<dyn Fn(&[Value]) -> Result<Value, BoxError> + Send + Sync>;
type FamilyCombiner = Arc<dyn Fn(&[Value], &Value) -> Result<Value, BoxError> + Send + Sync>;
type InputFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// One input of a selector.
#[derive(Clone)]
pub enum Input {
    /// The value at a path; absent values read as `Null`.
    Path(Path),
    /// The output of another selector on the same store.
    Selector(Selector),
    /// An arbitrary projection of the root.
    Fn(InputFn),
}

impl Input {
    /// Read the value at `path`.
    pub fn path(path: impl Into<Path>) -> Self {
        Input::Path(path.into())
    }

    /// Compose with an upstream selector.
    pub fn selector(selector: &Selector) -> Self {
        Input::Selector(selector.clone())
    }

    /// Project the root with `f`.
    ///
    /// `f` should return references into the tree (clones of existing
    /// branches) rather than fresh containers, or the input never compares
    /// as unchanged.
    pub fn func<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        Input::Fn(Arc::new(f))
    }

    fn resolve(&self, root: &Value, store_id: u64) -> Result<Value, SelectorError> {
        match self {
            Input::Path(path) => Ok(get_at_path(root, path).cloned().unwrap_or(Value::Null)),
            Input::Selector(upstream) => {
                if upstream.node.store_id != store_id {
                    return Err(SelectorError::ForeignStore {
                        id: upstream.node.id,
                    });
                }
                upstream.node.evaluate(root)
            }
            Input::Fn(f) => Ok(f(root)),
        }
    }
}

impl From<&Selector> for Input {
    fn from(selector: &Selector) -> Self {
        Input::selector(selector)
    }
}

impl From<Selector> for Input {
    fn from(selector: Selector) -> Self {
        Input::Selector(selector)
    }
}

impl From<Path> for Input {
    fn from(path: Path) -> Self {
        Input::Path(path)
    }
}

impl From<&str> for Input {
    fn from(path: &str) -> Self {
        Input::path(path)
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Input::Selector(selector) => f.debug_tuple("Selector").field(&selector.id()).finish(),
            Input::Fn(_) => f.write_str("Fn(..)"),
        }
    }
}

struct Memo {
    root: Value,
    inputs: Vec<Value>,
    output: Value,
}

pub(crate) struct SelectorNode {
    id: u64,
    store_id: u64,
    store: Weak<StoreInner>,
    inputs: Vec<Input>,
    combiner: Combiner,
    memo: Mutex<Option<Memo>>,
    recomputations: AtomicUsize,
}

impl SelectorNode {
    fn evaluate(&self, root: &Value) -> Result<Value, SelectorError> {
        if let Some(memo) = self.memo.lock().as_ref() {
            if memo.root.same(root) {
                return Ok(memo.output.clone());
            }
        }

        let inputs = self
            .inputs
            .iter()
            .map(|input| input.resolve(root, self.store_id))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(memo) = self.memo.lock().as_mut() {
            let unchanged = memo.inputs.len() == inputs.len()
                && memo.inputs.iter().zip(&inputs).all(|(a, b)| a.same(b));
            if unchanged {
                memo.root = root.clone();
                return Ok(memo.output.clone());
            }
        }

        let computed = (self.combiner)(&inputs).map_err(|source| SelectorError::Compute {
            id: self.id,
            source,
        })?;
        let runs = self.recomputations.fetch_add(1, Ordering::Relaxed) + 1;

        let mut memo = self.memo.lock();
        let output = match memo.as_ref() {
            Some(previous) if previous.output == computed => previous.output.clone(),
            _ => computed,
        };
        trace!(selector = self.id, recomputations = runs, "selector recomputed");
        *memo = Some(Memo {
            root: root.clone(),
            inputs,
            output: output.clone(),
        });
        Ok(output)
    }

    fn clear(&self) {
        *self.memo.lock() = None;
    }
}

/// A memoized derived view bound to one store.
///
/// Cloning a selector shares its cache.
///
/// ```
/// use arbor::{create_store, Input, StoreOptions, Value};
/// use serde_json::json;
///
/// let store = create_store(json!({"todos": [{"done": true}, {"done": false}]}), StoreOptions::default()).unwrap();
/// let done = store.select([Input::path("todos")], |inputs| {
///     let count = inputs[0]
///         .as_array()
///         .map_or(0, |todos| todos.iter().filter(|t| t["done"] == true).count());
///     Ok(Value::from(count))
/// });
///
/// assert_eq!(done.get().unwrap(), 1);
/// assert_eq!(done.get().unwrap(), 1);
/// assert_eq!(done.recomputations(), 1);
/// ```
#[derive(Clone)]
pub struct Selector {
    node: Arc<SelectorNode>,
}

impl Selector {
    pub(crate) fn new(
        store: Weak<StoreInner>,
        store_id: u64,
        inputs: Vec<Input>,
        combiner: Combiner,
    ) -> Self {
        let node = Arc::new(SelectorNode {
            id: NEXT_SELECTOR_ID.fetch_add(1, Ordering::Relaxed),
            store_id,
            store,
            inputs,
            combiner,
            memo: Mutex::new(None),
            recomputations: AtomicUsize::new(0),
        });
        if let Some(store) = node.store.upgrade() {
            store.graph.register(&node);
        }
        Self { node }
    }

    /// Unique identifier of this selector.
    #[inline]
    pub fn id(&self) -> u64 {
        self.node.id
    }

    /// Evaluate against the current state.
    pub fn get(&self) -> Result<Value, SelectorError> {
        let store = self
            .node
            .store
            .upgrade()
            .filter(|store| !store.is_destroyed())
            .ok_or(SelectorError::StoreDestroyed { id: self.node.id })?;
        let root = store.current_state();
        self.node.evaluate(&root)
    }

    /// Evaluate against a given snapshot of the owning store.
    pub(crate) fn evaluate(&self, root: &Value) -> Result<Value, SelectorError> {
        self.node.evaluate(root)
    }

    /// Number of times the combiner has run.
    #[inline]
    pub fn recomputations(&self) -> usize {
        self.node.recomputations.load(Ordering::Relaxed)
    }

    /// Identifiers of the selectors this one reads directly.
    pub fn dependencies(&self) -> Vec<u64> {
        self.node
            .inputs
            .iter()
            .filter_map(|input| match input {
                Input::Selector(upstream) => Some(upstream.id()),
                _ => None,
            })
            .collect()
    }

    /// Drop the memoized output. The next `get` recomputes.
    pub fn clear_cache(&self) {
        self.node.clear();
    }

    #[inline]
    pub(crate) fn store_id(&self) -> u64 {
        self.node.store_id
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("id", &self.node.id)
            .field("inputs", &self.node.inputs)
            .field("recomputations", &self.recomputations())
            .finish()
    }
}

struct FamilyInner {
    store: Weak<StoreInner>,
    store_id: u64,
    inputs: Vec<Input>,
    combiner: FamilyCombiner,
    members: Mutex<HashMap<String, Selector>>,
}

/// A factory of selectors parameterized by an argument value.
///
/// Each distinct argument (compared by [`Value::stable_key`]) gets its own
/// memoized selector, created on first use and reused afterwards.
#[derive(Clone)]
pub struct SelectorFamily {
    inner: Arc<FamilyInner>,
}

impl SelectorFamily {
    pub(crate) fn new(store: &Arc<StoreInner>, inputs: Vec<Input>, combiner: FamilyCombiner) -> Self {
        Self {
            inner: Arc::new(FamilyInner {
                store: Arc::downgrade(store),
                store_id: store.id,
                inputs,
                combiner,
                members: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The selector for `args`.
    pub fn get(&self, args: impl Into<Value>) -> Selector {
        let args = args.into();
        let key = args.stable_key();
        if let Some(selector) = self.inner.members.lock().get(&key) {
            return selector.clone();
        }

        let combiner = Arc::clone(&self.inner.combiner);
        let selector = Selector::new(
            self.inner.store.clone(),
            self.inner.store_id,
            self.inner.inputs.clone(),
            Arc::new(move |inputs: &[Value]| combiner(inputs, &args)),
        );
        self.inner
            .members
            .lock()
            .entry(key)
            .or_insert(selector)
            .clone()
    }

    /// Number of cached member selectors.
    pub fn len(&self) -> usize {
        self.inner.members.lock().len()
    }

    /// True if no member has been created yet.
    pub fn is_empty(&self) -> bool {
        self.inner.members.lock().is_empty()
    }

    /// Drop every cached member.
    pub fn clear(&self) {
        self.inner.members.lock().clear();
    }
}

impl fmt::Debug for SelectorFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorFamily")
            .field("inputs", &self.inner.inputs)
            .field("members", &self.len())
            .finish()
    }
}

/// Live selector nodes of one store.
#[derive(Default)]
pub(crate) struct SelectorGraph {
    nodes: Mutex<HashMap<u64, Weak<SelectorNode>>>,
}

impl SelectorGraph {
    fn register(&self, node: &Arc<SelectorNode>) {
        let mut nodes = self.nodes.lock();
        nodes.retain(|_, weak| weak.strong_count() > 0);
        nodes.insert(node.id, Arc::downgrade(node));
    }

    /// Number of selector nodes still referenced somewhere.
    pub(crate) fn live(&self) -> usize {
        self.nodes
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Drop every memo and forget all nodes.
    pub(crate) fn release(&self) {
        let nodes: Vec<_> = self.nodes.lock().drain().map(|(_, weak)| weak).collect();
        for node in nodes.iter().filter_map(Weak::upgrade) {
            node.clear();
        }
    }
}
