//! Transaction drafts.
//!
//! A [`Draft`] is a copy-on-write working copy of the state. Every write is
//! applied through `Arc::make_mut`, so only the branches a mutator touches
//! are cloned; everything else stays shared with the snapshot the draft was
//! opened on. Each write is also recorded as an [`Op`], and the
//! recorded [`Patch`] describes the transaction in history.

use crate::apply::apply_op;
use crate::error::PathError;
use crate::{get_at_path, Key, Number, Op, Patch, Path, Value};

/// Mutable working view of state inside a transaction.
///
/// Writes return `Result<&mut Self, PathError>` so they chain with `?`:
///
/// ```
/// use arbor::{create_store, StoreOptions};
/// use serde_json::json;
///
/// let store = create_store(json!({"todos": [], "done": 0}), StoreOptions::default()).unwrap();
/// store.transaction(|draft| {
///     draft.push("todos", "write docs")?.increment("done", 1)?;
///     Ok(())
/// });
/// assert_eq!(store.get_state()["done"], 1);
/// ```
#[derive(Debug, Clone)]
pub struct Draft {
    root: Value,
    patch: Patch,
}

impl Draft {
    pub(crate) fn new(base: Value) -> Self {
        Self {
            root: base,
            patch: Patch::new(),
        }
    }

    /// Read the working value at `path`.
    pub fn get(&self, path: impl Into<Path>) -> Option<&Value> {
        get_at_path(&self.root, &path.into())
    }

    /// The whole working copy.
    #[inline]
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Operations applied so far.
    #[inline]
    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    /// Apply an operation to the working copy and record it.
    ///
    /// A failed operation leaves the working copy as it was.
    pub fn apply(&mut self, op: Op) -> Result<&mut Self, PathError> {
        let mut next = self.root.clone();
        apply_op(&mut next, &op)?;
        self.root = next;
        self.patch.push(op);
        Ok(self)
    }

    /// Set the value at `path`, creating intermediate containers.
    pub fn set(
        &mut self,
        path: impl Into<Path>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::set(non_empty(path)?, value))
    }

    /// Delete the value at `path`. Absent paths are left alone.
    pub fn delete(&mut self, path: impl Into<Path>) -> Result<&mut Self, PathError> {
        self.apply(Op::delete(path.into()))
    }

    /// Append to the array at `path`.
    pub fn push(
        &mut self,
        path: impl Into<Path>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::append(path.into(), value))
    }

    /// Insert into the array at `path`, shifting later elements.
    pub fn insert(
        &mut self,
        path: impl Into<Path>,
        index: usize,
        value: impl Into<Value>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::insert(path.into(), index, value))
    }

    /// Remove the first element equal to `value` from the array at `path`.
    pub fn remove(
        &mut self,
        path: impl Into<Path>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::remove(path.into(), value))
    }

    /// Merge the fields of `value` into the object at `path`.
    pub fn merge(
        &mut self,
        path: impl Into<Path>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::merge_object(path.into(), value))
    }

    /// Add `amount` to the number at `path`.
    pub fn increment(
        &mut self,
        path: impl Into<Path>,
        amount: impl Into<Number>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::increment(path.into(), amount))
    }

    /// Subtract `amount` from the number at `path`.
    pub fn decrement(
        &mut self,
        path: impl Into<Path>,
        amount: impl Into<Number>,
    ) -> Result<&mut Self, PathError> {
        let amount = match amount.into() {
            Number::Int(i) => i.checked_neg().map_or(Number::Float(-(i as f64)), Number::Int),
            Number::Float(f) => Number::Float(-f),
        };
        self.apply(Op::increment(path.into(), amount))
    }

    /// Insert an entry into the keyed map at `path`.
    pub fn map_insert(
        &mut self,
        path: impl Into<Path>,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::MapInsert {
            path: path.into(),
            key: key.into(),
            value: value.into(),
        })
    }

    /// Remove an entry from the keyed map at `path`.
    pub fn map_remove(
        &mut self,
        path: impl Into<Path>,
        key: impl Into<Key>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::MapRemove {
            path: path.into(),
            key: key.into(),
        })
    }

    /// Add an element to the set at `path`.
    pub fn set_add(
        &mut self,
        path: impl Into<Path>,
        key: impl Into<Key>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::SetAdd {
            path: path.into(),
            key: key.into(),
        })
    }

    /// Remove an element from the set at `path`.
    pub fn set_remove(
        &mut self,
        path: impl Into<Path>,
        key: impl Into<Key>,
    ) -> Result<&mut Self, PathError> {
        self.apply(Op::SetRemove {
            path: path.into(),
            key: key.into(),
        })
    }

    /// Edit the value at `path` in place. An absent value is seen as `Null`.
    ///
    /// The edit is recorded as a single `Set` of the final value.
    pub fn update<F>(&mut self, path: impl Into<Path>, f: F) -> Result<&mut Self, PathError>
    where
        F: FnOnce(&mut Value),
    {
        let path = non_empty(path)?;
        let mut value = get_at_path(&self.root, &path)
            .cloned()
            .unwrap_or(Value::Null);
        f(&mut value);
        self.apply(Op::Set { path, value })
    }

    /// Replace the whole working copy.
    pub fn replace(&mut self, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.root = value.clone();
        self.patch.push(Op::Set {
            path: Path::root(),
            value,
        });
        self
    }

    pub(crate) fn finish(self) -> (Value, Patch) {
        (self.root, self.patch)
    }
}

fn non_empty(path: impl Into<Path>) -> Result<Path, PathError> {
    let path = path.into();
    if path.is_empty() {
        return Err(PathError::EmptyPath);
    }
    Ok(path)
}

/// What a transaction mutator may return.
///
/// Returning a value replaces the state wholesale; returning `()` or `None`
/// commits the draft.
pub trait IntoReplacement {
    /// The replacement state, if any.
    fn into_replacement(self) -> Option<Value>;
}

impl IntoReplacement for () {
    fn into_replacement(self) -> Option<Value> {
        None
    }
}

impl IntoReplacement for Value {
    fn into_replacement(self) -> Option<Value> {
        Some(self)
    }
}

impl IntoReplacement for Option<Value> {
    fn into_replacement(self) -> Option<Value> {
        self
    }
}

impl IntoReplacement for serde_json::Value {
    fn into_replacement(self) -> Option<Value> {
        Some(Value::from(self))
    }
}
