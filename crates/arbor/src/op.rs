//! Draft operations.
//!
//! Each operation describes one atomic change a transaction draft applied to
//! its working copy. The recorded list is kept in history as the description
//! of the transaction.

use crate::{Key, Number, Path, Value};

/// A single draft operation.
#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    /// Set a value at the path, creating intermediate containers.
    Set {
        /// Target path.
        path: Path,
        /// Value to set.
        value: Value,
    },

    /// Delete the value at the path. No-op if the path doesn't exist.
    Delete {
        /// Target path.
        path: Path,
    },

    /// Append a value to an array, creating the array if missing.
    Append {
        /// Target path (must be an array or non-existent).
        path: Path,
        /// Value to append.
        value: Value,
    },

    /// Insert a value at an index of an array, shifting later elements.
    Insert {
        /// Target path (must be an array or non-existent).
        path: Path,
        /// Index to insert at.
        index: usize,
        /// Value to insert.
        value: Value,
    },

    /// Remove the first element equal to `value` from an array.
    Remove {
        /// Target path (must be an array).
        path: Path,
        /// Value to remove.
        value: Value,
    },

    /// Merge the fields of an object into the object at the path.
    MergeObject {
        /// Target path (must be an object or non-existent).
        path: Path,
        /// Object to merge.
        value: Value,
    },

    /// Add to a numeric value. Negative amounts decrement.
    Increment {
        /// Target path (must be a number).
        path: Path,
        /// Amount to add.
        amount: Number,
    },

    /// Insert an entry into a keyed map, creating the map if missing.
    MapInsert {
        /// Target path (must be a map or non-existent).
        path: Path,
        /// Entry key.
        key: Key,
        /// Entry value.
        value: Value,
    },

    /// Remove an entry from a keyed map.
    MapRemove {
        /// Target path (must be a map).
        path: Path,
        /// Entry key.
        key: Key,
    },

    /// Add an element to a set, creating the set if missing.
    SetAdd {
        /// Target path (must be a set or non-existent).
        path: Path,
        /// Element.
        key: Key,
    },

    /// Remove an element from a set.
    SetRemove {
        /// Target path (must be a set).
        path: Path,
        /// Element.
        key: Key,
    },
}

impl Op {
    /// Create a Set operation.
    #[inline]
    pub fn set(path: Path, value: impl Into<Value>) -> Self {
        Op::Set {
            path,
            value: value.into(),
        }
    }

    /// Create a Delete operation.
    #[inline]
    pub fn delete(path: Path) -> Self {
        Op::Delete { path }
    }

    /// Create an Append operation.
    #[inline]
    pub fn append(path: Path, value: impl Into<Value>) -> Self {
        Op::Append {
            path,
            value: value.into(),
        }
    }

    /// Create an Insert operation.
    #[inline]
    pub fn insert(path: Path, index: usize, value: impl Into<Value>) -> Self {
        Op::Insert {
            path,
            index,
            value: value.into(),
        }
    }

    /// Create a Remove operation.
    #[inline]
    pub fn remove(path: Path, value: impl Into<Value>) -> Self {
        Op::Remove {
            path,
            value: value.into(),
        }
    }

    /// Create a MergeObject operation.
    #[inline]
    pub fn merge_object(path: Path, value: impl Into<Value>) -> Self {
        Op::MergeObject {
            path,
            value: value.into(),
        }
    }

    /// Create an Increment operation.
    #[inline]
    pub fn increment(path: Path, amount: impl Into<Number>) -> Self {
        Op::Increment {
            path,
            amount: amount.into(),
        }
    }

    /// Get the path this operation targets.
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Op::Set { path, .. }
            | Op::Delete { path }
            | Op::Append { path, .. }
            | Op::Insert { path, .. }
            | Op::Remove { path, .. }
            | Op::MergeObject { path, .. }
            | Op::Increment { path, .. }
            | Op::MapInsert { path, .. }
            | Op::MapRemove { path, .. }
            | Op::SetAdd { path, .. }
            | Op::SetRemove { path, .. } => path,
        }
    }

    /// Get the operation name.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Op::Set { .. } => "set",
            Op::Delete { .. } => "delete",
            Op::Append { .. } => "append",
            Op::Insert { .. } => "insert",
            Op::Remove { .. } => "remove",
            Op::MergeObject { .. } => "merge_object",
            Op::Increment { .. } => "increment",
            Op::MapInsert { .. } => "map_insert",
            Op::MapRemove { .. } => "map_remove",
            Op::SetAdd { .. } => "set_add",
            Op::SetRemove { .. } => "set_remove",
        }
    }
}
