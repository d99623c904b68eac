//! Change sets between snapshots.
//!
//! A [`Diff`] lists the minimal set of changed branches between two
//! snapshots. Branches that are the same reference in both are pruned without
//! being visited, so diffing a structurally shared snapshot costs time
//! proportional to the changed branches only.

use crate::value::{Key, Object};
use crate::{Path, Seg, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Changed paths between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Diff {
    paths: BTreeSet<Path>,
}

impl Diff {
    /// Compute the change set from `old` to `new`.
    pub fn between(old: &Value, new: &Value) -> Self {
        let mut paths = BTreeSet::new();
        collect(old, new, &mut Path::root(), &mut paths);
        Self { paths }
    }

    /// True if nothing changed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Number of changed branches.
    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// The changed branches.
    #[inline]
    pub fn paths(&self) -> &BTreeSet<Path> {
        &self.paths
    }

    /// Whether a change touches `path`: a changed branch lies at, above or
    /// below it.
    ///
    /// ```
    /// use arbor::{path, Diff, Value};
    /// use serde_json::json;
    ///
    /// let old = Value::from(json!({"user": {"name": "a", "age": 1}, "n": 0}));
    /// let new = Value::from(json!({"user": {"name": "b", "age": 1}, "n": 0}));
    /// let diff = Diff::between(&old, &new);
    ///
    /// assert!(diff.affects(&path!("user")));
    /// assert!(diff.affects(&path!("user", "name")));
    /// assert!(!diff.affects(&path!("user", "age")));
    /// assert!(!diff.affects(&path!("n")));
    /// ```
    pub fn affects(&self, path: &Path) -> bool {
        self.paths.iter().any(|changed| changed.overlaps(path))
    }

    /// Top-level segments with at least one change beneath them.
    ///
    /// Empty when the root itself was replaced by a different kind of value;
    /// check [`Diff::affects`] with the root path for that case.
    pub fn changed_roots(&self) -> BTreeSet<&Seg> {
        self.paths.iter().filter_map(|p| p.segments().first()).collect()
    }
}

/// Compute the change set from `old` to `new`.
pub fn diff(old: &Value, new: &Value) -> Diff {
    Diff::between(old, new)
}

fn collect(old: &Value, new: &Value, at: &mut Path, out: &mut BTreeSet<Path>) {
    if old.same(new) {
        return;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, av) in a.iter() {
                at.push(Seg::Key(k.clone()));
                match b.get(k) {
                    Some(bv) => collect(av, bv, at, out),
                    None => {
                        out.insert(at.clone());
                    }
                }
                at.pop();
            }
            for k in b.keys().filter(|k| !a.contains_key(*k)) {
                out.insert(at.with_segment(Seg::Key(k.clone())));
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for i in 0..a.len().max(b.len()) {
                at.push(Seg::Index(i));
                match (a.get(i), b.get(i)) {
                    (Some(av), Some(bv)) => collect(av, bv, at, out),
                    _ => {
                        out.insert(at.clone());
                    }
                }
                at.pop();
            }
        }
        (Value::Map(a), Value::Map(b)) => {
            for (k, av) in a.iter() {
                at.push(key_segment(k));
                match b.get(k) {
                    Some(bv) => collect(av, bv, at, out),
                    None => {
                        out.insert(at.clone());
                    }
                }
                at.pop();
            }
            for k in b.keys().filter(|k| !a.contains_key(*k)) {
                out.insert(at.with_segment(key_segment(k)));
            }
        }
        _ => {
            if old != new {
                out.insert(at.clone());
            }
        }
    }
}

fn key_segment(key: &Key) -> Seg {
    match key {
        Key::Int(i) if *i >= 0 => Seg::Index(*i as usize),
        other => Seg::Key(other.to_string()),
    }
}

/// Re-use references from `old` wherever `new` is structurally equal.
///
/// Returns `old` itself when the two trees are equal, so callers can detect a
/// no-op with [`Value::same`]. Otherwise every unchanged subtree of the result
/// is the same reference as in `old`.
pub fn share_unchanged(old: &Value, new: Value) -> Value {
    if old.same(&new) {
        return new;
    }
    match (old, &new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut changed = a.len() != b.len();
            let fields: Object = b
                .iter()
                .map(|(k, v)| {
                    let shared = match a.get(k) {
                        Some(prev) => share_unchanged(prev, v.clone()),
                        None => v.clone(),
                    };
                    changed |= !a.get(k).is_some_and(|prev| prev.same(&shared));
                    (k.clone(), shared)
                })
                .collect();
            if changed {
                Value::Object(Arc::new(fields))
            } else {
                old.clone()
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            let mut changed = a.len() != b.len();
            let items: Vec<Value> = b
                .iter()
                .enumerate()
                .map(|(i, v)| {
                    let shared = match a.get(i) {
                        Some(prev) => share_unchanged(prev, v.clone()),
                        None => v.clone(),
                    };
                    changed |= !a.get(i).is_some_and(|prev| prev.same(&shared));
                    shared
                })
                .collect();
            if changed {
                Value::Array(Arc::new(items))
            } else {
                old.clone()
            }
        }
        (Value::Map(a), Value::Map(b)) => {
            let mut changed = a.len() != b.len();
            let entries = b
                .iter()
                .map(|(k, v)| {
                    let shared = match a.get(k) {
                        Some(prev) => share_unchanged(prev, v.clone()),
                        None => v.clone(),
                    };
                    changed |= !a.get(k).is_some_and(|prev| prev.same(&shared));
                    (k.clone(), shared)
                })
                .collect();
            if changed {
                Value::Map(Arc::new(entries))
            } else {
                old.clone()
            }
        }
        _ => {
            if *old == new {
                old.clone()
            } else {
                new
            }
        }
    }
}
