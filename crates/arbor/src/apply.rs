//! Path traversal and application.
//!
//! Two write flavors live here:
//!
//! - [`update_at_path`] is functional. It returns a new root that shares every
//!   branch except the one leading to the terminal key, or `None` when the
//!   write would not change anything.
//! - [`apply_patch`] mutates a working copy in place. Containers are written
//!   through `Arc::make_mut`, so a node still shared with a snapshot is cloned
//!   one level deep on first touch and owned thereafter.

use crate::error::PathError;
use crate::value::{Key, Map};
use crate::{Number, Op, Patch, Path, Seg, Value};
use std::sync::Arc;

/// Most `Null` slots an array write past the end may pad in.
pub const MAX_ARRAY_PADDING: usize = 1024;

/// Get a reference to the value at a path.
///
/// Returns `None` if the path does not exist or crosses a value that cannot
/// hold children.
///
/// ```
/// use arbor::{get_at_path, path, Value};
/// use serde_json::json;
///
/// let doc = Value::from(json!({"users": [{"name": "Alice"}]}));
/// assert_eq!(get_at_path(&doc, &path!("users", 0, "name")).unwrap(), "Alice");
/// assert!(get_at_path(&doc, &path!("users", 3)).is_none());
/// ```
pub fn get_at_path<'a>(root: &'a Value, path: &Path) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, seg| child(node, seg))
}

fn child<'a>(node: &'a Value, seg: &Seg) -> Option<&'a Value> {
    match node {
        Value::Object(fields) => fields.get(object_key(seg).as_ref()),
        Value::Array(items) => array_index(seg).and_then(|i| items.get(i)),
        Value::Map(entries) => entries.get(&map_key(entries, seg)),
        _ => None,
    }
}

/// Result of editing one node of the tree.
enum Edit {
    Unchanged,
    Replace(Value),
    Remove,
}

/// Replace the value at `path` with the result of `f`.
///
/// `f` receives the current value (`None` when absent) and returns the new
/// value, or `None` to delete the key. Missing intermediates are created as
/// objects for key segments and arrays for index segments. Array writes past
/// the end pad with `Null`, up to [`MAX_ARRAY_PADDING`] slots; further out
/// they fail with [`PathError::IndexOutOfBounds`]. Array deletes splice.
///
/// Returns `Ok(None)` when nothing changes: the new terminal value is
/// structurally equal to the old one, or an absent key is deleted.
pub fn update_at_path<F>(root: &Value, path: &Path, f: F) -> Result<Option<Value>, PathError>
where
    F: FnOnce(Option<&Value>) -> Option<Value>,
{
    if path.is_empty() {
        return Err(PathError::EmptyPath);
    }
    match update_node(Some(root), path.segments(), 0, path, f)? {
        Edit::Replace(v) => Ok(Some(v)),
        Edit::Unchanged | Edit::Remove => Ok(None),
    }
}

/// Set the value at `path`. See [`update_at_path`].
pub fn set_at_path(root: &Value, path: &Path, value: Value) -> Result<Option<Value>, PathError> {
    update_at_path(root, path, move |_| Some(value))
}

/// Delete the value at `path`. See [`update_at_path`].
pub fn delete_at_path(root: &Value, path: &Path) -> Result<Option<Value>, PathError> {
    update_at_path(root, path, |_| None)
}

fn update_node<F>(
    node: Option<&Value>,
    segments: &[Seg],
    depth: usize,
    full_path: &Path,
    f: F,
) -> Result<Edit, PathError>
where
    F: FnOnce(Option<&Value>) -> Option<Value>,
{
    let Some((seg, rest)) = segments.split_first() else {
        return Ok(match (node, f(node)) {
            (None, None) => Edit::Unchanged,
            (Some(old), Some(new)) if *old == new => Edit::Unchanged,
            (_, Some(new)) => Edit::Replace(new),
            (Some(_), None) => Edit::Remove,
        });
    };

    match node {
        Some(container) => update_child(container, seg, rest, depth, full_path, f),
        None => update_child(&empty_for(seg), seg, rest, depth, full_path, f),
    }
}

fn update_child<F>(
    container: &Value,
    seg: &Seg,
    rest: &[Seg],
    depth: usize,
    full_path: &Path,
    f: F,
) -> Result<Edit, PathError>
where
    F: FnOnce(Option<&Value>) -> Option<Value>,
{
    match container {
        Value::Object(fields) => {
            let key = object_key(seg).into_owned();
            let edit = update_node(fields.get(&key), rest, depth + 1, full_path, f)?;
            Ok(match edit {
                Edit::Unchanged => Edit::Unchanged,
                Edit::Replace(v) => {
                    let mut fields = fields.clone();
                    Arc::make_mut(&mut fields).insert(key, v);
                    Edit::Replace(Value::Object(fields))
                }
                Edit::Remove => {
                    let mut fields = fields.clone();
                    Arc::make_mut(&mut fields).shift_remove(&key);
                    Edit::Replace(Value::Object(fields))
                }
            })
        }
        Value::Array(items) => {
            let index = array_index(seg).ok_or_else(|| {
                PathError::type_mismatch(full_path.slice(0, depth + 1), "index", "key")
            })?;
            let edit = update_node(items.get(index), rest, depth + 1, full_path, f)?;
            Ok(match edit {
                Edit::Unchanged => Edit::Unchanged,
                Edit::Replace(v) => {
                    check_padding(full_path, depth, index, items.len())?;
                    let mut items = items.clone();
                    write_index(Arc::make_mut(&mut items), index, v);
                    Edit::Replace(Value::Array(items))
                }
                Edit::Remove => {
                    let mut items = items.clone();
                    Arc::make_mut(&mut items).remove(index);
                    Edit::Replace(Value::Array(items))
                }
            })
        }
        Value::Map(entries) => {
            let key = map_key(entries, seg);
            let edit = update_node(entries.get(&key), rest, depth + 1, full_path, f)?;
            Ok(match edit {
                Edit::Unchanged => Edit::Unchanged,
                Edit::Replace(v) => {
                    let mut entries = entries.clone();
                    Arc::make_mut(&mut entries).insert(key, v);
                    Edit::Replace(Value::Map(entries))
                }
                Edit::Remove => {
                    let mut entries = entries.clone();
                    Arc::make_mut(&mut entries).shift_remove(&key);
                    Edit::Replace(Value::Map(entries))
                }
            })
        }
        other => Err(PathError::not_traversable(
            full_path.slice(0, depth),
            other.type_name(),
        )),
    }
}

/// Apply a patch to a document (pure function).
///
/// ```
/// use arbor::{apply_patch, path, Op, Patch, Value};
/// use serde_json::json;
///
/// let doc = Value::from(json!({"count": 0}));
/// let patch = Patch::new()
///     .with_op(Op::set(path!("count"), 10))
///     .with_op(Op::append(path!("log"), "set"));
///
/// let next = apply_patch(&doc, &patch).unwrap();
/// assert_eq!(next["count"], 10);
/// assert_eq!(doc["count"], 0);
/// ```
pub fn apply_patch(doc: &Value, patch: &Patch) -> Result<Value, PathError> {
    let mut result = doc.clone();
    for op in patch.ops() {
        apply_op(&mut result, op)?;
    }
    Ok(result)
}

/// Apply a single operation to a working copy (copy-on-write).
pub(crate) fn apply_op(doc: &mut Value, op: &Op) -> Result<(), PathError> {
    match op {
        Op::Set { path, value } => apply_set(doc, path, value.clone()),
        Op::Delete { path } => apply_delete(doc, path),
        Op::Append { path, value } => {
            let target = node_mut(doc, path, Some(Value::array()))?;
            match target {
                Some(Value::Array(items)) => {
                    Arc::make_mut(items).push(value.clone());
                    Ok(())
                }
                other => Err(mismatch(path, "array", other)),
            }
        }
        Op::Insert { path, index, value } => {
            let target = node_mut(doc, path, Some(Value::array()))?;
            match target {
                Some(Value::Array(items)) => {
                    if *index > items.len() {
                        return Err(PathError::index_out_of_bounds(
                            path.clone(),
                            *index,
                            items.len(),
                        ));
                    }
                    Arc::make_mut(items).insert(*index, value.clone());
                    Ok(())
                }
                other => Err(mismatch(path, "array", other)),
            }
        }
        Op::Remove { path, value } => match node_mut(doc, path, None)? {
            None => Ok(()),
            Some(Value::Array(items)) => {
                if let Some(pos) = items.iter().position(|v| v == value) {
                    Arc::make_mut(items).remove(pos);
                }
                Ok(())
            }
            other => Err(mismatch(path, "array", other)),
        },
        Op::MergeObject { path, value } => {
            let incoming = value
                .as_object()
                .ok_or_else(|| PathError::type_mismatch(path.clone(), "object", value.type_name()))?;
            match node_mut(doc, path, Some(Value::object()))? {
                Some(Value::Object(fields)) => {
                    let fields = Arc::make_mut(fields);
                    for (k, v) in incoming {
                        fields.insert(k.clone(), v.clone());
                    }
                    Ok(())
                }
                other => Err(mismatch(path, "object", other)),
            }
        }
        Op::Increment { path, amount } => {
            let not_a_number = || PathError::NotANumber { path: path.clone() };
            let target = node_mut(doc, path, None)?.ok_or_else(not_a_number)?;
            let Value::Number(current) = &mut *target else {
                return Err(not_a_number());
            };
            let next = Value::from(add_numbers(*current, *amount));
            *target = next;
            Ok(())
        }
        Op::MapInsert { path, key, value } => match node_mut(doc, path, Some(Value::map()))? {
            Some(Value::Map(entries)) => {
                Arc::make_mut(entries).insert(key.clone(), value.clone());
                Ok(())
            }
            other => Err(mismatch(path, "map", other)),
        },
        Op::MapRemove { path, key } => match node_mut(doc, path, None)? {
            None => Ok(()),
            Some(Value::Map(entries)) => {
                if entries.contains_key(key) {
                    Arc::make_mut(entries).shift_remove(key);
                }
                Ok(())
            }
            other => Err(mismatch(path, "map", other)),
        },
        Op::SetAdd { path, key } => match node_mut(doc, path, Some(Value::set()))? {
            Some(Value::Set(elements)) => {
                if !elements.contains(key) {
                    Arc::make_mut(elements).insert(key.clone());
                }
                Ok(())
            }
            other => Err(mismatch(path, "set", other)),
        },
        Op::SetRemove { path, key } => match node_mut(doc, path, None)? {
            None => Ok(()),
            Some(Value::Set(elements)) => {
                if elements.contains(key) {
                    Arc::make_mut(elements).shift_remove(key);
                }
                Ok(())
            }
            other => Err(mismatch(path, "set", other)),
        },
    }
}

fn mismatch(path: &Path, expected: &'static str, found: Option<&mut Value>) -> PathError {
    PathError::type_mismatch(path.clone(), expected, found.map_or("nothing", |v| v.type_name()))
}

fn add_numbers(current: Number, amount: Number) -> Number {
    match (current, amount) {
        (Number::Int(a), Number::Int(b)) => a
            .checked_add(b)
            .map_or_else(|| Number::Float(a as f64 + b as f64), Number::Int),
        (a, b) => Number::Float(a.as_f64() + b.as_f64()),
    }
}

fn apply_set(doc: &mut Value, path: &Path, value: Value) -> Result<(), PathError> {
    let Some(last) = path.last() else {
        *doc = value;
        return Ok(());
    };
    let parent = parent_mut(doc, path, true)?.ok_or(PathError::EmptyPath)?;
    match parent {
        Value::Object(fields) => {
            Arc::make_mut(fields).insert(object_key(last).into_owned(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = array_index(last).ok_or_else(|| {
                PathError::type_mismatch(path.clone(), "index", "key")
            })?;
            check_padding(path, path.len() - 1, index, items.len())?;
            write_index(Arc::make_mut(items), index, value);
            Ok(())
        }
        Value::Map(entries) => {
            let key = map_key(entries, last);
            Arc::make_mut(entries).insert(key, value);
            Ok(())
        }
        other => Err(PathError::not_traversable(
            path.slice(0, path.len() - 1),
            other.type_name(),
        )),
    }
}

fn apply_delete(doc: &mut Value, path: &Path) -> Result<(), PathError> {
    let Some(last) = path.last() else {
        return Err(PathError::EmptyPath);
    };
    let Some(parent) = parent_mut(doc, path, false)? else {
        return Ok(());
    };
    match parent {
        Value::Object(fields) => {
            let key = object_key(last);
            if fields.contains_key(key.as_ref()) {
                Arc::make_mut(fields).shift_remove(key.as_ref());
            }
            Ok(())
        }
        Value::Array(items) => {
            if let Some(index) = array_index(last).filter(|i| *i < items.len()) {
                Arc::make_mut(items).remove(index);
            }
            Ok(())
        }
        Value::Map(entries) => {
            let key = map_key(entries, last);
            if entries.contains_key(&key) {
                Arc::make_mut(entries).shift_remove(&key);
            }
            Ok(())
        }
        other => Err(PathError::not_traversable(
            path.slice(0, path.len() - 1),
            other.type_name(),
        )),
    }
}

/// Walk to the node at `path`. When `fill` is set, a missing terminal is
/// created with that value and missing intermediates are created as well.
fn node_mut<'a>(
    doc: &'a mut Value,
    path: &Path,
    fill: Option<Value>,
) -> Result<Option<&'a mut Value>, PathError> {
    let Some(last) = path.last() else {
        return Ok(Some(doc));
    };
    match parent_mut(doc, path, fill.is_some())? {
        Some(parent) => child_slot(parent, last, path, path.len() - 1, fill),
        None => Ok(None),
    }
}

/// Walk to the parent of the terminal segment.
fn parent_mut<'a>(
    doc: &'a mut Value,
    path: &Path,
    create: bool,
) -> Result<Option<&'a mut Value>, PathError> {
    let segments = path.segments();
    let mut current = doc;
    for depth in 0..segments.len().saturating_sub(1) {
        let fill = create.then(|| empty_for(&segments[depth + 1]));
        current = match child_slot(current, &segments[depth], path, depth, fill)? {
            Some(next) => next,
            None => return Ok(None),
        };
    }
    Ok(Some(current))
}

/// Mutable access to one child, inserting `fill` when it is missing.
fn child_slot<'a>(
    node: &'a mut Value,
    seg: &Seg,
    full_path: &Path,
    depth: usize,
    fill: Option<Value>,
) -> Result<Option<&'a mut Value>, PathError> {
    match node {
        Value::Object(fields) => {
            let key = object_key(seg).into_owned();
            if !fields.contains_key(&key) {
                let Some(fill) = fill else {
                    return Ok(None);
                };
                Arc::make_mut(fields).insert(key.clone(), fill);
            }
            Ok(Arc::make_mut(fields).get_mut(&key))
        }
        Value::Array(items) => {
            let index = array_index(seg).ok_or_else(|| {
                PathError::type_mismatch(full_path.slice(0, depth + 1), "index", "key")
            })?;
            if index >= items.len() {
                let Some(fill) = fill else {
                    return Ok(None);
                };
                check_padding(full_path, depth, index, items.len())?;
                write_index(Arc::make_mut(items), index, fill);
            }
            Ok(Arc::make_mut(items).get_mut(index))
        }
        Value::Map(entries) => {
            let key = map_key(entries, seg);
            if !entries.contains_key(&key) {
                let Some(fill) = fill else {
                    return Ok(None);
                };
                Arc::make_mut(entries).insert(key.clone(), fill);
            }
            Ok(Arc::make_mut(entries).get_mut(&key))
        }
        other => Err(PathError::not_traversable(
            full_path.slice(0, depth),
            other.type_name(),
        )),
    }
}

fn empty_for(seg: &Seg) -> Value {
    match seg {
        Seg::Index(_) => Value::array(),
        Seg::Key(_) => Value::object(),
    }
}

/// Reject writes landing more than [`MAX_ARRAY_PADDING`] slots past the end
/// of the array at `path[..depth]`.
fn check_padding(path: &Path, depth: usize, index: usize, len: usize) -> Result<(), PathError> {
    if index > len && index - len > MAX_ARRAY_PADDING {
        return Err(PathError::index_out_of_bounds(path.slice(0, depth), index, len));
    }
    Ok(())
}

fn write_index(items: &mut Vec<Value>, index: usize, value: Value) {
    if index < items.len() {
        items[index] = value;
    } else {
        items.resize(index, Value::Null);
        items.push(value);
    }
}

fn object_key(seg: &Seg) -> std::borrow::Cow<'_, str> {
    match seg {
        Seg::Key(k) => std::borrow::Cow::Borrowed(k.as_str()),
        Seg::Index(i) => std::borrow::Cow::Owned(i.to_string()),
    }
}

fn array_index(seg: &Seg) -> Option<usize> {
    match seg {
        Seg::Index(i) => Some(*i),
        Seg::Key(k) => k.parse().ok(),
    }
}

/// Resolve a segment against a keyed map, preferring an existing entry.
fn map_key(entries: &Map, seg: &Seg) -> Key {
    match seg {
        Seg::Index(i) => {
            let int = Key::from(*i);
            if entries.contains_key(&int) {
                return int;
            }
            let text = Key::from(i.to_string());
            if entries.contains_key(&text) {
                text
            } else {
                int
            }
        }
        Seg::Key(k) => {
            let text = Key::from(k.as_str());
            if entries.contains_key(&text) {
                return text;
            }
            match k.parse::<i64>() {
                Ok(i) if entries.contains_key(&Key::Int(i)) => Key::Int(i),
                _ => text,
            }
        }
    }
}
