//! Deep merge of JSON object layers.
//!
//! Objects merge key by key, recursively. Scalars and arrays from a later
//! layer replace the earlier value, unless the array's dotted path is listed
//! as additive, in which case items are appended (skipping duplicates).

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Merge `overlay` into `base` in place.
pub fn deep_merge(
    base: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
    additive: &BTreeSet<String>,
) {
    merge_at(base, overlay, additive, "");
}

/// Merge a sequence of layers, earliest first, into a fresh object.
pub fn merge_layers<'a, I>(layers: I, additive: &BTreeSet<String>) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Map<String, Value>>,
{
    let mut result = Map::new();
    for layer in layers {
        deep_merge(&mut result, layer, additive);
    }
    result
}

fn merge_at(
    base: &mut Map<String, Value>,
    overlay: &Map<String, Value>,
    additive: &BTreeSet<String>,
    prefix: &str,
) {
    for (key, value) in overlay {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        let merged = match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_at(existing, incoming, additive, &path);
                true
            }
            (Some(Value::Array(existing)), Value::Array(incoming)) if additive.contains(&path) => {
                for item in incoming {
                    if !existing.contains(item) {
                        existing.push(item.clone());
                    }
                }
                true
            }
            _ => false,
        };

        if !merged {
            base.insert(key.clone(), value.clone());
        }
    }
}

/// Look up a dotted path (`a.b.c`) inside an object.
pub fn get_path<'a>(root: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = root.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Dotted paths of every non-object leaf in `root`. Empty objects count as leaves.
pub fn leaf_paths(root: &Map<String, Value>) -> Vec<String> {
    let mut out = Vec::new();
    collect_leaves(root, "", &mut out);
    out
}

fn collect_leaves(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => collect_leaves(inner, &path, out),
            _ => out.push(path),
        }
    }
}
