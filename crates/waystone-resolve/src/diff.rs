//! Structural diff over state documents.
//!
//! State documents are JSON objects addressed by dotted field paths.
//! A diff records every leaf the second document sets to a different
//! value than the first; fields absent from the second document are
//! not changes (partial documents are the common case on the wire —
//! removal is modeled as an explicit `null`).

use std::collections::BTreeMap;

use serde_json::Value;

use waystone_core::state::FieldPath;

/// One changed field in a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    /// The value in the base document, if the field existed there.
    pub old_value: Option<Value>,
    /// The value the changed document holds.
    pub new_value: Value,
}

/// Computes the fields `other` changes relative to `base`.
#[must_use]
pub fn diff_states(base: &Value, other: &Value) -> BTreeMap<FieldPath, FieldChange> {
    let mut changes = BTreeMap::new();
    walk(&FieldPath::new(""), Some(base), other, &mut changes);
    changes
}

fn walk(
    prefix: &FieldPath,
    base: Option<&Value>,
    other: &Value,
    changes: &mut BTreeMap<FieldPath, FieldChange>,
) {
    if let Value::Object(other_map) = other {
        let descend = match base {
            None | Some(Value::Object(_) | Value::Null) => true,
            Some(_) => false,
        };
        if descend {
            let base_map = match base {
                Some(Value::Object(map)) => Some(map),
                _ => None,
            };
            for (key, other_value) in other_map {
                let base_value = base_map.and_then(|map| map.get(key));
                walk(&prefix.child(key), base_value, other_value, changes);
            }
            return;
        }
    }

    let changed = match base {
        Some(base_value) => base_value != other,
        None => true,
    };
    if changed {
        changes.insert(
            prefix.clone(),
            FieldChange {
                old_value: base.filter(|v| !v.is_null()).cloned(),
                new_value: other.clone(),
            },
        );
    }
}

/// Reads the value at a dotted path, if present.
#[must_use]
pub fn value_at<'a>(state: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    let mut current = state;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Writes a value at a dotted path, creating intermediate objects.
/// Non-object intermediates are replaced.
pub fn set_value_at(state: &mut Value, path: &FieldPath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    let mut current = state;
    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        current = current
            .as_object_mut()
            .expect("just ensured an object")
            .entry((*segment).to_owned())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(serde_json::Map::new());
    }
    current
        .as_object_mut()
        .expect("just ensured an object")
        .insert(segments[segments.len() - 1].to_owned(), value);
}
