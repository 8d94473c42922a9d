//! Structural change validation.
//!
//! # Responsibilities
//! - Decide whether a reloaded value may replace the stored one
//! - Enumerate field-level differences by dotted path
//!
//! # Design Decisions
//! - Walks the serialized form (`serde_json::Value`), so no per-type
//!   comparator has to be written
//! - Objects recurse; every other value is compared as a leaf
//! - For a typed value the serialized kind may legitimately change (enum
//!   variants, untagged fields), so compatibility comes from
//!   [`Snapshot::is_compatible`] and not from the tree
//! - Untyped trees use [`same_shape`]: `null` matches anything, every other
//!   kind change is a mismatch
//! - The change set is informational; any compatible diff is accepted,
//!   including an empty one

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::Result;
use crate::snapshot::Snapshot;

static NULL: Value = Value::Null;

/// Old and new value of a single changed field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Changed fields keyed by dotted path (`database.port`).
pub type ChangeSet = BTreeMap<String, FieldChange>;

/// Result of comparing two configuration values.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralDiff {
    compatible: bool,
    changes: ChangeSet,
}

impl StructuralDiff {
    pub fn is_compatible(&self) -> bool {
        self.compatible
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn into_changes(self) -> ChangeSet {
        self.changes
    }
}

/// Compare two values of the same type field by field.
pub fn compare<T: Snapshot>(old: &T, new: &T) -> Result<StructuralDiff> {
    let compatible = old.is_compatible(new);
    let old = serde_json::to_value(old)?;
    let new = serde_json::to_value(new)?;
    Ok(StructuralDiff {
        compatible,
        changes: diff(&old, &new),
    })
}

/// Compare two untyped trees; kind changes make them incompatible.
pub fn compare_values(old: &Value, new: &Value) -> StructuralDiff {
    StructuralDiff {
        compatible: same_shape(old, new),
        changes: diff(old, new),
    }
}

/// Whether two trees have the same shape.
///
/// Objects must line up key by key (a missing key counts as `null`), `null`
/// matches any kind and every other pair must be of the same JSON kind.
pub fn same_shape(old: &Value, new: &Value) -> bool {
    match (old, new) {
        (Value::Object(old_fields), Value::Object(new_fields)) => old_fields
            .keys()
            .chain(new_fields.keys())
            .all(|key| {
                same_shape(
                    old_fields.get(key).unwrap_or(&NULL),
                    new_fields.get(key).unwrap_or(&NULL),
                )
            }),
        (Value::Null, _) | (_, Value::Null) => true,
        (Value::Bool(_), Value::Bool(_))
        | (Value::Number(_), Value::Number(_))
        | (Value::String(_), Value::String(_))
        | (Value::Array(_), Value::Array(_)) => true,
        _ => false,
    }
}

fn diff(old: &Value, new: &Value) -> ChangeSet {
    let mut changes = ChangeSet::new();
    walk(old, new, "", &mut changes);
    changes
}

fn walk(old: &Value, new: &Value, prefix: &str, changes: &mut ChangeSet) {
    if let (Value::Object(old_fields), Value::Object(new_fields)) = (old, new) {
        let mut keys: Vec<&String> = old_fields.keys().chain(new_fields.keys()).collect();
        keys.sort();
        keys.dedup();

        for key in keys {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{}.{}", prefix, key)
            };
            walk(
                old_fields.get(key).unwrap_or(&NULL),
                new_fields.get(key).unwrap_or(&NULL),
                &path,
                changes,
            );
        }
        return;
    }

    if old != new {
        changes.insert(
            prefix.to_string(),
            FieldChange {
                old: old.clone(),
                new: new.clone(),
            },
        );
    }
}
