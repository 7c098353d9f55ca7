//! Removal of empty and placeholder fields before metadata is written.

use serde_json::{Map, Value};

use crate::{
    missing::is_blank_token,
    model::{KEY_MISSING_VALUE, KEY_VALUES},
};

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn prune_string(text: &str) -> Value {
    let trimmed = text.trim_end();
    if is_blank_token(trimmed) {
        Value::String(String::new())
    } else {
        Value::String(trimmed.to_string())
    }
}

fn prune_keyed(key: &str, value: Value) -> Value {
    match (key, value) {
        // Data arrays keep their "nan" cells.
        (KEY_VALUES, value @ Value::Array(_)) => value,
        (KEY_MISSING_VALUE, Value::String(marker)) => Value::String(marker.trim_end().to_string()),
        (_, value) => prune_empty(value),
    }
}

/// Recursively drops null, blank and empty entries. Numbers (including zero)
/// and booleans always survive; strings are right-trimmed and blank tokens
/// such as `"NA"` become empty, which removes them from their container.
pub fn prune_empty(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, child) in map {
                let pruned = prune_keyed(&key, child);
                if !is_empty_value(&pruned) {
                    out.insert(key, pruned);
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(prune_empty)
                .filter(|item| !is_empty_value(item))
                .collect(),
        ),
        Value::String(text) => prune_string(&text),
        other => other,
    }
}

fn usable_doi(identifier: &Value) -> bool {
    let is_doi = identifier
        .get("type")
        .and_then(Value::as_str)
        .is_none_or(|kind| kind.eq_ignore_ascii_case("doi"));
    let id = identifier
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    !is_doi || !is_blank_token(id)
}

/// Drops publication identifier entries that carry no usable DOI.
pub fn prune_doi_identifier(tree: Value) -> Value {
    let mut tree = tree;
    let Some(Value::Array(publications)) = tree.get_mut("pub") else {
        return tree;
    };
    for publication in publications.iter_mut().filter_map(Value::as_object_mut) {
        let keep = match publication.get_mut("identifier") {
            Some(Value::Array(identifiers)) => {
                identifiers.retain(usable_doi);
                !identifiers.is_empty()
            }
            Some(identifier @ Value::Object(_)) => usable_doi(identifier),
            Some(_) => false,
            None => continue,
        };
        if !keep {
            publication.shift_remove("identifier");
        }
    }
    tree
}
