//! Conversion between the on-disk (index-by-number) and in-memory
//! (index-by-name) shapes of a LiPD tree.
//!
//! On disk every collection is a list: section entries, tables, models and
//! columns. In memory they are maps keyed by a derived name:
//!
//! | level              | key                                         |
//! |--------------------|---------------------------------------------|
//! | section entry      | `{prefix}{i}` (`paleo0`)                    |
//! | measurement table  | `tableName`, else `{entry}measurement{j}`   |
//! | model              | `{entry}model{m}`                           |
//! | model table        | `tableName`, else `{model}{kind}{j}`        |
//! | column             | `variableName` (`-N` on collision)          |
//!
//! A column whose `number` is a list (ensemble realizations) is expanded into
//! one `{name}-{num}-ens` entry per realization carrying `isEnsemble` and
//! `ensembleName` markers; [`index_by_number`] collapses those entries back.

use std::collections::HashMap;

use log::warn;
use serde_json::{Map, Value};

use crate::model::{
    KEY_COLUMNS, KEY_MODEL, KEY_NUMBER, KEY_TABLE_NAME, KEY_VALUES, KEY_VARIABLE_NAME,
    SectionKind, TableKind, suffixed_name,
};

pub const KEY_IS_ENSEMBLE: &str = "isEnsemble";
pub const KEY_ENSEMBLE_NAME: &str = "ensembleName";

/// Inserts under `name`, suffixing `-N` when taken. Returns the key used.
pub fn insert_suffixed(map: &mut Map<String, Value>, name: &str, value: Value) -> String {
    let key = suffixed_name(name, |candidate| map.contains_key(candidate));
    map.insert(key.clone(), value);
    key
}

fn insert_positional(map: &mut Map<String, Value>, name: String, position: usize, value: Value) {
    let mut key = name;
    while map.contains_key(&key) {
        key = format!("{key}_{position}");
    }
    map.insert(key, value);
}

fn explicit_table_name(table: &Value) -> Option<String> {
    table
        .get(KEY_TABLE_NAME)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn is_bare_table(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key(KEY_COLUMNS))
}

/// Splits one ensemble column into per-realization entries. Embedded values
/// are distributed when they form a matrix with one vector per realization.
pub fn expand_ensemble_column(name: &str, column: &Value) -> Vec<(String, Value)> {
    let Some(object) = column.as_object() else {
        return vec![(name.to_string(), column.clone())];
    };
    let Some(numbers) = object.get(KEY_NUMBER).and_then(Value::as_array) else {
        return vec![(name.to_string(), column.clone())];
    };
    let realizations = object
        .get(KEY_VALUES)
        .and_then(Value::as_array)
        .filter(|matrix| matrix.len() == numbers.len() && matrix.iter().all(Value::is_array));

    numbers
        .iter()
        .enumerate()
        .map(|(idx, number)| {
            let mut entry = object.clone();
            entry.insert(KEY_NUMBER.to_string(), number.clone());
            entry.insert(KEY_IS_ENSEMBLE.to_string(), Value::Bool(true));
            entry.insert(KEY_ENSEMBLE_NAME.to_string(), Value::String(name.to_string()));
            match realizations {
                Some(matrix) => {
                    entry.insert(KEY_VALUES.to_string(), matrix[idx].clone());
                }
                None => {
                    entry.shift_remove(KEY_VALUES);
                }
            }
            let label = match number {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (format!("{name}-{label}-ens"), Value::Object(entry))
        })
        .collect()
}

/// Collapses `-ens` entries sharing an `ensembleName` into one column whose
/// `number` lists the realization numbers in encounter order.
pub fn collapse_column_entries(columns: &Map<String, Value>) -> Vec<Value> {
    let mut collapsed: Vec<Value> = Vec::with_capacity(columns.len());
    let mut groups: HashMap<String, (usize, bool)> = HashMap::new();

    for entry in columns.values() {
        let group = entry
            .get(KEY_ENSEMBLE_NAME)
            .and_then(Value::as_str)
            .map(str::to_string);
        let (Some(group), Some(object)) = (group, entry.as_object()) else {
            collapsed.push(entry.clone());
            continue;
        };
        let number = object.get(KEY_NUMBER).cloned().unwrap_or(Value::Null);
        let values = object.get(KEY_VALUES).cloned();

        match groups.get_mut(&group) {
            Some((idx, complete)) => {
                let target = &mut collapsed[*idx];
                if let Some(Value::Array(numbers)) = target.get_mut(KEY_NUMBER) {
                    numbers.push(number);
                }
                match (values, target.get_mut(KEY_VALUES)) {
                    (Some(values), Some(Value::Array(matrix))) if *complete => matrix.push(values),
                    _ => *complete = false,
                }
            }
            None => {
                let mut merged = object.clone();
                merged.shift_remove(KEY_IS_ENSEMBLE);
                merged.shift_remove(KEY_ENSEMBLE_NAME);
                merged.insert(KEY_VARIABLE_NAME.to_string(), Value::String(group.clone()));
                merged.insert(KEY_NUMBER.to_string(), Value::Array(vec![number]));
                let complete = match values {
                    Some(values) => {
                        merged.insert(KEY_VALUES.to_string(), Value::Array(vec![values]));
                        true
                    }
                    None => false,
                };
                groups.insert(group, (collapsed.len(), complete));
                collapsed.push(Value::Object(merged));
            }
        }
    }

    for (idx, complete) in groups.into_values() {
        if !complete && let Some(object) = collapsed[idx].as_object_mut() {
            object.shift_remove(KEY_VALUES);
        }
    }
    collapsed
}

pub fn index_columns_by_name(columns: &Value) -> Value {
    let Some(list) = columns.as_array() else {
        return columns.clone();
    };
    let mut named = Map::new();
    for (idx, column) in list.iter().enumerate() {
        let name = match column.get(KEY_VARIABLE_NAME).and_then(Value::as_str) {
            Some(name) if !name.trim().is_empty() => name.to_string(),
            _ => {
                warn!("Column at position {idx} has no variableName; naming it column{idx}");
                format!("column{idx}")
            }
        };
        if column.get(KEY_NUMBER).is_some_and(Value::is_array) {
            for (key, entry) in expand_ensemble_column(&name, column) {
                insert_suffixed(&mut named, &key, entry);
            }
            continue;
        }
        let mut entry = column.clone();
        let key = suffixed_name(&name, |candidate| named.contains_key(candidate));
        if let Some(object) = entry.as_object_mut() {
            object.insert(KEY_VARIABLE_NAME.to_string(), Value::String(key.clone()));
        }
        named.insert(key, entry);
    }
    Value::Object(named)
}

pub fn index_columns_by_number(columns: &Value) -> Value {
    match columns {
        Value::Object(map) => Value::Array(collapse_column_entries(map)),
        other => other.clone(),
    }
}

fn table_by_name(table: &Value) -> Value {
    let mut table = table.clone();
    if let Some(object) = table.as_object_mut()
        && let Some(columns) = object.get(KEY_COLUMNS)
    {
        let indexed = index_columns_by_name(columns);
        object.insert(KEY_COLUMNS.to_string(), indexed);
    }
    table
}

fn table_by_number(table: &Value) -> Value {
    let mut table = table.clone();
    if let Some(object) = table.as_object_mut()
        && let Some(columns) = object.get(KEY_COLUMNS)
    {
        let indexed = index_columns_by_number(columns);
        object.insert(KEY_COLUMNS.to_string(), indexed);
    }
    table
}

fn tables_by_name(tables: &Value, crumb: &str) -> Value {
    let list = match tables {
        Value::Array(list) => list.clone(),
        Value::Object(map) if is_bare_table(tables) => vec![Value::Object(map.clone())],
        Value::Object(map) => {
            return Value::Object(
                map.iter()
                    .map(|(key, table)| (key.clone(), table_by_name(table)))
                    .collect(),
            );
        }
        other => return other.clone(),
    };
    let mut named = Map::new();
    for (idx, table) in list.iter().enumerate() {
        let name = explicit_table_name(table).unwrap_or_else(|| format!("{crumb}{idx}"));
        insert_positional(&mut named, name, idx, table_by_name(table));
    }
    Value::Object(named)
}

fn tables_by_number(tables: &Value) -> Value {
    match tables {
        Value::Object(map) if !is_bare_table(tables) => {
            Value::Array(map.values().map(table_by_number).collect())
        }
        Value::Array(list) => Value::Array(list.iter().map(table_by_number).collect()),
        other => Value::Array(vec![table_by_number(other)]),
    }
}

fn model_by_name(model: &Value, model_key: &str) -> Value {
    let mut model = model.clone();
    if let Some(object) = model.as_object_mut() {
        for kind in TableKind::MODEL_KINDS {
            if let Some(tables) = object.get(kind.json_key()) {
                let crumb = format!("{model_key}{}", kind.as_str());
                let indexed = tables_by_name(tables, &crumb);
                object.insert(kind.json_key().to_string(), indexed);
            }
        }
    }
    model
}

fn model_by_number(model: &Value) -> Value {
    let mut model = model.clone();
    if let Some(object) = model.as_object_mut() {
        for kind in TableKind::MODEL_KINDS {
            if let Some(tables) = object.get(kind.json_key()) {
                let indexed = tables_by_number(tables);
                object.insert(kind.json_key().to_string(), indexed);
            }
        }
    }
    model
}

fn entry_by_name(entry: &Value, entry_key: &str) -> Value {
    let mut entry = entry.clone();
    let Some(object) = entry.as_object_mut() else {
        return entry;
    };
    if let Some(tables) = object.get(TableKind::Measurement.json_key()) {
        let crumb = format!("{entry_key}{}", TableKind::Measurement.as_str());
        let indexed = tables_by_name(tables, &crumb);
        object.insert(TableKind::Measurement.json_key().to_string(), indexed);
    }
    if let Some(models) = object.get(KEY_MODEL) {
        let indexed = match models {
            Value::Array(list) => {
                let mut named = Map::new();
                for (idx, model) in list.iter().enumerate() {
                    let key = format!("{entry_key}model{idx}");
                    let rendered = model_by_name(model, &key);
                    insert_positional(&mut named, key, idx, rendered);
                }
                Value::Object(named)
            }
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, model)| (key.clone(), model_by_name(model, key)))
                    .collect(),
            ),
            other => other.clone(),
        };
        object.insert(KEY_MODEL.to_string(), indexed);
    }
    entry
}

fn entry_by_number(entry: &Value) -> Value {
    let mut entry = entry.clone();
    let Some(object) = entry.as_object_mut() else {
        return entry;
    };
    if let Some(tables) = object.get(TableKind::Measurement.json_key()) {
        let indexed = tables_by_number(tables);
        object.insert(TableKind::Measurement.json_key().to_string(), indexed);
    }
    if let Some(models) = object.get(KEY_MODEL) {
        let indexed = match models {
            Value::Object(map) => Value::Array(map.values().map(model_by_number).collect()),
            Value::Array(list) => Value::Array(list.iter().map(model_by_number).collect()),
            other => other.clone(),
        };
        object.insert(KEY_MODEL.to_string(), indexed);
    }
    entry
}

/// Converts a position-ordered section into its name-keyed form.
pub fn index_by_name(section: &Value, prefix: &str) -> Value {
    match section {
        Value::Array(list) => {
            let mut named = Map::new();
            for (idx, entry) in list.iter().enumerate() {
                let key = format!("{prefix}{idx}");
                let rendered = entry_by_name(entry, &key);
                insert_positional(&mut named, key, idx, rendered);
            }
            Value::Object(named)
        }
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, entry)| (key.clone(), entry_by_name(entry, key)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Exact inverse of [`index_by_name`]; map iteration order becomes list order.
pub fn index_by_number(section: &Value) -> Value {
    match section {
        Value::Object(map) => Value::Array(map.values().map(entry_by_number).collect()),
        Value::Array(list) => Value::Array(list.iter().map(entry_by_number).collect()),
        other => other.clone(),
    }
}

pub fn index_document_by_name(tree: &Value) -> Value {
    let mut tree = tree.clone();
    if let Some(object) = tree.as_object_mut() {
        for kind in SectionKind::ALL {
            if let Some(section) = object.get(kind.json_key()) {
                let indexed = index_by_name(section, kind.as_str());
                object.insert(kind.json_key().to_string(), indexed);
            }
        }
    }
    tree
}

pub fn index_document_by_number(tree: &Value) -> Value {
    let mut tree = tree.clone();
    if let Some(object) = tree.as_object_mut() {
        for kind in SectionKind::ALL {
            if let Some(section) = object.get(kind.json_key()) {
                let indexed = index_by_number(section);
                object.insert(kind.json_key().to_string(), indexed);
            }
        }
    }
    tree
}
