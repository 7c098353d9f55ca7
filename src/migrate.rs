//! Upgrades on-disk metadata trees to LiPD 1.3.
//!
//! Each version step only runs when the detected version calls for it, so an
//! already-current document passes through unchanged apart from the
//! unconditional publication clean-up.

use log::{debug, info};
use serde_json::{Map, Value, json};

use crate::{
    error::CoreError,
    model::{KEY_COLUMNS, KEY_MODEL, SectionKind, TableKind},
};

pub const KEY_LIPD_VERSION: &str = "lipdVersion";
const KEY_PUB: &str = "pub";
const KEY_IDENTIFIER: &str = "identifier";
const KEY_INTERPRETATION: &str = "interpretation";
const DOI_URL_PREFIX: &str = "http://dx.doi.org/";
pub const CURRENT_VERSION_NUMBER: f64 = 1.3;

/// Legacy key → 1.3 key.
const RENAMES: &[(&str, &str)] = &[
    ("paleoMeasurementTable", "measurementTable"),
    ("chronMeasurementTable", "measurementTable"),
    ("paleoModel", "model"),
    ("chronModel", "model"),
    ("paleoDataTableName", "tableName"),
    ("chronTableName", "tableName"),
    ("paleoMeasurementTableName", "tableName"),
    ("chronMeasurementTableName", "tableName"),
    ("measurementTableName", "tableName"),
    ("paleoMeasurementTableMD5", "measurementTableMD5"),
    ("chronMeasurementTableMD5", "measurementTableMD5"),
    ("paleoDataMD5", "measurementTableMD5"),
    ("chronDataMD5", "measurementTableMD5"),
    ("chronEnsembleTable", "ensembleTable"),
    ("chronSummaryTable", "summaryTable"),
    ("chronDistributionTable", "distributionTable"),
];

const LEGACY_INTERPRETATIONS: &[&str] = &["climateInterpretation", "isotopeInterpretation"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LipdVersion {
    V1_0,
    V1_1,
    V1_2,
    V1_3,
}

impl LipdVersion {
    pub const CURRENT: LipdVersion = LipdVersion::V1_3;

    pub fn as_str(&self) -> &'static str {
        match self {
            LipdVersion::V1_0 => "1.0",
            LipdVersion::V1_1 => "1.1",
            LipdVersion::V1_2 => "1.2",
            LipdVersion::V1_3 => "1.3",
        }
    }

    fn parse(raw: &str) -> Option<LipdVersion> {
        let number = raw.trim().parse::<f64>().ok()?;
        [
            LipdVersion::V1_0,
            LipdVersion::V1_1,
            LipdVersion::V1_2,
            LipdVersion::V1_3,
        ]
        .into_iter()
        .find(|version| {
            version
                .as_str()
                .parse::<f64>()
                .is_ok_and(|known| (known - number).abs() < 1e-9)
        })
    }
}

/// A missing `lipdVersion` is read as 1.0.
pub fn detect_version(tree: &Value) -> Result<LipdVersion, CoreError> {
    let raw = match tree.get(KEY_LIPD_VERSION) {
        None | Some(Value::Null) => return Ok(LipdVersion::V1_0),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    };
    LipdVersion::parse(&raw).ok_or(CoreError::SchemaVersionUnrecognized { version: raw })
}

pub fn migrate(tree: Value) -> Result<Value, CoreError> {
    let version = detect_version(&tree)?;
    let mut tree = tree;
    if version < LipdVersion::CURRENT {
        info!("Upgrading metadata from LiPD {} to {}", version.as_str(), LipdVersion::CURRENT.as_str());
    }
    if version <= LipdVersion::V1_0 {
        wrap_bare_tables(&mut tree, SectionKind::Chron, "chronMeasurementTable");
    }
    if version <= LipdVersion::V1_1 {
        wrap_bare_tables(&mut tree, SectionKind::Paleo, "paleoMeasurementTable");
    }
    if version <= LipdVersion::V1_2 {
        tree = rename_keys(tree);
        merge_interpretations(&mut tree);
        wrap_bare_model_tables(&mut tree);
    }
    normalize_publications(&mut tree);
    if let Some(object) = tree.as_object_mut() {
        object.insert(KEY_LIPD_VERSION.to_string(), json!(CURRENT_VERSION_NUMBER));
    }
    Ok(tree)
}

fn is_bare_table(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|object| object.contains_key(KEY_COLUMNS))
}

fn wrap_bare_tables(tree: &mut Value, section: SectionKind, table_key: &str) {
    let Some(object) = tree.as_object_mut() else {
        return;
    };
    let Some(raw) = object.shift_remove(section.json_key()) else {
        return;
    };
    let entries = match raw {
        Value::Array(entries) => entries,
        Value::Null => return,
        single => vec![single],
    };
    let wrapped = entries
        .into_iter()
        .map(|entry| {
            if is_bare_table(&entry) {
                debug!("Wrapping bare {} table into '{table_key}'", section.as_str());
                let mut holder = Map::new();
                holder.insert(table_key.to_string(), Value::Array(vec![entry]));
                Value::Object(holder)
            } else {
                entry
            }
        })
        .collect();
    object.insert(section.json_key().to_string(), Value::Array(wrapped));
}

fn renamed(key: &str) -> &str {
    RENAMES
        .iter()
        .find(|(legacy, _)| *legacy == key)
        .map(|(_, current)| *current)
        .unwrap_or(key)
}

pub fn rename_keys(value: Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut out = Map::with_capacity(object.len());
            for (key, child) in object {
                let key = renamed(&key).to_string();
                let child = rename_keys(child);
                if !out.contains_key(&key) {
                    out.insert(key, child);
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(rename_keys).collect()),
        other => other,
    }
}

fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    }
}

/// Folds the legacy interpretation blocks of every object into one
/// `interpretation` list.
pub fn merge_interpretations(value: &mut Value) {
    match value {
        Value::Object(object) => {
            let mut merged: Option<Vec<Value>> = None;
            for legacy in LEGACY_INTERPRETATIONS {
                if let Some(block) = object.shift_remove(*legacy) {
                    let list = merged.get_or_insert_with(|| {
                        object
                            .shift_remove(KEY_INTERPRETATION)
                            .map(as_list)
                            .unwrap_or_default()
                    });
                    list.extend(as_list(block));
                }
            }
            if let Some(list) = merged {
                object.insert(KEY_INTERPRETATION.to_string(), Value::Array(list));
            }
            for child in object.values_mut() {
                merge_interpretations(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(merge_interpretations),
        _ => {}
    }
}

fn wrap_in_list(object: &mut Map<String, Value>, key: &str) {
    if let Some(value) = object.get_mut(key)
        && value.is_object()
    {
        let single = value.take();
        *value = Value::Array(vec![single]);
    }
}

fn wrap_bare_model_tables(tree: &mut Value) {
    let Some(object) = tree.as_object_mut() else {
        return;
    };
    for section in SectionKind::ALL {
        let Some(Value::Array(entries)) = object.get_mut(section.json_key()) else {
            continue;
        };
        for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
            wrap_in_list(entry, TableKind::Measurement.json_key());
            wrap_in_list(entry, KEY_MODEL);
            let Some(Value::Array(models)) = entry.get_mut(KEY_MODEL) else {
                continue;
            };
            for model in models.iter_mut().filter_map(Value::as_object_mut) {
                wrap_in_list(model, TableKind::Summary.json_key());
                wrap_in_list(model, TableKind::Ensemble.json_key());
                let bare_distribution = model
                    .get(TableKind::Distribution.json_key())
                    .is_some_and(is_bare_table);
                if bare_distribution {
                    wrap_in_list(model, TableKind::Distribution.json_key());
                }
            }
        }
    }
}

fn has_doi_identifier(publication: &Map<String, Value>) -> bool {
    publication
        .get(KEY_IDENTIFIER)
        .and_then(Value::as_array)
        .is_some_and(|ids| {
            ids.iter().any(|id| {
                id.get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|kind| kind.eq_ignore_ascii_case("doi"))
            })
        })
}

/// Moves bare `DOI` fields into the `identifier` list and renames `pubYear`.
pub fn normalize_publications(tree: &mut Value) {
    let Some(Value::Array(publications)) = tree.get_mut(KEY_PUB) else {
        return;
    };
    for publication in publications.iter_mut().filter_map(Value::as_object_mut) {
        let doi = ["DOI", "doi"]
            .iter()
            .filter_map(|key| publication.shift_remove(*key))
            .collect::<Vec<_>>()
            .into_iter()
            .find_map(|value| value.as_str().map(|s| s.trim().to_string()))
            .filter(|doi| !doi.is_empty());
        if let Some(doi) = doi
            && !has_doi_identifier(publication)
        {
            let entry = json!({
                "type": "doi",
                "id": doi,
                "url": format!("{DOI_URL_PREFIX}{doi}"),
            });
            let mut identifiers = publication
                .shift_remove(KEY_IDENTIFIER)
                .map(as_list)
                .unwrap_or_default();
            identifiers.push(entry);
            publication.insert(KEY_IDENTIFIER.to_string(), Value::Array(identifiers));
        }
        if let Some(year) = publication.shift_remove("pubYear")
            && !publication.contains_key("year")
        {
            publication.insert("year".to_string(), year);
        }
    }
}
