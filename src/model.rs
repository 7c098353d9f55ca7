//! Typed LiPD document model.
//!
//! A [`Document`] owns two [`Section`]s (`paleoData`, `chronData`), each an
//! ordered map of [`SectionEntry`] values holding measurement tables and
//! models. Collections are [`NamedMap`]s: insertion-ordered, with colliding
//! names suffixed `-1`, `-2`, … so nothing is overwritten.
//!
//! The model is built from and rendered to the name-indexed JSON tree (see
//! [`crate::reindex`]). Keys the engine does not interpret are carried in the
//! `extra` maps of each level and written back unchanged.

use std::{collections::BTreeMap, convert::Infallible, fmt};

use log::warn;
use serde_json::{Map, Value};

use crate::{
    crumbs::TableCrumbs,
    data::ColumnValues,
    error::{CoreError, Diagnostics},
    reindex,
    stats::ColumnStatistics,
};

pub const KEY_DATASET_NAME: &str = "dataSetName";
pub const KEY_TABLE_NAME: &str = "tableName";
pub const KEY_FILENAME: &str = "filename";
pub const KEY_MISSING_VALUE: &str = "missingValue";
pub const KEY_COLUMNS: &str = "columns";
pub const KEY_VARIABLE_NAME: &str = "variableName";
pub const KEY_NUMBER: &str = "number";
pub const KEY_VALUES: &str = "values";
pub const KEY_MODEL: &str = "model";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SectionKind {
    Paleo,
    Chron,
}

impl SectionKind {
    pub const ALL: [SectionKind; 2] = [SectionKind::Paleo, SectionKind::Chron];

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Paleo => "paleo",
            SectionKind::Chron => "chron",
        }
    }

    pub fn json_key(&self) -> &'static str {
        match self {
            SectionKind::Paleo => "paleoData",
            SectionKind::Chron => "chronData",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TableKind {
    Measurement,
    Summary,
    Ensemble,
    Distribution,
}

impl TableKind {
    pub const MODEL_KINDS: [TableKind; 3] =
        [TableKind::Summary, TableKind::Ensemble, TableKind::Distribution];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableKind::Measurement => "measurement",
            TableKind::Summary => "summary",
            TableKind::Ensemble => "ensemble",
            TableKind::Distribution => "distribution",
        }
    }

    pub fn json_key(&self) -> &'static str {
        match self {
            TableKind::Measurement => "measurementTable",
            TableKind::Summary => "summaryTable",
            TableKind::Ensemble => "ensembleTable",
            TableKind::Distribution => "distributionTable",
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `name`, or `name-N` for the first `N` not yet taken.
pub fn suffixed_name<F>(name: &str, taken: F) -> String
where
    F: Fn(&str) -> bool,
{
    if !taken(name) {
        return name.to_string();
    }
    let mut counter = 1usize;
    loop {
        let candidate = format!("{name}-{counter}");
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Insertion-ordered map keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedMap<T> {
    entries: Vec<(String, T)>,
}

impl<T> Default for NamedMap<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> NamedMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|(key, _)| key == name)
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries
            .iter_mut()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    /// Inserts under `name`, or under a `-N` suffixed name when `name` is
    /// taken. Returns the key actually used.
    pub fn insert_unique(&mut self, name: impl AsRef<str>, value: T) -> String {
        let key = suffixed_name(name.as_ref(), |candidate| self.contains_key(candidate));
        self.entries.push((key.clone(), value));
        key
    }

    /// Inserts or replaces in place, keeping the original position.
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Option<T> {
        let name = name.into();
        match self.position(&name) {
            Some(idx) => Some(std::mem::replace(&mut self.entries[idx].1, value)),
            None => {
                self.entries.push((name, value));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        let idx = self.position(name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.entries.iter_mut().map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.entries
            .iter_mut()
            .map(|(key, value)| (key.as_str(), value))
    }
}

impl<T> IntoIterator for NamedMap<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<K: AsRef<str>, T> FromIterator<(K, T)> for NamedMap<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut map = NamedMap::new();
        for (key, value) in iter {
            map.insert_unique(key, value);
        }
        map
    }
}

/// Column number on disk: one 1-based slot, or the slots of every
/// realization of an ensemble column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnNumber {
    Single(usize),
    Ensemble(Vec<usize>),
}

impl ColumnNumber {
    pub fn is_ensemble(&self) -> bool {
        matches!(self, ColumnNumber::Ensemble(_))
    }

    pub fn to_json(&self) -> Value {
        match self {
            ColumnNumber::Single(n) => Value::from(*n),
            ColumnNumber::Ensemble(numbers) => {
                Value::Array(numbers.iter().map(|n| Value::from(*n)).collect())
            }
        }
    }

    /// Accepts integers, integral floats and numeric strings.
    pub fn from_json(value: &Value) -> Option<ColumnNumber> {
        match value {
            Value::Array(items) => items
                .iter()
                .map(parse_slot)
                .collect::<Option<Vec<_>>>()
                .map(ColumnNumber::Ensemble),
            other => parse_slot(other).map(ColumnNumber::Single),
        }
    }
}

fn parse_slot(value: &Value) -> Option<usize> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (number.is_finite() && number >= 1.0 && number.fract() == 0.0).then_some(number as usize)
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Column {
    pub variable_name: String,
    pub number: Option<ColumnNumber>,
    pub values: Option<ColumnValues>,
    pub missing_value: Option<String>,
    pub statistics: Option<ColumnStatistics>,
    pub extra: Map<String, Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, number: usize) -> Self {
        Column {
            variable_name: name.into(),
            number: Some(ColumnNumber::Single(number)),
            ..Column::default()
        }
    }

    pub fn ensemble(name: impl Into<String>, numbers: Vec<usize>) -> Self {
        Column {
            variable_name: name.into(),
            number: Some(ColumnNumber::Ensemble(numbers)),
            ..Column::default()
        }
    }

    pub fn with_values(mut self, values: ColumnValues) -> Self {
        self.values = Some(values);
        self
    }

    pub fn is_ensemble(&self) -> bool {
        self.number.as_ref().is_some_and(ColumnNumber::is_ensemble)
    }

    pub fn extra_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(Value::as_str)
    }

    pub fn from_json(key: &str, value: &Value) -> Result<Column, CoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| CoreError::malformed(key, "column is not an object"))?;
        let mut extra = object.clone();
        let variable_name = match extra.shift_remove(KEY_VARIABLE_NAME) {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            _ => key.to_string(),
        };
        let number = match extra.get(KEY_NUMBER).map(ColumnNumber::from_json) {
            Some(Some(parsed)) => {
                extra.shift_remove(KEY_NUMBER);
                Some(parsed)
            }
            Some(None) => {
                warn!("Column '{variable_name}' has an unreadable number; keeping it verbatim");
                None
            }
            None => None,
        };
        let values = extra
            .shift_remove(KEY_VALUES)
            .as_ref()
            .and_then(ColumnValues::from_json);
        let missing_value = match extra.shift_remove(KEY_MISSING_VALUE) {
            Some(Value::String(marker)) => Some(marker),
            Some(Value::Number(marker)) => Some(marker.to_string()),
            _ => None,
        };
        let statistics = ColumnStatistics::take_from(&mut extra);
        Ok(Column {
            variable_name,
            number,
            values,
            missing_value,
            statistics,
            extra,
        })
    }

    pub fn to_json(&self, include_values: bool) -> Value {
        let mut object = Map::new();
        object.insert(
            KEY_VARIABLE_NAME.to_string(),
            Value::String(self.variable_name.clone()),
        );
        if let Some(number) = &self.number {
            object.insert(KEY_NUMBER.to_string(), number.to_json());
        }
        for (key, value) in &self.extra {
            object.insert(key.clone(), value.clone());
        }
        if let Some(marker) = &self.missing_value {
            object.insert(KEY_MISSING_VALUE.to_string(), Value::String(marker.clone()));
        }
        if let Some(statistics) = &self.statistics {
            statistics.write_into(&mut object);
        }
        if include_values && let Some(values) = &self.values {
            object.insert(KEY_VALUES.to_string(), values.to_json());
        }
        Value::Object(object)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    pub filename: Option<String>,
    pub missing_value: Option<String>,
    pub columns: NamedMap<Column>,
    pub extra: Map<String, Value>,
}

impl Table {
    pub fn is_ensemble(&self) -> bool {
        self.columns.values().any(Column::is_ensemble)
    }

    pub fn row_count(&self) -> usize {
        self.columns
            .values()
            .filter_map(|column| column.values.as_ref())
            .map(ColumnValues::row_count)
            .max()
            .unwrap_or(0)
    }

    pub fn has_values(&self) -> bool {
        self.columns.values().any(|column| column.values.is_some())
    }

    pub fn without_values(&self) -> Table {
        let mut table = self.clone();
        for column in table.columns.values_mut() {
            column.values = None;
        }
        table
    }

    pub fn from_json(key: &str, value: &Value) -> Result<Table, CoreError> {
        let object = value
            .as_object()
            .ok_or_else(|| CoreError::malformed(key, "table is not an object"))?;
        let mut extra = object.clone();
        let filename = match extra.shift_remove(KEY_FILENAME) {
            Some(Value::String(name)) if !name.trim().is_empty() => Some(name),
            _ => None,
        };
        let missing_value = match extra.shift_remove(KEY_MISSING_VALUE) {
            Some(Value::String(marker)) => Some(marker),
            Some(Value::Number(marker)) => Some(marker.to_string()),
            _ => None,
        };
        let raw_columns = match extra.shift_remove(KEY_COLUMNS) {
            Some(Value::Object(map)) => reindex::collapse_column_entries(&map),
            Some(Value::Array(list)) => list,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(CoreError::malformed(key, "columns is neither a map nor a list")),
        };
        let mut columns = NamedMap::new();
        for (idx, raw) in raw_columns.iter().enumerate() {
            let fallback = format!("column{idx}");
            let mut column = Column::from_json(&fallback, raw)
                .map_err(|err| CoreError::malformed(key, err.to_string()))?;
            let name = column.variable_name.clone();
            let used = suffixed_name(&name, |candidate| columns.contains_key(candidate));
            column.variable_name = used.clone();
            columns.insert(used, column);
        }
        Ok(Table {
            filename,
            missing_value,
            columns,
            extra,
        })
    }

    /// Renders the name-indexed form; ensemble columns are expanded into
    /// their per-realization entries.
    pub fn to_json(&self, include_values: bool) -> Value {
        let mut object = Map::new();
        for (key, value) in &self.extra {
            object.insert(key.clone(), value.clone());
        }
        if let Some(filename) = &self.filename {
            object.insert(KEY_FILENAME.to_string(), Value::String(filename.clone()));
        }
        if let Some(marker) = &self.missing_value {
            object.insert(KEY_MISSING_VALUE.to_string(), Value::String(marker.clone()));
        }
        let mut columns = Map::new();
        for column in self.columns.values() {
            let rendered = column.to_json(include_values);
            if column.is_ensemble() {
                for (key, entry) in reindex::expand_ensemble_column(&column.variable_name, &rendered) {
                    reindex::insert_suffixed(&mut columns, &key, entry);
                }
            } else {
                reindex::insert_suffixed(&mut columns, &column.variable_name, rendered);
            }
        }
        object.insert(KEY_COLUMNS.to_string(), Value::Object(columns));
        Value::Object(object)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Model {
    pub summary_tables: NamedMap<Table>,
    pub ensemble_tables: NamedMap<Table>,
    pub distribution_tables: NamedMap<Table>,
    pub extra: Map<String, Value>,
}

impl Model {
    pub fn tables(&self, kind: TableKind) -> Option<&NamedMap<Table>> {
        match kind {
            TableKind::Summary => Some(&self.summary_tables),
            TableKind::Ensemble => Some(&self.ensemble_tables),
            TableKind::Distribution => Some(&self.distribution_tables),
            TableKind::Measurement => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SectionEntry {
    pub measurement_tables: NamedMap<Table>,
    pub models: NamedMap<Model>,
    pub extra: Map<String, Value>,
}

pub type Section = NamedMap<SectionEntry>;

/// Where a table sits in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLocation {
    pub crumbs: TableCrumbs,
    pub entry: String,
    pub model: Option<String>,
    pub name: String,
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.crumbs)?;
        if self.name != self.crumbs.to_string() {
            write!(f, " ({})", self.name)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub name: String,
    pub metadata: Map<String, Value>,
    pub paleo: Section,
    pub chron: Section,
}

impl Document {
    pub fn section(&self, kind: SectionKind) -> &Section {
        match kind {
            SectionKind::Paleo => &self.paleo,
            SectionKind::Chron => &self.chron,
        }
    }

    /// Builds the typed document from a name-indexed tree. Tables and
    /// columns that cannot be read are reported and skipped.
    pub fn from_named_tree(tree: &Value, fallback_name: &str) -> (Document, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let mut metadata = tree.as_object().cloned().unwrap_or_default();
        let name = match metadata.get(KEY_DATASET_NAME) {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            _ => {
                diagnostics.push(CoreError::malformed(
                    KEY_DATASET_NAME,
                    format!("missing dataset name, using '{fallback_name}'"),
                ));
                fallback_name.to_string()
            }
        };
        metadata.insert(KEY_DATASET_NAME.to_string(), Value::String(name.clone()));

        let mut sections = BTreeMap::new();
        for kind in SectionKind::ALL {
            let section = match metadata.shift_remove(kind.json_key()) {
                Some(value) => section_from_json(kind, &value, &mut diagnostics),
                None => Section::new(),
            };
            sections.insert(kind, section);
        }
        let document = Document {
            name,
            metadata,
            paleo: sections.remove(&SectionKind::Paleo).unwrap_or_default(),
            chron: sections.remove(&SectionKind::Chron).unwrap_or_default(),
        };
        (document, diagnostics)
    }

    pub fn to_named_tree(&self, include_values: bool) -> Value {
        let mut object = Map::new();
        for (key, value) in &self.metadata {
            object.insert(key.clone(), value.clone());
        }
        object.insert(KEY_DATASET_NAME.to_string(), Value::String(self.name.clone()));
        for kind in SectionKind::ALL {
            let section = self.section(kind);
            if !section.is_empty() {
                object.insert(
                    kind.json_key().to_string(),
                    section_to_json(section, include_values),
                );
            }
        }
        Value::Object(object)
    }

    /// Copy of the document with every `values` array stripped.
    pub fn metadata_only(&self) -> Document {
        self.clone().map_tables(|_, table| table.without_values())
    }

    /// Values per table filename, keyed by column name.
    pub fn csv_store(&self) -> BTreeMap<String, NamedMap<ColumnValues>> {
        let mut store = BTreeMap::new();
        for (_, table) in self.tables() {
            let Some(filename) = &table.filename else {
                continue;
            };
            let columns = table
                .columns
                .iter()
                .filter_map(|(name, column)| column.values.clone().map(|values| (name, values)))
                .collect::<NamedMap<_>>();
            store.insert(filename.clone(), columns);
        }
        store
    }

    pub fn tables(&self) -> Vec<(TableLocation, &Table)> {
        let mut found = Vec::new();
        for kind in SectionKind::ALL {
            for (section_index, (entry_name, entry)) in self.section(kind).iter().enumerate() {
                for (table_index, (name, table)) in entry.measurement_tables.iter().enumerate() {
                    found.push((
                        TableLocation {
                            crumbs: TableCrumbs::measurement(kind, section_index, table_index),
                            entry: entry_name.to_string(),
                            model: None,
                            name: name.to_string(),
                        },
                        table,
                    ));
                }
                for (model_index, (model_name, model)) in entry.models.iter().enumerate() {
                    for table_kind in TableKind::MODEL_KINDS {
                        let Some(tables) = model.tables(table_kind) else {
                            continue;
                        };
                        for (table_index, (name, table)) in tables.iter().enumerate() {
                            found.push((
                                TableLocation {
                                    crumbs: TableCrumbs::model(
                                        kind,
                                        section_index,
                                        model_index,
                                        table_kind,
                                        table_index,
                                    ),
                                    entry: entry_name.to_string(),
                                    model: Some(model_name.to_string()),
                                    name: name.to_string(),
                                },
                                table,
                            ));
                        }
                    }
                }
            }
        }
        found
    }

    pub fn map_tables<F>(self, mut f: F) -> Document
    where
        F: FnMut(&TableLocation, Table) -> Table,
    {
        match self.try_map_tables(|location, table| Ok::<_, Infallible>(f(location, table))) {
            Ok(document) => document,
            Err(never) => match never {},
        }
    }

    /// Rebuilds the document, passing every table through `f` in document
    /// order. Stops at the first error.
    pub fn try_map_tables<E, F>(self, mut f: F) -> Result<Document, E>
    where
        F: FnMut(&TableLocation, Table) -> Result<Table, E>,
    {
        let Document {
            name,
            metadata,
            paleo,
            chron,
        } = self;
        let paleo = map_section(SectionKind::Paleo, paleo, &mut f)?;
        let chron = map_section(SectionKind::Chron, chron, &mut f)?;
        Ok(Document {
            name,
            metadata,
            paleo,
            chron,
        })
    }
}

fn map_section<E, F>(kind: SectionKind, section: Section, f: &mut F) -> Result<Section, E>
where
    F: FnMut(&TableLocation, Table) -> Result<Table, E>,
{
    let mut mapped = Section::new();
    for (section_index, (entry_name, entry)) in section.into_iter().enumerate() {
        let SectionEntry {
            measurement_tables,
            models,
            extra,
        } = entry;
        let mut tables = NamedMap::new();
        for (table_index, (name, table)) in measurement_tables.into_iter().enumerate() {
            let location = TableLocation {
                crumbs: TableCrumbs::measurement(kind, section_index, table_index),
                entry: entry_name.clone(),
                model: None,
                name: name.clone(),
            };
            tables.insert(name, f(&location, table)?);
        }
        let mut mapped_models = NamedMap::new();
        for (model_index, (model_name, model)) in models.into_iter().enumerate() {
            let Model {
                summary_tables,
                ensemble_tables,
                distribution_tables,
                extra: model_extra,
            } = model;
            let mut map_kind = |table_kind: TableKind, tables: NamedMap<Table>| {
                let mut out = NamedMap::new();
                for (table_index, (name, table)) in tables.into_iter().enumerate() {
                    let location = TableLocation {
                        crumbs: TableCrumbs::model(
                            kind,
                            section_index,
                            model_index,
                            table_kind,
                            table_index,
                        ),
                        entry: entry_name.clone(),
                        model: Some(model_name.clone()),
                        name: name.clone(),
                    };
                    out.insert(name, f(&location, table)?);
                }
                Ok::<_, E>(out)
            };
            let summary_tables = map_kind(TableKind::Summary, summary_tables)?;
            let ensemble_tables = map_kind(TableKind::Ensemble, ensemble_tables)?;
            let distribution_tables = map_kind(TableKind::Distribution, distribution_tables)?;
            mapped_models.insert(
                model_name,
                Model {
                    summary_tables,
                    ensemble_tables,
                    distribution_tables,
                    extra: model_extra,
                },
            );
        }
        mapped.insert(
            entry_name,
            SectionEntry {
                measurement_tables: tables,
                models: mapped_models,
                extra,
            },
        );
    }
    Ok(mapped)
}

fn named_entries(value: &Value) -> Vec<(String, Value)> {
    match value {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx.to_string(), v.clone()))
            .collect(),
        _ => Vec::new(),
    }
}

fn tables_from_json(value: &Value, diagnostics: &mut Diagnostics) -> NamedMap<Table> {
    let mut tables = NamedMap::new();
    for (key, raw) in named_entries(value) {
        match Table::from_json(&key, &raw) {
            Ok(table) => {
                tables.insert_unique(key, table);
            }
            Err(err) => diagnostics.push(err),
        }
    }
    tables
}

fn section_from_json(kind: SectionKind, value: &Value, diagnostics: &mut Diagnostics) -> Section {
    let mut section = Section::new();
    for (key, raw) in named_entries(value) {
        let Some(object) = raw.as_object() else {
            diagnostics.push(CoreError::malformed(
                format!("{}/{key}", kind.json_key()),
                "section entry is not an object",
            ));
            continue;
        };
        let mut extra = object.clone();
        let measurement_tables = extra
            .shift_remove(TableKind::Measurement.json_key())
            .map(|tables| tables_from_json(&tables, diagnostics))
            .unwrap_or_default();
        let mut models = NamedMap::new();
        if let Some(raw_models) = extra.shift_remove(KEY_MODEL) {
            for (model_key, raw_model) in named_entries(&raw_models) {
                let Some(model_object) = raw_model.as_object() else {
                    diagnostics.push(CoreError::malformed(
                        format!("{key}/{model_key}"),
                        "model is not an object",
                    ));
                    continue;
                };
                let mut model_extra = model_object.clone();
                let mut take = |table_kind: TableKind| {
                    model_extra
                        .shift_remove(table_kind.json_key())
                        .map(|tables| tables_from_json(&tables, diagnostics))
                        .unwrap_or_default()
                };
                let summary_tables = take(TableKind::Summary);
                let ensemble_tables = take(TableKind::Ensemble);
                let distribution_tables = take(TableKind::Distribution);
                models.insert_unique(
                    model_key,
                    Model {
                        summary_tables,
                        ensemble_tables,
                        distribution_tables,
                        extra: model_extra,
                    },
                );
            }
        }
        section.insert_unique(
            key,
            SectionEntry {
                measurement_tables,
                models,
                extra,
            },
        );
    }
    section
}

fn tables_to_json(tables: &NamedMap<Table>, include_values: bool) -> Value {
    Value::Object(
        tables
            .iter()
            .map(|(name, table)| (name.to_string(), table.to_json(include_values)))
            .collect(),
    )
}

fn section_to_json(section: &Section, include_values: bool) -> Value {
    let mut entries = Map::new();
    for (name, entry) in section.iter() {
        let mut object = entry.extra.clone();
        if !entry.measurement_tables.is_empty() {
            object.insert(
                TableKind::Measurement.json_key().to_string(),
                tables_to_json(&entry.measurement_tables, include_values),
            );
        }
        if !entry.models.is_empty() {
            let mut models = Map::new();
            for (model_name, model) in entry.models.iter() {
                let mut model_object = model.extra.clone();
                for table_kind in TableKind::MODEL_KINDS {
                    if let Some(tables) = model.tables(table_kind)
                        && !tables.is_empty()
                    {
                        model_object.insert(
                            table_kind.json_key().to_string(),
                            tables_to_json(tables, include_values),
                        );
                    }
                }
                models.insert(model_name.to_string(), Value::Object(model_object));
            }
            object.insert(KEY_MODEL.to_string(), Value::Object(models));
        }
        entries.insert(name.to_string(), Value::Object(object));
    }
    Value::Object(entries)
}
