//! Per-column summary statistics attached during ingest.
//!
//! Every column with numeric content receives `hasMinValue`, `hasMaxValue`,
//! `hasMeanValue` and `hasMedianValue`. When the table carries an age or year
//! axis, other columns also receive `hasResolution`: the same four
//! statistics over successive axis differences, taken only at rows where
//! the column itself has data.

use log::{debug, warn};
use serde_json::{Map, Number, Value};

use crate::{
    data::{Cell, ColumnValues, MISSING_MARKER},
    model::{Column, SectionKind, Table},
};

pub const KEY_MIN: &str = "hasMinValue";
pub const KEY_MAX: &str = "hasMaxValue";
pub const KEY_MEAN: &str = "hasMeanValue";
pub const KEY_MEDIAN: &str = "hasMedianValue";
pub const KEY_RESOLUTION: &str = "hasResolution";

const AXIS_NAMES: &[&str] = &["age", "year", "yrbp"];
const AXIS_TYPES: &[&str] = &["age", "year"];
const KEY_INFERRED_TYPE: &str = "inferredVariableType";

/// A statistic, or the `"nan"` placeholder when it cannot be computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatValue {
    Value(f64),
    Nan,
}

impl StatValue {
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            StatValue::Value(value)
        } else {
            StatValue::Nan
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StatValue::Value(v) => Some(*v),
            StatValue::Nan => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            StatValue::Value(v) => Number::from_f64(*v)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(MISSING_MARKER.to_string())),
            StatValue::Nan => Value::String(MISSING_MARKER.to_string()),
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_f64().map(StatValue::from_f64),
            Value::String(s) => Some(
                s.trim()
                    .parse::<f64>()
                    .map(StatValue::from_f64)
                    .unwrap_or(StatValue::Nan),
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: StatValue,
    pub max: StatValue,
    pub mean: StatValue,
    pub median: StatValue,
}

impl Summary {
    pub fn placeholder() -> Self {
        Summary {
            min: StatValue::Nan,
            max: StatValue::Nan,
            mean: StatValue::Nan,
            median: StatValue::Nan,
        }
    }

    /// Summary over the finite entries of `values`.
    pub fn of(values: &[f64]) -> Self {
        let mut finite = values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .collect::<Vec<_>>();
        if finite.is_empty() {
            return Summary::placeholder();
        }
        finite.sort_by(f64::total_cmp);
        let count = finite.len();
        let mean = finite.iter().sum::<f64>() / count as f64;
        let mid = count / 2;
        let median = if count.is_multiple_of(2) {
            (finite[mid - 1] + finite[mid]) / 2.0
        } else {
            finite[mid]
        };
        Summary {
            min: StatValue::from_f64(finite[0]),
            max: StatValue::from_f64(finite[count - 1]),
            mean: StatValue::from_f64(mean),
            median: StatValue::from_f64(median),
        }
    }

    fn write_into(&self, object: &mut Map<String, Value>) {
        object.insert(KEY_MIN.to_string(), self.min.to_json());
        object.insert(KEY_MAX.to_string(), self.max.to_json());
        object.insert(KEY_MEAN.to_string(), self.mean.to_json());
        object.insert(KEY_MEDIAN.to_string(), self.median.to_json());
    }

    fn take_from(object: &mut Map<String, Value>) -> Option<Self> {
        let min = object.shift_remove(KEY_MIN);
        let max = object.shift_remove(KEY_MAX);
        let mean = object.shift_remove(KEY_MEAN);
        let median = object.shift_remove(KEY_MEDIAN);
        if min.is_none() && max.is_none() && mean.is_none() && median.is_none() {
            return None;
        }
        let read = |value: Option<Value>| {
            value
                .as_ref()
                .and_then(StatValue::from_json)
                .unwrap_or(StatValue::Nan)
        };
        Some(Summary {
            min: read(min),
            max: read(max),
            mean: read(mean),
            median: read(median),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStatistics {
    pub summary: Summary,
    pub resolution: Option<Summary>,
}

impl ColumnStatistics {
    pub fn write_into(&self, object: &mut Map<String, Value>) {
        self.summary.write_into(object);
        if let Some(resolution) = &self.resolution {
            let mut nested = Map::new();
            resolution.write_into(&mut nested);
            object.insert(KEY_RESOLUTION.to_string(), Value::Object(nested));
        }
    }

    /// Removes statistic keys from a raw column object and parses them.
    pub fn take_from(object: &mut Map<String, Value>) -> Option<Self> {
        let summary = Summary::take_from(object);
        let resolution = match object.shift_remove(KEY_RESOLUTION) {
            Some(Value::Object(mut nested)) => Summary::take_from(&mut nested),
            Some(other) => {
                object.insert(KEY_RESOLUTION.to_string(), other);
                None
            }
            None => None,
        };
        match (summary, resolution) {
            (None, None) => None,
            (summary, resolution) => Some(ColumnStatistics {
                summary: summary.unwrap_or_else(Summary::placeholder),
                resolution,
            }),
        }
    }
}

fn loosely_matches_axis(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    AXIS_NAMES.iter().any(|token| lowered.contains(token))
}

/// Finds the age/year axis column: exact name, then declared
/// `inferredVariableType`, then a loose name match.
pub fn find_axis(table: &Table) -> Option<&str> {
    let numeric = |column: &Column| {
        column
            .values
            .as_ref()
            .and_then(ColumnValues::as_vector)
            .is_some()
    };
    let exact = table.columns.iter().find(|&(name, column)| {
        numeric(column) && AXIS_NAMES.contains(&name.to_ascii_lowercase().as_str())
    });
    if let Some((name, _)) = exact {
        return Some(name);
    }
    let declared = table.columns.iter().find(|&(_, column)| {
        numeric(column)
            && column
                .extra_str(KEY_INFERRED_TYPE)
                .is_some_and(|kind| AXIS_TYPES.contains(&kind.trim().to_ascii_lowercase().as_str()))
    });
    if let Some((name, _)) = declared {
        return Some(name);
    }
    table
        .columns
        .iter()
        .find(|&(name, column)| numeric(column) && loosely_matches_axis(name))
        .map(|(name, _)| name)
}

/// Successive differences of the axis at rows where `column` has data.
pub fn resolution_steps(column: &[Cell], axis: &[Cell]) -> Vec<f64> {
    let aligned = column
        .iter()
        .zip(axis)
        .filter(|(cell, _)| !cell.as_f64_or_nan().is_nan())
        .map(|(_, axis_cell)| axis_cell.as_f64_or_nan())
        .collect::<Vec<_>>();
    aligned
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|step| !step.is_nan())
        .collect()
}

pub fn column_statistics(
    name: &str,
    values: &[Cell],
    axis: Option<&[Cell]>,
) -> Option<ColumnStatistics> {
    if values.is_empty() {
        return Some(ColumnStatistics {
            summary: Summary::placeholder(),
            resolution: None,
        });
    }
    if !values.iter().any(Cell::is_number) {
        return None;
    }
    let numeric = values.iter().map(Cell::as_f64_or_nan).collect::<Vec<_>>();
    let summary = Summary::of(&numeric);
    let resolution = match axis {
        Some(_) if loosely_matches_axis(name) => None,
        Some(axis) if axis.len() != values.len() => {
            warn!(
                "Column '{name}' has {} value(s) but the axis has {}; skipping resolution",
                values.len(),
                axis.len()
            );
            None
        }
        Some(axis) => Some(Summary::of(&resolution_steps(values, axis))),
        None => None,
    };
    Some(ColumnStatistics {
        summary,
        resolution,
    })
}

/// Returns `table` with statistics attached to every non-ensemble column
/// that holds numeric values. Existing values are never removed.
pub fn derive_statistics(table: Table, section: SectionKind) -> Table {
    let axis_name = find_axis(&table).map(str::to_string);
    let axis_values = axis_name
        .as_deref()
        .and_then(|name| table.columns.get(name))
        .and_then(|column| column.values.as_ref())
        .and_then(ColumnValues::as_vector)
        .map(<[Cell]>::to_vec);
    debug!(
        "Deriving {section} statistics with axis {:?}",
        axis_name.as_deref().unwrap_or("<none>")
    );

    let mut table = table;
    for (name, column) in table.columns.iter_mut() {
        let Some(values) = column.values.as_ref().and_then(ColumnValues::as_vector) else {
            continue;
        };
        let axis = if axis_name.as_deref() == Some(name) {
            None
        } else {
            axis_values.as_deref()
        };
        if let Some(statistics) = column_statistics(name, values, axis) {
            column.statistics = Some(statistics);
        }
    }
    table
}
