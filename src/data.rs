use std::fmt;

use serde_json::{Number, Value};

/// Canonical textual marker for a missing cell, on disk and in metadata.
pub const MISSING_MARKER: &str = "nan";

/// One CSV cell after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view used by statistics: text and missing cells read as NaN.
    pub fn as_f64_or_nan(&self) -> f64 {
        self.as_f64().unwrap_or(f64::NAN)
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Cell::Number(_))
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Cell::Text(_))
    }

    pub fn as_display(&self) -> String {
        match self {
            Cell::Number(n) if n.is_nan() => MISSING_MARKER.to_string(),
            Cell::Number(n) => n.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Missing => MISSING_MARKER.to_string(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Number(n) => Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(MISSING_MARKER.to_string())),
            Cell::Text(s) => Value::String(s.clone()),
            Cell::Missing => Value::String(MISSING_MARKER.to_string()),
        }
    }

    pub fn from_json(value: &Value) -> Cell {
        match value {
            Value::Number(n) => n.as_f64().map(Cell::Number).unwrap_or(Cell::Missing),
            Value::String(s) if s == MISSING_MARKER => Cell::Missing,
            Value::String(s) => Cell::Text(s.clone()),
            Value::Null => Cell::Missing,
            other => Cell::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Column-major CSV content: slot `n - 1` holds the column numbered `n`.
pub type CsvColumns = Vec<Vec<Cell>>;

/// Values attached to a column: a flat series, or a realization matrix for
/// ensemble columns (one inner vector per realization).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Vector(Vec<Cell>),
    Matrix(Vec<Vec<Cell>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Vector(cells) => cells.len(),
            ColumnValues::Matrix(columns) => columns.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of data rows (length of one realization for matrices).
    pub fn row_count(&self) -> usize {
        match self {
            ColumnValues::Vector(cells) => cells.len(),
            ColumnValues::Matrix(columns) => columns.iter().map(Vec::len).max().unwrap_or(0),
        }
    }

    pub fn cells(&self) -> Box<dyn Iterator<Item = &Cell> + '_> {
        match self {
            ColumnValues::Vector(cells) => Box::new(cells.iter()),
            ColumnValues::Matrix(columns) => Box::new(columns.iter().flatten()),
        }
    }

    pub fn as_vector(&self) -> Option<&[Cell]> {
        match self {
            ColumnValues::Vector(cells) => Some(cells),
            ColumnValues::Matrix(_) => None,
        }
    }

    pub fn map_cells<F>(self, mut f: F) -> ColumnValues
    where
        F: FnMut(Cell) -> Cell,
    {
        match self {
            ColumnValues::Vector(cells) => {
                ColumnValues::Vector(cells.into_iter().map(&mut f).collect())
            }
            ColumnValues::Matrix(columns) => ColumnValues::Matrix(
                columns
                    .into_iter()
                    .map(|column| column.into_iter().map(&mut f).collect())
                    .collect(),
            ),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ColumnValues::Vector(cells) => Value::Array(cells.iter().map(Cell::to_json).collect()),
            ColumnValues::Matrix(columns) => Value::Array(
                columns
                    .iter()
                    .map(|column| Value::Array(column.iter().map(Cell::to_json).collect()))
                    .collect(),
            ),
        }
    }

    /// Reads embedded values; an array whose first element is itself an
    /// array is taken as a matrix.
    pub fn from_json(value: &Value) -> Option<ColumnValues> {
        let items = value.as_array()?;
        if items.first().is_some_and(Value::is_array) {
            let columns = items
                .iter()
                .map(|column| {
                    column
                        .as_array()
                        .map(|cells| cells.iter().map(Cell::from_json).collect())
                        .unwrap_or_default()
                })
                .collect();
            Some(ColumnValues::Matrix(columns))
        } else {
            Some(ColumnValues::Vector(items.iter().map(Cell::from_json).collect()))
        }
    }
}
