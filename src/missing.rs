//! Cell coercion and missing-value normalization.
//!
//! Raw CSV strings become [`Cell`]s through [`coerce_cell`]. Sentinels such
//! as `-999`, `NA` or an empty field are folded into [`Cell::Missing`] so the
//! table-level `missingValue` can always be written as `"nan"`.

use crate::{
    data::{Cell, ColumnValues, MISSING_MARKER},
    model::Table,
};

/// Tokens treated as blank regardless of the declared marker (compared
/// case-insensitively after trimming).
const BLANK_TOKENS: &[&str] = &["", "na", "nan", "n/a", "null", "none"];

pub fn coerce_cell(raw: &str) -> Cell {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(number) if number.is_nan() => Cell::Missing,
        Ok(number) => Cell::Number(number),
        Err(_) => Cell::Text(trimmed.to_string()),
    }
}

pub fn is_blank_token(value: &str) -> bool {
    let lowered = value.trim().to_ascii_lowercase();
    BLANK_TOKENS.contains(&lowered.as_str())
}

/// Table-level marker, else the first column-level one, else `"nan"`.
pub fn canonical_missing_value(table: &Table) -> String {
    if let Some(marker) = table.missing_value.as_deref() {
        return marker.to_string();
    }
    table
        .columns
        .values()
        .find_map(|column| column.missing_value.clone())
        .unwrap_or_else(|| MISSING_MARKER.to_string())
}

pub fn is_missing_cell(cell: &Cell, marker: &str) -> bool {
    let marker = marker.trim();
    match cell {
        Cell::Missing => true,
        Cell::Number(n) if n.is_nan() => true,
        Cell::Number(n) => marker.parse::<f64>().is_ok_and(|m| m == *n),
        Cell::Text(text) => text.trim() == marker || is_blank_token(text),
    }
}

pub fn replace_missing_cell(cell: Cell, marker: &str) -> Cell {
    if is_missing_cell(&cell, marker) {
        Cell::Missing
    } else {
        cell
    }
}

pub fn replace_missing_in_column(values: ColumnValues, marker: &str) -> ColumnValues {
    values.map_cells(|cell| replace_missing_cell(cell, marker))
}

/// False when no column holds a text cell. Numbers and blanks alone leave the
/// table untouched so a legitimate numeric value equal to the marker survives.
pub fn table_needs_missing_substitution<'a, I>(columns: I) -> bool
where
    I: IntoIterator<Item = &'a ColumnValues>,
{
    columns
        .into_iter()
        .any(|values| values.cells().any(|cell| matches!(cell, Cell::Text(_))))
}
