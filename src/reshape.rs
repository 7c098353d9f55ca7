//! CSV split/merge: moving values between column metadata and the
//! column-major CSV store.

use std::str::FromStr;

use log::{debug, warn};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
    data::{Cell, ColumnValues, CsvColumns, MISSING_MARKER},
    error::CoreError,
    missing::{canonical_missing_value, replace_missing_in_column, table_needs_missing_substitution},
    model::{Column, ColumnNumber, NamedMap, SectionKind, Table},
    stats::derive_statistics,
};

/// Decimal places kept when writing numbers to CSV.
pub const DEFAULT_CSV_DIGITS: u32 = 3;

/// Outcome of a merge. `issues` lists column-level problems; the columns
/// concerned are left without values.
#[derive(Debug, Clone, PartialEq)]
pub struct Merged {
    pub table: Table,
    pub is_ensemble: bool,
    pub issues: Vec<CoreError>,
}

fn table_location(table: &Table) -> String {
    table
        .filename
        .clone()
        .unwrap_or_else(|| "<unnamed table>".to_string())
}

fn require_numbers(location: &str, table: &Table) -> Result<(), CoreError> {
    match table.columns.iter().find(|(_, column)| column.number.is_none()) {
        Some((name, _)) => Err(CoreError::malformed(
            location,
            format!("column '{name}' has no number"),
        )),
        None => Ok(()),
    }
}

/// Shape of an ensemble table, read once from its column numbers.
enum EnsembleLayout {
    Matrix {
        name: String,
        realizations: usize,
    },
    AxisAndMatrix {
        axis_name: String,
        axis_number: usize,
        matrix_name: String,
        realizations: usize,
    },
    Unsupported {
        scalars: usize,
        matrices: usize,
    },
}

fn ensemble_layout(columns: &NamedMap<Column>) -> EnsembleLayout {
    let mut scalars = Vec::new();
    let mut matrices = Vec::new();
    for (name, column) in columns.iter() {
        match &column.number {
            Some(ColumnNumber::Ensemble(numbers)) => matrices.push((name.to_string(), numbers.len())),
            Some(ColumnNumber::Single(number)) => scalars.push((name.to_string(), *number)),
            None => scalars.push((name.to_string(), 0)),
        }
    }
    match (scalars.as_slice(), matrices.as_slice()) {
        ([], [(name, realizations)]) => EnsembleLayout::Matrix {
            name: name.clone(),
            realizations: *realizations,
        },
        ([(axis_name, axis_number)], [(matrix_name, realizations)]) => EnsembleLayout::AxisAndMatrix {
            axis_name: axis_name.clone(),
            axis_number: *axis_number,
            matrix_name: matrix_name.clone(),
            realizations: *realizations,
        },
        _ => EnsembleLayout::Unsupported {
            scalars: scalars.len(),
            matrices: matrices.len(),
        },
    }
}

fn unsupported_layout(location: &str, scalars: usize, matrices: usize) -> CoreError {
    CoreError::round_trip(
        location,
        format!("unsupported ensemble layout: {scalars} scalar and {matrices} realization column(s)"),
    )
}

/// Attaches CSV values to `table` by column number. The input table is not
/// modified; on a table-level error the caller keeps its pre-merge table.
pub fn merge_csv_into_table(
    table: &Table,
    csv: &CsvColumns,
    section: SectionKind,
) -> Result<Merged, CoreError> {
    let location = table_location(table);
    require_numbers(&location, table)?;
    let is_ensemble = table.is_ensemble();
    let mut merged = table.clone();
    let mut issues = Vec::new();

    if is_ensemble {
        merge_ensemble(&location, &mut merged, csv)?;
    } else {
        for (name, column) in merged.columns.iter_mut() {
            let Some(ColumnNumber::Single(number)) = column.number else {
                continue;
            };
            match number.checked_sub(1).and_then(|slot| csv.get(slot)) {
                Some(slot) => column.values = Some(ColumnValues::Vector(slot.clone())),
                None => issues.push(CoreError::round_trip(
                    &location,
                    format!(
                        "column '{name}' has number {number} but the CSV holds {} column(s)",
                        csv.len()
                    ),
                )),
            }
        }
    }

    let mut merged = demote_missing_values(merged);
    if !is_ensemble {
        merged = derive_statistics(merged, section);
    }
    debug!(
        "Merged {} CSV column(s) into {location}{}",
        csv.len(),
        if is_ensemble { " (ensemble)" } else { "" }
    );
    Ok(Merged {
        table: merged,
        is_ensemble,
        issues,
    })
}

fn merge_ensemble(location: &str, table: &mut Table, csv: &CsvColumns) -> Result<(), CoreError> {
    match ensemble_layout(&table.columns) {
        EnsembleLayout::Matrix { name, realizations } => {
            if realizations != csv.len() {
                warn!(
                    "Ensemble column '{name}' lists {realizations} realization(s) but {location} holds {}",
                    csv.len()
                );
            }
            if let Some(column) = table.columns.get_mut(&name) {
                column.values = Some(ColumnValues::Matrix(csv.clone()));
            }
            Ok(())
        }
        EnsembleLayout::AxisAndMatrix {
            axis_name,
            axis_number,
            matrix_name,
            realizations,
        } => {
            let axis_slot = axis_number.checked_sub(1);
            let Some(axis_values) = axis_slot.and_then(|slot| csv.get(slot)) else {
                return Err(CoreError::round_trip(
                    location,
                    format!("axis number {axis_number} is outside {} CSV column(s)", csv.len()),
                ));
            };
            let realization_values = csv
                .iter()
                .enumerate()
                .filter(|(slot, _)| Some(*slot) != axis_slot)
                .map(|(_, values)| values.clone())
                .collect::<Vec<_>>();
            if realization_values.len() != realizations {
                return Err(CoreError::round_trip(
                    location,
                    format!(
                        "'{matrix_name}' lists {realizations} realization(s) but the CSV holds {}",
                        realization_values.len()
                    ),
                ));
            }
            if let Some(column) = table.columns.get_mut(&axis_name) {
                column.values = Some(ColumnValues::Vector(axis_values.clone()));
            }
            if let Some(column) = table.columns.get_mut(&matrix_name) {
                column.values = Some(ColumnValues::Matrix(realization_values));
            }
            Ok(())
        }
        EnsembleLayout::Unsupported { scalars, matrices } => {
            Err(unsupported_layout(location, scalars, matrices))
        }
    }
}

/// Folds every missing-value sentinel into [`Cell::Missing`] and leaves the
/// canonical marker on the table only.
pub fn demote_missing_values(table: Table) -> Table {
    let marker = canonical_missing_value(&table);
    let substitute = table_needs_missing_substitution(
        table.columns.values().filter_map(|column| column.values.as_ref()),
    );
    let mut table = table;
    for column in table.columns.values_mut() {
        if substitute && let Some(values) = column.values.take() {
            column.values = Some(replace_missing_in_column(values, &marker));
        }
        column.missing_value = None;
    }
    table.missing_value = Some(MISSING_MARKER.to_string());
    table
}

fn column_vector<'a>(location: &str, name: &str, column: &'a Column) -> Result<&'a [Cell], CoreError> {
    match &column.values {
        Some(ColumnValues::Vector(cells)) => Ok(cells),
        Some(ColumnValues::Matrix(_)) => Err(CoreError::round_trip(
            location,
            format!("column '{name}' holds a matrix but has a single number"),
        )),
        None => Err(CoreError::malformed(location, format!("column '{name}' has no values"))),
    }
}

/// Outcome of a split. `issues` lists columns left out of the CSV because
/// they hold no values; every other slot is still written.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub columns: CsvColumns,
    pub issues: Vec<CoreError>,
}

/// Collects column values back into CSV slot order, the inverse of
/// [`merge_csv_into_table`].
pub fn split_table_into_csv_columns(
    location: &str,
    columns: &NamedMap<Column>,
) -> Result<Split, CoreError> {
    if columns.values().any(Column::is_ensemble) {
        return split_ensemble(location, columns).map(|columns| Split {
            columns,
            issues: Vec::new(),
        });
    }
    let mut issues = Vec::new();
    let mut slots: Vec<Option<(&str, Vec<Cell>)>> = vec![None; columns.len()];
    for (name, column) in columns.iter() {
        let Some(ColumnNumber::Single(number)) = column.number else {
            return Err(CoreError::malformed(location, format!("column '{name}' has no number")));
        };
        if column.values.is_none() {
            issues.push(CoreError::malformed(
                location,
                format!("column '{name}' has no values; leaving slot {number} out"),
            ));
            continue;
        }
        let values = column_vector(location, name, column)?;
        let Some(slot) = number.checked_sub(1).and_then(|idx| slots.get_mut(idx)) else {
            return Err(CoreError::round_trip(
                location,
                format!(
                    "column '{name}' has number {number} but the table has {} column(s)",
                    columns.len()
                ),
            ));
        };
        if let Some((first, _)) = slot {
            return Err(CoreError::IntegrityCollision {
                location: location.to_string(),
                number,
                first: first.to_string(),
                second: name.to_string(),
            });
        }
        *slot = Some((name, values.to_vec()));
    }
    while slots.last().is_some_and(Option::is_none) {
        slots.pop();
    }
    if !issues.is_empty() {
        debug!("{location}: {} value-less column(s) left out of the CSV", issues.len());
    }
    Ok(Split {
        columns: slots
            .into_iter()
            .map(|slot| slot.map(|(_, values)| values).unwrap_or_default())
            .collect(),
        issues,
    })
}

fn split_ensemble(location: &str, columns: &NamedMap<Column>) -> Result<CsvColumns, CoreError> {
    match ensemble_layout(columns) {
        EnsembleLayout::Matrix { name, .. } => {
            match columns.get(&name).and_then(|column| column.values.as_ref()) {
                Some(ColumnValues::Matrix(matrix)) => Ok(matrix.clone()),
                Some(ColumnValues::Vector(cells)) => Ok(vec![cells.clone()]),
                None => Err(CoreError::malformed(location, format!("column '{name}' has no values"))),
            }
        }
        EnsembleLayout::AxisAndMatrix {
            axis_name,
            axis_number,
            matrix_name,
            realizations,
        } => {
            let axis = columns
                .get(&axis_name)
                .ok_or_else(|| CoreError::malformed(location, format!("missing column '{axis_name}'")))?;
            let axis_values = column_vector(location, &axis_name, axis)?;
            let Some(ColumnValues::Matrix(matrix)) =
                columns.get(&matrix_name).and_then(|column| column.values.as_ref())
            else {
                return Err(CoreError::round_trip(
                    location,
                    format!("column '{matrix_name}' has no realization matrix"),
                ));
            };
            if matrix.len() != realizations {
                return Err(CoreError::round_trip(
                    location,
                    format!(
                        "'{matrix_name}' lists {realizations} realization(s) but holds {}",
                        matrix.len()
                    ),
                ));
            }
            // The axis keeps its own slot; realizations fill the others in order.
            let axis_slot = axis_number
                .checked_sub(1)
                .filter(|slot| *slot <= realizations)
                .ok_or_else(|| {
                    CoreError::round_trip(
                        location,
                        format!(
                            "axis '{axis_name}' has number {axis_number} but the table has {} CSV column(s)",
                            realizations + 1
                        ),
                    )
                })?;
            let mut out = matrix.clone();
            out.insert(axis_slot, axis_values.to_vec());
            Ok(out)
        }
        EnsembleLayout::Unsupported { scalars, matrices } => {
            Err(unsupported_layout(location, scalars, matrices))
        }
    }
}

/// Transposes column-major CSV content into rows. Short columns are padded
/// with missing cells.
pub fn csv_rows(columns: &CsvColumns) -> Vec<Vec<Cell>> {
    let row_count = columns.iter().map(Vec::len).max().unwrap_or(0);
    if columns.iter().any(|column| column.len() != row_count) {
        warn!("Ragged CSV columns; padding short columns to {row_count} row(s)");
    }
    (0..row_count)
        .map(|row| {
            columns
                .iter()
                .map(|column| column.get(row).cloned().unwrap_or(Cell::Missing))
                .collect()
        })
        .collect()
}

fn round_decimal_text(text: &str, digits: u32) -> Option<String> {
    let decimal = Decimal::from_str(text).ok()?;
    Some(
        decimal
            .round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string(),
    )
}

/// Renders a cell for CSV output. Numbers are rounded to `digits` decimals;
/// very small or very large magnitudes keep scientific notation with only the
/// mantissa rounded.
pub fn format_cell(cell: &Cell, digits: u32) -> String {
    let value = match cell {
        Cell::Missing => return MISSING_MARKER.to_string(),
        Cell::Text(text) => return text.clone(),
        Cell::Number(value) => *value,
    };
    if value.is_nan() {
        return MISSING_MARKER.to_string();
    }
    if value.is_infinite() || value == 0.0 {
        return if value == 0.0 { "0".to_string() } else { value.to_string() };
    }
    let magnitude = value.abs();
    if !(1e-4..1e16).contains(&magnitude) {
        let scientific = format!("{value:e}");
        if let Some((mantissa, exponent)) = scientific.split_once('e')
            && let Some(rounded) = round_decimal_text(mantissa, digits)
        {
            return format!("{rounded}e{exponent}");
        }
        return scientific;
    }
    round_decimal_text(&value.to_string(), digits).unwrap_or_else(|| value.to_string())
}
