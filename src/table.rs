//! Plain-text tables for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

use itertools::Itertools;

use crate::{
    data::Cell,
    model::Document,
    reshape::format_cell,
    stats::{StatValue, Summary},
};

/// Renders an aligned table. Numeric cells are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    let mut numeric = vec![true; column_count];

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
            if !cell.is_empty() && cell.parse::<f64>().is_err() && cell != "nan" {
                numeric[idx] = false;
            }
        }
    }
    if rows.is_empty() {
        numeric.fill(false);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &vec![false; column_count]));
    let separator = widths.iter().map(|w| "-".repeat((*w).max(3))).collect::<Vec<_>>();
    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<_>>();
    let _ = writeln!(
        output,
        "{}",
        format_row(&separator, &separator_widths, &vec![false; column_count])
    );
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize], right_align: &[bool]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .zip(right_align)
        .map(|((value, width), right)| {
            let sanitized = sanitize_cell(value);
            let padding = " ".repeat(width.saturating_sub(display_width(&sanitized)));
            if *right {
                format!("{padding}{sanitized}")
            } else {
                format!("{sanitized}{padding}")
            }
        })
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn stat_text(value: StatValue) -> String {
    match value {
        StatValue::Value(v) => format_cell(&Cell::Number(v), 3),
        StatValue::Nan => "nan".to_string(),
    }
}

/// One row per table: where it sits, its CSV file and its shape.
pub fn tables_overview(document: &Document) -> (Vec<String>, Vec<Vec<String>>) {
    let rows = document
        .tables()
        .into_iter()
        .map(|(location, table)| {
            vec![
                location.crumbs.to_string(),
                location.name.clone(),
                table.filename.clone().unwrap_or_default(),
                table.columns.len().to_string(),
                table.row_count().to_string(),
                if table.is_ensemble() { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    (
        headers(&["table", "name", "filename", "columns", "rows", "ensemble"]),
        rows,
    )
}

/// One row per annotated column. `only` restricts output to tables whose
/// crumbs or name match.
pub fn statistics_overview(
    document: &Document,
    only: Option<&str>,
) -> (Vec<String>, Vec<Vec<String>>) {
    let mut rows = Vec::new();
    for (location, table) in document.tables() {
        if let Some(filter) = only
            && location.crumbs.to_string() != filter
            && location.name != filter
        {
            continue;
        }
        for (name, column) in table.columns.iter() {
            let Some(statistics) = &column.statistics else {
                continue;
            };
            let Summary {
                min,
                max,
                mean,
                median,
            } = statistics.summary;
            let resolution = statistics
                .resolution
                .map(|summary| stat_text(summary.mean))
                .unwrap_or_default();
            rows.push(vec![
                location.crumbs.to_string(),
                name.to_string(),
                stat_text(min),
                stat_text(max),
                stat_text(mean),
                stat_text(median),
                resolution,
            ]);
        }
    }
    (
        headers(&["table", "column", "min", "max", "mean", "median", "resolution"]),
        rows,
    )
}
