//! Disk I/O for LiPD working directories.
//!
//! All file access of the engine flows through this module:
//!
//! - **Metadata**: `read_document` / `write_document` for the JSON-LD file,
//!   tolerant of a UTF-8 BOM and falling back to Windows-1252 for legacy files.
//! - **CSV**: `read_csv` / `write_csv` for header-less value files. The reader
//!   is ragged-tolerant and returns column-major [`CsvColumns`]; the writer
//!   rounds numbers through [`format_cell`].

use std::{
    fs::{self, File},
    io::{BufWriter, Read},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::{debug, warn};
use serde_json::Value;

use crate::{
    data::{Cell, CsvColumns},
    missing::coerce_cell,
    reshape::{csv_rows, format_cell},
};

pub const METADATA_EXTENSION: &str = "jsonld";
pub const CSV_EXTENSION: &str = "csv";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// UTF-8 when the bytes are valid UTF-8, otherwise Windows-1252.
pub fn sniff_encoding(bytes: &[u8]) -> &'static Encoding {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    if std::str::from_utf8(body).is_ok() {
        UTF_8
    } else {
        WINDOWS_1252
    }
}

pub fn decode_bytes(bytes: &[u8]) -> String {
    let encoding = sniff_encoding(bytes);
    if encoding != UTF_8 {
        warn!("Input is not valid UTF-8; decoding as {}", encoding.name());
    }
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

pub fn read_document(path: &Path) -> Result<Value> {
    let bytes = fs::read(path).with_context(|| format!("Reading metadata file {path:?}"))?;
    let text = decode_bytes(&bytes);
    serde_json::from_str(&text).with_context(|| format!("Parsing JSON in {path:?}"))
}

pub fn write_document(path: &Path, tree: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(tree).context("Serializing metadata")?;
    fs::write(path, text).with_context(|| format!("Writing metadata file {path:?}"))?;
    debug!("Wrote metadata to {path:?}");
    Ok(())
}

/// Reads a header-less CSV file into column-major cells. Short rows are
/// padded with missing cells.
pub fn read_csv(path: &Path) -> Result<CsvColumns> {
    let bytes = fs::read(path).with_context(|| format!("Reading CSV file {path:?}"))?;
    let encoding = sniff_encoding(&bytes);
    let decoder = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(true)
        .build(bytes.as_slice());
    read_csv_from(decoder).with_context(|| format!("Parsing CSV file {path:?}"))
}

pub fn read_csv_from<R: Read>(reader: R) -> Result<CsvColumns> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .flexible(true)
        .double_quote(true);
    let mut reader = builder.from_reader(reader);

    let mut rows: Vec<Vec<Cell>> = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Reading CSV row {}", idx + 1))?;
        rows.push(record.iter().map(coerce_cell).collect());
    }
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if rows.iter().any(|row| row.len() != width) {
        warn!("CSV rows have differing widths; padding to {width} column(s)");
    }
    let mut columns: CsvColumns = vec![Vec::with_capacity(rows.len()); width];
    for row in rows {
        let mut cells = row.into_iter();
        for column in columns.iter_mut() {
            column.push(cells.next().unwrap_or(Cell::Missing));
        }
    }
    Ok(columns)
}

pub fn write_csv(path: &Path, columns: &CsvColumns, digits: u32) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Creating CSV file {path:?}"))?;
    let mut builder = csv::WriterBuilder::new();
    builder
        .has_headers(false)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    let mut writer = builder.from_writer(BufWriter::new(file));
    for row in csv_rows(columns) {
        let record = row
            .iter()
            .map(|cell| format_cell(cell, digits))
            .collect::<Vec<_>>();
        writer
            .write_record(&record)
            .with_context(|| format!("Writing CSV row to {path:?}"))?;
    }
    writer
        .flush()
        .with_context(|| format!("Flushing CSV file {path:?}"))?;
    Ok(())
}

fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Listing directory {dir:?}"))? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// The single `.jsonld` document of a working directory.
pub fn find_metadata_file(dir: &Path) -> Result<PathBuf> {
    let mut candidates = files_with_extension(dir, METADATA_EXTENSION)?;
    match candidates.len() {
        0 => Err(anyhow!("No .{METADATA_EXTENSION} metadata file found in {dir:?}")),
        1 => Ok(candidates.remove(0)),
        n => {
            warn!("Found {n} metadata files in {dir:?}; using {:?}", candidates[0]);
            Ok(candidates.remove(0))
        }
    }
}

pub fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extension(dir, CSV_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ragged_rows_are_padded_into_columns() {
        let input = "1,2,3\n4,5\nx,,nan\n";
        let columns = read_csv_from(input.as_bytes()).expect("csv");
        assert_eq!(columns.len(), 3);
        assert_eq!(
            columns[0],
            vec![Cell::Number(1.0), Cell::Number(4.0), Cell::Text("x".into())]
        );
        assert_eq!(columns[1][2], Cell::Text(String::new()));
        assert_eq!(columns[2], vec![Cell::Number(3.0), Cell::Missing, Cell::Missing]);
    }

    #[test]
    fn legacy_bytes_fall_back_to_windows_1252() {
        let bytes = b"caf\xE9";
        assert_eq!(sniff_encoding(bytes), WINDOWS_1252);
        assert_eq!(decode_bytes(bytes), "café");
        assert_eq!(sniff_encoding("café".as_bytes()), UTF_8);
    }

    #[test]
    fn csv_files_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("t.csv");
        let columns = vec![
            vec![Cell::Number(1.23456), Cell::Number(2.0)],
            vec![Cell::Text("a, b".into()), Cell::Missing],
        ];
        write_csv(&path, &columns, 3).expect("write");
        let text = fs::read_to_string(&path).expect("read");
        assert_eq!(text, "1.235,\"a, b\"\n2,nan\n");
        let back = read_csv(&path).expect("read csv");
        assert_eq!(back[0], vec![Cell::Number(1.235), Cell::Number(2.0)]);
        assert_eq!(back[1][1], Cell::Missing);
    }

    #[test]
    fn bom_prefixed_metadata_is_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("d.jsonld");
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(br#"{"dataSetName": "D"}"#);
        fs::write(&path, bytes).expect("write");
        let tree = read_document(&path).expect("read");
        assert_eq!(tree["dataSetName"], "D");
        assert_eq!(find_metadata_file(dir.path()).expect("find"), path);
    }
}
