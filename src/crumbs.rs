//! Canonical per-table CSV filenames.
//!
//! A table's "crumbs" spell out its path through the document, e.g.
//! `paleo0measurement0` or `chron0model1ensemble0`. The CSV filename is the
//! dataset name followed by the crumbs, so metadata and CSV store always
//! agree on the join key.

use std::fmt;
use std::sync::OnceLock;

use log::debug;
use regex::Regex;

use crate::model::{Document, SectionKind, TableKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableCrumbs {
    pub section: SectionKind,
    pub section_index: usize,
    pub model_index: Option<usize>,
    pub kind: TableKind,
    pub table_index: usize,
}

impl TableCrumbs {
    pub fn measurement(section: SectionKind, section_index: usize, table_index: usize) -> Self {
        Self {
            section,
            section_index,
            model_index: None,
            kind: TableKind::Measurement,
            table_index,
        }
    }

    pub fn model(
        section: SectionKind,
        section_index: usize,
        model_index: usize,
        kind: TableKind,
        table_index: usize,
    ) -> Self {
        Self {
            section,
            section_index,
            model_index: Some(model_index),
            kind,
            table_index,
        }
    }
}

impl fmt::Display for TableCrumbs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.section, self.section_index)?;
        if let Some(model_index) = self.model_index {
            write!(f, "model{model_index}")?;
        }
        write!(f, "{}{}", self.kind, self.table_index)
    }
}

static UNSAFE_FILENAME_CHARS: OnceLock<Option<Regex>> = OnceLock::new();

/// Replaces characters that cannot appear in a portable filename.
pub fn sanitize_dataset_name(name: &str) -> String {
    let pattern = UNSAFE_FILENAME_CHARS.get_or_init(|| Regex::new(r#"[\\/:*?"<>|\s]+"#).ok());
    match pattern {
        Some(pattern) => pattern.replace_all(name.trim(), "_").into_owned(),
        None => name.trim().to_string(),
    }
}

pub fn filename_for(dataset_name: &str, crumbs: &TableCrumbs) -> String {
    format!("{}.{crumbs}.csv", sanitize_dataset_name(dataset_name))
}

pub fn generate_filename(
    dataset_name: &str,
    section: SectionKind,
    section_index: usize,
    table_kind: TableKind,
    table_index: usize,
) -> String {
    let crumbs = TableCrumbs {
        section,
        section_index,
        model_index: None,
        kind: table_kind,
        table_index,
    };
    filename_for(dataset_name, &crumbs)
}

/// Fills in filenames for tables that lack one. Existing names are kept.
pub fn assign_filenames(document: Document) -> Document {
    let dataset_name = document.name.clone();
    document.map_tables(|location, mut table| {
        if table.filename.is_none() {
            let filename = filename_for(&dataset_name, &location.crumbs);
            debug!("Assigned filename '{filename}' to {location}");
            table.filename = Some(filename);
        }
        table
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::model::{Model, SectionEntry, Table};

    #[test]
    fn filename_is_deterministic() {
        let first = generate_filename("MyData", SectionKind::Paleo, 0, TableKind::Measurement, 0);
        let second = generate_filename("MyData", SectionKind::Paleo, 0, TableKind::Measurement, 0);
        assert_eq!(first, "MyData.paleo0measurement0.csv");
        assert_eq!(first, second);
    }

    #[test]
    fn model_tables_include_model_index() {
        let crumbs = TableCrumbs::model(SectionKind::Chron, 1, 2, TableKind::Ensemble, 0);
        assert_eq!(filename_for("Lake", &crumbs), "Lake.chron1model2ensemble0.csv");
    }

    #[test]
    fn dataset_names_are_sanitized() {
        assert_eq!(sanitize_dataset_name("Lake Ohau/core 2"), "Lake_Ohau_core_2");
    }

    #[test]
    fn crumbs_are_injective_over_small_grid() {
        let mut seen = HashSet::new();
        for section in SectionKind::ALL {
            for section_index in 0..12 {
                for table_index in 0..12 {
                    let name = generate_filename(
                        "D",
                        section,
                        section_index,
                        TableKind::Measurement,
                        table_index,
                    );
                    assert!(seen.insert(name));
                    for kind in TableKind::MODEL_KINDS {
                        for model_index in 0..3 {
                            let crumbs = TableCrumbs::model(
                                section,
                                section_index,
                                model_index,
                                kind,
                                table_index,
                            );
                            assert!(seen.insert(filename_for("D", &crumbs)));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn assign_filenames_keeps_existing_names() {
        let mut entry = SectionEntry::default();
        entry.measurement_tables.insert_unique(
            "given",
            Table {
                filename: Some("custom.csv".into()),
                ..Table::default()
            },
        );
        entry
            .measurement_tables
            .insert_unique("missing", Table::default());
        let mut model = Model::default();
        model.summary_tables.insert_unique("s", Table::default());
        entry.models.insert_unique("paleo0model0", model);
        let mut document = Document {
            name: "Core".into(),
            ..Document::default()
        };
        document.paleo.insert_unique("paleo0", entry);

        let assigned = assign_filenames(document);
        let names: Vec<_> = assigned
            .tables()
            .into_iter()
            .map(|(_, table)| table.filename.clone().unwrap())
            .collect();
        assert_eq!(
            names,
            vec![
                "custom.csv",
                "Core.paleo0measurement1.csv",
                "Core.paleo0model0summary0.csv"
            ]
        );
    }
}
