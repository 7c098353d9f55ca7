//! Document-level load and save pipelines.
//!
//! `load` reads an unpacked LiPD directory: migrate the metadata to 1.3,
//! index it by name, build the typed [`Document`], merge each table's CSV
//! file (deriving statistics), then fill in filenames and TSids. `save` runs
//! the inverse on a copy: split values out to CSV, index by number, prune,
//! write, and record checksums.

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    bag,
    config::Settings,
    crumbs::{assign_filenames, sanitize_dataset_name},
    error::{CoreError, Diagnostics},
    io_utils::{self, METADATA_EXTENSION},
    migrate::{self, CURRENT_VERSION_NUMBER, KEY_LIPD_VERSION, LipdVersion},
    model::{Document, SectionKind, Table},
    prune::{prune_doi_identifier, prune_empty},
    reindex::{index_document_by_name, index_document_by_number},
    reshape::{merge_csv_into_table, split_table_into_csv_columns},
};

pub const KEY_TSID: &str = "TSid";

/// Packaging around a working directory of one metadata file plus CSVs.
pub trait ArchiveLayer {
    /// Returns the unpacked working directory for `archive`.
    fn open(&self, archive: &Path) -> Result<PathBuf>;
    /// Packs `working_dir` into `archive`.
    fn close(&self, working_dir: &Path, archive: &Path) -> Result<()>;
}

/// An archive that already is a plain directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryArchive;

impl ArchiveLayer for DirectoryArchive {
    fn open(&self, archive: &Path) -> Result<PathBuf> {
        if !archive.is_dir() {
            return Err(anyhow!("{archive:?} is not a LiPD directory"));
        }
        Ok(archive.to_path_buf())
    }

    fn close(&self, working_dir: &Path, archive: &Path) -> Result<()> {
        if working_dir == archive {
            return Ok(());
        }
        fs::create_dir_all(archive).with_context(|| format!("Creating {archive:?}"))?;
        for entry in fs::read_dir(working_dir).with_context(|| format!("Listing {working_dir:?}"))? {
            let path = entry?.path();
            if let Some(name) = path.file_name()
                && path.is_file()
            {
                fs::copy(&path, archive.join(name))
                    .with_context(|| format!("Copying {path:?} into {archive:?}"))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Loaded {
    pub document: Document,
    /// Version found on disk before migration.
    pub source_version: LipdVersion,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone)]
pub struct SaveReport {
    pub metadata_file: PathBuf,
    pub csv_files: Vec<String>,
    pub diagnostics: Diagnostics,
}

pub fn load(dir: &Path, settings: &Settings) -> Result<Loaded> {
    load_with(&DirectoryArchive, dir, settings)
}

pub fn load_with(archive: &dyn ArchiveLayer, path: &Path, settings: &Settings) -> Result<Loaded> {
    let dir = archive.open(path)?;
    let mut diagnostics = Diagnostics::new();
    if settings.verify_manifest {
        diagnostics.extend(bag::verify_manifest(&dir));
    }

    let metadata_path = io_utils::find_metadata_file(&dir)?;
    info!("Loading LiPD metadata from {metadata_path:?}");
    let raw = io_utils::read_document(&metadata_path)?;
    let source_version = migrate::detect_version(&raw)
        .with_context(|| format!("Reading version of {metadata_path:?}"))?;
    let migrated = migrate::migrate(raw).with_context(|| format!("Migrating {metadata_path:?}"))?;
    let named = index_document_by_name(&migrated);

    let fallback_name = metadata_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("dataset")
        .to_string();
    let (document, issues) = Document::from_named_tree(&named, &fallback_name);
    diagnostics.append(issues);

    let document = document.map_tables(|location, table| {
        match merge_table(&dir, location.crumbs.section, &table) {
            Ok((merged, issues)) => {
                diagnostics.extend(issues);
                merged
            }
            Err(issue) => {
                diagnostics.push(issue);
                table
            }
        }
    });
    let document = assign_filenames(document);
    let document = if settings.generate_tsids {
        assign_tsids(document, &settings.tsid_prefix)
    } else {
        document
    };

    info!(
        "Loaded '{}' ({} table(s), LiPD {} on disk, {} issue(s))",
        document.name,
        document.tables().len(),
        source_version.as_str(),
        diagnostics.len()
    );
    Ok(Loaded {
        document,
        source_version,
        diagnostics,
    })
}

fn merge_table(
    dir: &Path,
    section: SectionKind,
    table: &Table,
) -> Result<(Table, Vec<CoreError>), CoreError> {
    let Some(filename) = table.filename.as_deref() else {
        return Err(CoreError::malformed("<unnamed table>", "table has no filename"));
    };
    let path = dir.join(filename);
    if !path.is_file() {
        return Err(CoreError::malformed(filename, "CSV file not found"));
    }
    let csv = io_utils::read_csv(&path).map_err(|err| CoreError::malformed(filename, format!("{err:#}")))?;
    let merged = merge_csv_into_table(table, &csv, section)?;
    Ok((merged.table, merged.issues))
}

/// Gives every column lacking a `TSid` a fresh `{prefix}{uuid}` identifier.
pub fn assign_tsids(document: Document, prefix: &str) -> Document {
    let mut assigned = 0usize;
    let document = document.map_tables(|_, mut table| {
        for column in table.columns.values_mut() {
            let has_id = column
                .extra_str(KEY_TSID)
                .is_some_and(|id| !id.trim().is_empty());
            if !has_id {
                let id = format!("{prefix}{}", Uuid::new_v4().simple());
                column.extra.insert(KEY_TSID.to_string(), Value::String(id));
                assigned += 1;
            }
        }
        table
    });
    if assigned > 0 {
        debug!("Assigned {assigned} TSid(s)");
    }
    document
}

pub fn metadata_filename(document: &Document) -> String {
    format!("{}.{METADATA_EXTENSION}", sanitize_dataset_name(&document.name))
}

/// Builds the on-disk metadata tree: no values, lists instead of maps,
/// empty fields pruned.
pub fn disk_tree(document: &Document) -> Value {
    let mut tree = document.to_named_tree(false);
    if let Some(object) = tree.as_object_mut()
        && !object.contains_key(KEY_LIPD_VERSION)
    {
        object.insert(KEY_LIPD_VERSION.to_string(), Value::from(CURRENT_VERSION_NUMBER));
    }
    let tree = index_document_by_number(&tree);
    prune_empty(prune_doi_identifier(tree))
}

pub fn save(document: &Document, dir: &Path, settings: &Settings) -> Result<SaveReport> {
    save_with(&DirectoryArchive, document, dir, dir, settings)
}

/// Writes `document` into `working_dir`, then hands it to `archive` for
/// packing into `destination`. The caller's document is never modified.
pub fn save_with(
    archive: &dyn ArchiveLayer,
    document: &Document,
    working_dir: &Path,
    destination: &Path,
    settings: &Settings,
) -> Result<SaveReport> {
    fs::create_dir_all(working_dir).with_context(|| format!("Creating {working_dir:?}"))?;
    let document = assign_filenames(document.clone());
    let mut diagnostics = Diagnostics::new();
    let mut csv_files = Vec::new();
    let mut written = BTreeSet::new();

    for (location, table) in document.tables() {
        if !table.has_values() {
            debug!("{location} has no values; writing metadata only");
            continue;
        }
        let Some(filename) = table.filename.as_deref() else {
            diagnostics.push(CoreError::malformed(location.to_string(), "table has no filename"));
            continue;
        };
        if !written.insert(filename.to_string()) {
            diagnostics.push(CoreError::malformed(
                filename,
                format!("{location} reuses a filename already written"),
            ));
            continue;
        }
        let columns = match split_table_into_csv_columns(filename, &table.columns) {
            Ok(split) => {
                diagnostics.extend(split.issues);
                split.columns
            }
            Err(err) if err.is_fatal() => {
                let context = format!("Splitting {location} for '{}'", document.name);
                return Err(anyhow::Error::new(err).context(context));
            }
            Err(err) => {
                diagnostics.push(err);
                continue;
            }
        };
        io_utils::write_csv(&working_dir.join(filename), &columns, settings.csv_digits)?;
        csv_files.push(filename.to_string());
    }

    let metadata_file = metadata_filename(&document);
    io_utils::write_document(&working_dir.join(&metadata_file), &disk_tree(&document))?;
    if settings.write_manifest {
        let mut payload = vec![metadata_file.clone()];
        payload.extend(csv_files.iter().cloned());
        bag::write_manifest(working_dir, &payload)?;
    }
    archive.close(working_dir, destination)?;

    if !diagnostics.is_empty() {
        warn!("Saved '{}' with {} issue(s)", document.name, diagnostics.len());
    }
    info!(
        "Saved '{}' to {destination:?} ({} CSV file(s))",
        document.name,
        csv_files.len()
    );
    Ok(SaveReport {
        metadata_file: destination.join(metadata_file),
        csv_files,
        diagnostics,
    })
}
