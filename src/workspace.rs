//! An explicit library of loaded datasets.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::{
    config::Settings,
    crumbs::sanitize_dataset_name,
    error::Diagnostics,
    io_utils,
    lipd::{self, SaveReport},
    model::Document,
};

/// Outcome of loading every dataset under a directory. A dataset that fails
/// to load does not stop the others.
#[derive(Debug, Default)]
pub struct LibraryReport {
    pub loaded: Vec<(String, Diagnostics)>,
    pub failed: Vec<(PathBuf, anyhow::Error)>,
}

#[derive(Debug, Clone, Default)]
pub struct Workspace {
    settings: Settings,
    documents: BTreeMap<String, Document>,
}

impl Workspace {
    pub fn new(settings: Settings) -> Self {
        Workspace {
            settings,
            documents: BTreeMap::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.documents.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&Document> {
        self.documents.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Document> {
        self.documents.remove(name)
    }

    /// Adds a document, replacing any dataset of the same name.
    pub fn insert(&mut self, document: Document) -> Option<Document> {
        let name = document.name.clone();
        let previous = self.documents.insert(name.clone(), document);
        if previous.is_some() {
            warn!("Replacing dataset '{name}' already in the library");
        }
        previous
    }

    /// Loads one LiPD directory and returns the dataset name it is filed
    /// under.
    pub fn load(&mut self, dir: &Path) -> Result<(String, Diagnostics)> {
        let loaded = lipd::load(dir, &self.settings)?;
        let name = loaded.document.name.clone();
        self.insert(loaded.document);
        Ok((name, loaded.diagnostics))
    }

    /// Loads every immediate sub-directory of `root` that holds a metadata
    /// file, plus `root` itself when it is a dataset directory.
    pub fn load_all(&mut self, root: &Path) -> Result<LibraryReport> {
        let mut candidates = Vec::new();
        if io_utils::find_metadata_file(root).is_ok() {
            candidates.push(root.to_path_buf());
        }
        let mut children = fs::read_dir(root)
            .with_context(|| format!("Listing library directory {root:?}"))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_dir())
            .collect::<Vec<_>>();
        children.sort();
        candidates.extend(
            children
                .into_iter()
                .filter(|path| io_utils::find_metadata_file(path).is_ok()),
        );

        let mut report = LibraryReport::default();
        for dir in candidates {
            match self.load(&dir) {
                Ok(entry) => report.loaded.push(entry),
                Err(err) => {
                    warn!("Skipping {dir:?}: {err:#}");
                    report.failed.push((dir, err));
                }
            }
        }
        info!(
            "Library holds {} dataset(s); {} failed to load",
            self.len(),
            report.failed.len()
        );
        Ok(report)
    }

    pub fn save(&self, name: &str, dir: &Path) -> Result<SaveReport> {
        let document = self
            .get(name)
            .ok_or_else(|| anyhow!("Dataset '{name}' is not in the library"))?;
        lipd::save(document, dir, &self.settings)
    }

    /// Saves every dataset into `root/<dataset name>`.
    pub fn save_all(&self, root: &Path) -> Result<Vec<SaveReport>> {
        self.documents
            .iter()
            .map(|(name, document)| {
                let dir = root.join(sanitize_dataset_name(&document.name));
                lipd::save(document, &dir, &self.settings)
                    .with_context(|| format!("Saving dataset '{name}'"))
            })
            .collect()
    }
}
