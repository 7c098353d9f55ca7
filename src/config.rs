//! Engine settings, read from an optional YAML file.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::reshape::DEFAULT_CSV_DIGITS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Settings {
    /// Decimal places kept for numbers written to CSV.
    pub csv_digits: u32,
    /// Give columns without a `TSid` a generated one on load.
    pub generate_tsids: bool,
    pub tsid_prefix: String,
    pub write_manifest: bool,
    pub verify_manifest: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            csv_digits: DEFAULT_CSV_DIGITS,
            generate_tsids: true,
            tsid_prefix: "LPD".to_string(),
            write_manifest: true,
            verify_manifest: true,
        }
    }
}

impl Settings {
    /// Defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        match path {
            Some(path) => load_from_path(path),
            None => Ok(Settings::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        save_to_path(path, self)
    }
}

pub fn load_from_path<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).with_context(|| format!("Opening YAML file {path:?}"))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Parsing YAML file {path:?}"))
}

pub fn save_to_path<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let serialized = serde_yaml::to_string(data).context("Serializing YAML")?;
    fs::write(path, serialized).with_context(|| format!("Creating YAML file {path:?}"))
}
