#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Writes an unpacked LiPD dataset into `subdir` and returns its path.
    pub fn write_dataset(&self, subdir: &str, metadata: &Value, csvs: &[(&str, &str)]) -> PathBuf {
        let dir = self.path().join(subdir);
        fs::create_dir_all(&dir).expect("create dataset dir");
        let name = metadata["dataSetName"].as_str().unwrap_or("dataset");
        fs::write(
            dir.join(format!("{name}.jsonld")),
            serde_json::to_string_pretty(metadata).expect("serialize metadata"),
        )
        .expect("write metadata");
        for (filename, contents) in csvs {
            fs::write(dir.join(filename), contents).expect("write csv");
        }
        dir
    }
}

pub const CORE_MEASUREMENT_CSV: &str = "0,1.0,-999\n1,2.0,12.5\n2,NA,13\n3,4.0,14.25\n";
pub const CORE_ENSEMBLE_CSV: &str = "10,100,110,120\n20,200,210,220\n30,300,310,320\n";

/// A LiPD 1.3 dataset with one paleo measurement table and one chron model
/// holding a depth + realizations ensemble table.
pub fn core_metadata() -> Value {
    json!({
        "dataSetName": "TestCore",
        "lipdVersion": 1.3,
        "archiveType": "marine sediment",
        "pub": [{"title": "A core", "doi": "10.1000/core"}],
        "paleoData": [{
            "measurementTable": [{
                "tableName": "measurements",
                "filename": "TestCore.paleo0measurement0.csv",
                "missingValue": "-999",
                "columns": [
                    {"variableName": "age", "number": 1, "units": "yr BP"},
                    {"variableName": "d18O", "number": 2, "units": "permil"},
                    {"variableName": "temperature", "number": 3, "units": "degC"}
                ]
            }]
        }],
        "chronData": [{
            "model": [{
                "method": {"algorithm": "bacon"},
                "ensembleTable": [{
                    "filename": "TestCore.chron0model0ensemble0.csv",
                    "columns": [
                        {"variableName": "depth", "number": 1, "units": "cm"},
                        {"variableName": "age", "number": [2, 3, 4], "units": "yr BP"}
                    ]
                }]
            }]
        }]
    })
}

pub fn core_csvs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("TestCore.paleo0measurement0.csv", CORE_MEASUREMENT_CSV),
        ("TestCore.chron0model0ensemble0.csv", CORE_ENSEMBLE_CSV),
    ]
}

/// The same data in the pre-1.1 layout: bare tables and legacy key names.
pub fn legacy_metadata() -> Value {
    json!({
        "dataSetName": "OldCore",
        "lipdVersion": 1.0,
        "pub": [{"DOI": "10.1000/old", "pubYear": 1998}],
        "paleoData": [{
            "paleoDataTableName": "measurements",
            "filename": "OldCore.paleo0measurement0.csv",
            "columns": [
                {"variableName": "depth", "number": 1},
                {"variableName": "d18O", "number": 2, "climateInterpretation": {"variable": "T"}}
            ]
        }],
        "chronData": [{
            "chronTableName": "dates",
            "filename": "OldCore.chron0measurement0.csv",
            "columns": [{"variableName": "age", "number": 1}]
        }]
    })
}

pub fn legacy_csvs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("OldCore.paleo0measurement0.csv", "1,-3.1\n2,-3.4\n"),
        ("OldCore.chron0measurement0.csv", "500\n1500\n"),
    ]
}
