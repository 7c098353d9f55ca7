mod common;

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::Value;

use common::{TestWorkspace, core_csvs, core_metadata, legacy_csvs, legacy_metadata};

fn lipd_managed() -> Command {
    Command::cargo_bin("lipd-managed").expect("binary exists")
}

#[test]
fn inspect_lists_every_table() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    lipd_managed()
        .args(["inspect", dir.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("Dataset: TestCore (LiPD 1.3 on disk)"))
        .stdout(contains("paleo0measurement0"))
        .stdout(contains("chron0model0ensemble0"))
        .stdout(contains("measurements"));
}

#[test]
fn inspect_reports_diagnostics_on_request() {
    let workspace = TestWorkspace::new();
    let csvs = vec![core_csvs()[0]];
    let dir = workspace.write_dataset("core", &core_metadata(), &csvs);
    lipd_managed()
        .args(["inspect", dir.to_str().unwrap(), "--diagnostics"])
        .assert()
        .success()
        .stdout(contains("1 issue(s):"))
        .stdout(contains("CSV file not found"));
}

#[test]
fn stats_can_be_restricted_to_one_table() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    lipd_managed()
        .args(["stats", dir.to_str().unwrap(), "--table", "measurements"])
        .assert()
        .success()
        .stdout(contains("resolution"))
        .stdout(contains("d18O"))
        .stdout(contains("2.333"))
        .stdout(contains("chron0").not());
}

#[test]
fn convert_writes_a_current_dataset() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("old", &legacy_metadata(), &legacy_csvs());
    let out = workspace.path().join("converted");
    lipd_managed()
        .args(["convert", dir.to_str().unwrap(), out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(contains("2 CSV file(s)"));

    let raw = fs::read_to_string(out.join("OldCore.jsonld")).expect("read metadata");
    let tree: Value = serde_json::from_str(&raw).expect("parse metadata");
    assert_eq!(tree["lipdVersion"], serde_json::json!(1.3));
    assert!(tree["paleoData"][0]["measurementTable"].is_array());
    assert!(out.join("OldCore.paleo0measurement0.csv").is_file());
    assert!(out.join("manifest-sha256.txt").is_file());
}

#[test]
fn metadata_layouts_differ_in_shape_only() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());

    let named = lipd_managed()
        .args(["metadata", dir.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let named: Value = serde_json::from_slice(&named).expect("named json");
    let columns = &named["chronData"]["chron0"]["model"]["chron0model0"]["ensembleTable"]
        ["chron0model0ensemble0"]["columns"];
    assert!(columns.get("age-2-ens").is_some());

    let out = workspace.path().join("numbered.json");
    lipd_managed()
        .args([
            "metadata",
            dir.to_str().unwrap(),
            "--layout",
            "numbered",
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();
    let numbered: Value =
        serde_json::from_str(&fs::read_to_string(&out).expect("read output")).expect("numbered json");
    let column = &numbered["paleoData"][0]["measurementTable"][0]["columns"][0];
    assert_eq!(column["variableName"], serde_json::json!("age"));
    assert!(column.get("values").is_none());
}

#[test]
fn library_loads_each_dataset_and_saves_them() {
    let workspace = TestWorkspace::new();
    workspace.write_dataset("lib/core", &core_metadata(), &core_csvs());
    workspace.write_dataset("lib/old", &legacy_metadata(), &legacy_csvs());
    let root = workspace.path().join("lib");
    let saved = workspace.path().join("saved");
    lipd_managed()
        .args([
            "library",
            root.to_str().unwrap(),
            "--save-to",
            saved.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(contains("TestCore"))
        .stdout(contains("OldCore"));
    assert!(saved.join("TestCore").join("TestCore.jsonld").is_file());
}

#[test]
fn config_writes_defaults_that_can_be_read_back() {
    let workspace = TestWorkspace::new();
    let settings = workspace.path().join("settings.yaml");
    lipd_managed()
        .args(["config", settings.to_str().unwrap()])
        .assert()
        .success();
    let contents = fs::read_to_string(&settings).expect("read settings");
    assert!(contents.contains("csv_digits: 3"));

    let custom = workspace.write("custom.yaml", "csv_digits: 1\nwrite_manifest: false\n");
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    let out = workspace.path().join("out");
    lipd_managed()
        .args([
            "--config",
            custom.to_str().unwrap(),
            "convert",
            dir.to_str().unwrap(),
            out.to_str().unwrap(),
        ])
        .assert()
        .success();
    assert!(!out.join("manifest-sha256.txt").exists());
    let csv = fs::read_to_string(out.join("TestCore.paleo0measurement0.csv")).expect("read csv");
    assert!(csv.contains("14.3"));
}

#[test]
fn missing_input_fails_with_an_error_message() {
    let workspace = TestWorkspace::new();
    lipd_managed()
        .args(["inspect", workspace.path().join("nowhere").to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("error:"));
}

#[test]
fn unknown_version_fails_with_an_error_message() {
    let workspace = TestWorkspace::new();
    let mut metadata = core_metadata();
    metadata["lipdVersion"] = serde_json::json!(7);
    let dir = workspace.write_dataset("core", &metadata, &core_csvs());
    lipd_managed()
        .args(["inspect", dir.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(contains("unrecognized LiPD version '7'"));
}
