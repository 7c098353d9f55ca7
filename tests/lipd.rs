mod common;

use std::fs;

use lipd_managed::{
    bag,
    config::Settings,
    data::{Cell, ColumnValues},
    error::CoreError,
    lipd::{self, KEY_TSID},
    migrate::LipdVersion,
    model::{Column, Document, SectionEntry, Table},
    workspace::Workspace,
};
use serde_json::json;

use common::{TestWorkspace, core_csvs, core_metadata, legacy_csvs, legacy_metadata};

fn vector(values: &[f64]) -> ColumnValues {
    ColumnValues::Vector(values.iter().map(|v| Cell::Number(*v)).collect())
}

fn measurement_table(document: &Document) -> &Table {
    document
        .paleo
        .get("paleo0")
        .and_then(|entry| entry.measurement_tables.get("measurements"))
        .expect("paleo measurement table")
}

fn ensemble_table_at<'a>(document: &'a Document, name: &str) -> &'a Table {
    document
        .chron
        .get("chron0")
        .and_then(|entry| entry.models.get("chron0model0"))
        .and_then(|model| model.ensemble_tables.get(name))
        .expect("chron ensemble table")
}

fn ensemble_table(document: &Document) -> &Table {
    ensemble_table_at(document, "chron0model0ensemble0")
}

#[test]
fn load_merges_values_and_demotes_missing_markers() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());

    let loaded = lipd::load(&dir, &Settings::default()).expect("load dataset");
    assert_eq!(loaded.source_version, LipdVersion::V1_3);
    assert!(loaded.diagnostics.is_empty(), "{}", loaded.diagnostics);
    assert_eq!(loaded.document.name, "TestCore");

    let table = measurement_table(&loaded.document);
    assert_eq!(table.missing_value.as_deref(), Some("nan"));
    assert_eq!(
        table.columns.get("d18O").and_then(|c| c.values.clone()),
        Some(ColumnValues::Vector(vec![
            Cell::Number(1.0),
            Cell::Number(2.0),
            Cell::Missing,
            Cell::Number(4.0),
        ]))
    );
    assert_eq!(
        table.columns.get("temperature").and_then(|c| c.values.clone()),
        Some(ColumnValues::Vector(vec![
            Cell::Missing,
            Cell::Number(12.5),
            Cell::Number(13.0),
            Cell::Number(14.25),
        ]))
    );
}

#[test]
fn load_derives_statistics_against_the_age_axis() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    let loaded = lipd::load(&dir, &Settings::default()).expect("load dataset");

    let table = measurement_table(&loaded.document);
    let d18o = table
        .columns
        .get("d18O")
        .and_then(|c| c.statistics)
        .expect("d18O statistics");
    assert_eq!(d18o.summary.min.as_f64(), Some(1.0));
    assert_eq!(d18o.summary.max.as_f64(), Some(4.0));
    assert_eq!(d18o.summary.median.as_f64(), Some(2.0));
    let resolution = d18o.resolution.expect("resolution");
    assert_eq!(resolution.min.as_f64(), Some(1.0));
    assert_eq!(resolution.max.as_f64(), Some(2.0));

    let age = table.columns.get("age").and_then(|c| c.statistics).expect("age statistics");
    assert!(age.resolution.is_none());
}

#[test]
fn load_splits_axis_and_realizations_of_an_ensemble_table() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    let loaded = lipd::load(&dir, &Settings::default()).expect("load dataset");

    let table = ensemble_table(&loaded.document);
    assert!(table.is_ensemble());
    let depth = table.columns.get("depth").expect("depth column");
    assert_eq!(depth.values, Some(vector(&[10.0, 20.0, 30.0])));
    assert!(depth.statistics.is_none());

    let age = table.columns.get("age").expect("age column");
    assert_eq!(
        age.values,
        Some(ColumnValues::Matrix(vec![
            vec![Cell::Number(100.0), Cell::Number(200.0), Cell::Number(300.0)],
            vec![Cell::Number(110.0), Cell::Number(210.0), Cell::Number(310.0)],
            vec![Cell::Number(120.0), Cell::Number(220.0), Cell::Number(320.0)],
        ]))
    );
}

#[test]
fn load_assigns_tsids_and_normalizes_publications() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    let loaded = lipd::load(&dir, &Settings::default()).expect("load dataset");

    for (_, table) in loaded.document.tables() {
        for column in table.columns.values() {
            let id = column.extra_str(KEY_TSID).expect("TSid assigned");
            assert!(id.starts_with("LPD"), "unexpected TSid {id}");
        }
    }
    let publication = &loaded.document.metadata["pub"][0];
    assert!(publication.get("doi").is_none());
    assert_eq!(publication["identifier"][0]["id"], json!("10.1000/core"));
    assert_eq!(
        publication["identifier"][0]["url"],
        json!("http://dx.doi.org/10.1000/core")
    );
}

#[test]
fn save_then_load_preserves_every_value() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    let settings = Settings::default();
    let loaded = lipd::load(&dir, &settings).expect("load dataset");

    let out = workspace.path().join("out");
    let report = lipd::save(&loaded.document, &out, &settings).expect("save dataset");
    assert_eq!(report.metadata_file, out.join("TestCore.jsonld"));
    assert_eq!(report.csv_files.len(), 2);
    assert!(report.diagnostics.is_empty());

    let reloaded = lipd::load(&out, &settings).expect("reload dataset");
    assert!(reloaded.diagnostics.is_empty(), "{}", reloaded.diagnostics);
    assert_eq!(reloaded.document.csv_store(), loaded.document.csv_store());
    assert_eq!(
        measurement_table(&reloaded.document).columns.keys().collect::<Vec<_>>(),
        vec!["age", "d18O", "temperature"]
    );
    let original_id = measurement_table(&loaded.document)
        .columns
        .get("age")
        .and_then(|c| c.extra_str(KEY_TSID));
    let reloaded_id = measurement_table(&reloaded.document)
        .columns
        .get("age")
        .and_then(|c| c.extra_str(KEY_TSID));
    assert_eq!(original_id, reloaded_id);
}

#[test]
fn saved_metadata_is_number_indexed_and_value_free() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    let settings = Settings::default();
    let loaded = lipd::load(&dir, &settings).expect("load dataset");
    let out = workspace.path().join("out");
    lipd::save(&loaded.document, &out, &settings).expect("save dataset");

    let raw = fs::read_to_string(out.join("TestCore.jsonld")).expect("read metadata");
    let tree: serde_json::Value = serde_json::from_str(&raw).expect("parse metadata");
    assert_eq!(tree["lipdVersion"], json!(1.3));
    let columns = &tree["chronData"][0]["model"][0]["ensembleTable"][0]["columns"];
    assert_eq!(columns[0]["variableName"], json!("depth"));
    assert_eq!(columns[1]["number"], json!([2, 3, 4]));
    assert!(columns[1].get("values").is_none());
    assert!(columns[1].get("isEnsemble").is_none());

    let csv = fs::read_to_string(out.join("TestCore.paleo0measurement0.csv")).expect("read csv");
    assert_eq!(csv.lines().next(), Some("0,1,nan"));
}

#[test]
fn manifest_is_written_and_tampering_is_reported() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("core", &core_metadata(), &core_csvs());
    let settings = Settings::default();
    let loaded = lipd::load(&dir, &settings).expect("load dataset");
    let out = workspace.path().join("out");
    lipd::save(&loaded.document, &out, &settings).expect("save dataset");

    assert!(out.join(bag::MANIFEST_FILE).is_file());
    assert!(out.join(bag::BAG_INFO_FILE).is_file());
    assert!(bag::verify_manifest(&out).is_empty());

    fs::write(out.join("TestCore.paleo0measurement0.csv"), "0,9,9\n").expect("tamper");
    let reloaded = lipd::load(&out, &settings).expect("reload dataset");
    assert!(reloaded.diagnostics.iter().any(|issue| matches!(
        issue,
        CoreError::MalformedInput { location, reason }
            if location == "TestCore.paleo0measurement0.csv" && reason.contains("checksum")
    )));
}

#[test]
fn unknown_version_aborts_the_load() {
    let workspace = TestWorkspace::new();
    let mut metadata = core_metadata();
    metadata["lipdVersion"] = json!("9.9");
    let dir = workspace.write_dataset("core", &metadata, &core_csvs());

    let err = lipd::load(&dir, &Settings::default()).expect_err("version must be rejected");
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::SchemaVersionUnrecognized { version }) if version == "9.9"
    ));
}

#[test]
fn missing_csv_is_a_diagnostic_not_a_failure() {
    let workspace = TestWorkspace::new();
    let csvs = vec![core_csvs()[0]];
    let dir = workspace.write_dataset("core", &core_metadata(), &csvs);

    let loaded = lipd::load(&dir, &Settings::default()).expect("load dataset");
    assert_eq!(loaded.diagnostics.len(), 1);
    assert!(matches!(
        &loaded.diagnostics.issues()[0],
        CoreError::MalformedInput { location, .. } if location == "TestCore.chron0model0ensemble0.csv"
    ));
    let table = ensemble_table(&loaded.document);
    assert!(!table.has_values());
    assert!(measurement_table(&loaded.document).has_values());
}

#[test]
fn duplicate_column_numbers_abort_the_save() {
    let mut table = Table::default();
    table
        .columns
        .insert_unique("depth", Column::new("depth", 1).with_values(vector(&[1.0, 2.0])));
    table
        .columns
        .insert_unique("age", Column::new("age", 1).with_values(vector(&[10.0, 20.0])));
    let mut entry = SectionEntry::default();
    entry.measurement_tables.insert_unique("paleo0measurement0", table);
    let mut document = Document {
        name: "Clash".into(),
        ..Document::default()
    };
    document.paleo.insert_unique("paleo0", entry);

    let workspace = TestWorkspace::new();
    let err = lipd::save(&document, &workspace.path().join("out"), &Settings::default())
        .expect_err("collision must abort");
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::IntegrityCollision { number: 1, first, second, .. })
            if first == "depth" && second == "age"
    ));
}

#[test]
fn legacy_documents_are_upgraded_on_load() {
    let workspace = TestWorkspace::new();
    let dir = workspace.write_dataset("old", &legacy_metadata(), &legacy_csvs());

    let loaded = lipd::load(&dir, &Settings::default()).expect("load legacy dataset");
    assert_eq!(loaded.source_version, LipdVersion::V1_0);
    assert!(loaded.diagnostics.is_empty(), "{}", loaded.diagnostics);

    let paleo = measurement_table(&loaded.document);
    let d18o = paleo.columns.get("d18O").expect("d18O column");
    assert_eq!(d18o.values, Some(vector(&[-3.1, -3.4])));
    assert_eq!(d18o.extra["interpretation"], json!([{"variable": "T"}]));

    let dates = loaded
        .document
        .chron
        .get("chron0")
        .and_then(|entry| entry.measurement_tables.get("dates"))
        .expect("chron measurement table");
    assert_eq!(
        dates.columns.get("age").and_then(|c| c.values.clone()),
        Some(vector(&[500.0, 1500.0]))
    );

    let publication = &loaded.document.metadata["pub"][0];
    assert_eq!(publication["year"], json!(1998));
    assert_eq!(publication["identifier"][0]["type"], json!("doi"));
}

#[test]
fn workspace_loads_and_saves_a_whole_library() {
    let workspace = TestWorkspace::new();
    let library = workspace.path().join("library");
    workspace.write_dataset("library/core", &core_metadata(), &core_csvs());
    workspace.write_dataset("library/old", &legacy_metadata(), &legacy_csvs());
    workspace.write("library/broken/Broken.jsonld", "{ not json");

    let mut catalog = Workspace::new(Settings::default());
    let report = catalog.load_all(&library).expect("load library");
    assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["OldCore", "TestCore"]);
    assert_eq!(report.loaded.len(), 2);
    assert_eq!(report.failed.len(), 1);

    let out = workspace.path().join("saved");
    let saved = catalog.save_all(&out).expect("save library");
    assert_eq!(saved.len(), 2);
    assert!(out.join("TestCore").join("TestCore.jsonld").is_file());
    assert!(out.join("OldCore").join("OldCore.jsonld").is_file());

    let mut reopened = Workspace::new(Settings::default());
    reopened.load(&out.join("OldCore")).expect("reload saved dataset");
    assert_eq!(
        reopened.get("OldCore").map(Document::csv_store),
        catalog.get("OldCore").map(Document::csv_store)
    );
}

#[test]
fn ensemble_axis_numbered_after_realizations_survives_save() {
    let workspace = TestWorkspace::new();
    let metadata = json!({
        "dataSetName": "Shuffled",
        "lipdVersion": 1.3,
        "chronData": [{
            "model": [{
                "ensembleTable": [{
                    "filename": "Shuffled.chron0model0ensemble0.csv",
                    "columns": [
                        {"variableName": "age", "number": [1, 3, 4]},
                        {"variableName": "depth", "number": 2}
                    ]
                }]
            }]
        }]
    });
    let dir = workspace.write_dataset(
        "shuffled",
        &metadata,
        &[("Shuffled.chron0model0ensemble0.csv", "100,10,110,120\n200,20,210,220\n")],
    );
    let settings = Settings::default();
    let loaded = lipd::load(&dir, &settings).expect("load dataset");
    assert!(loaded.diagnostics.is_empty(), "{}", loaded.diagnostics);

    let out = workspace.path().join("out");
    lipd::save(&loaded.document, &out, &settings).expect("save dataset");
    let csv = fs::read_to_string(out.join("Shuffled.chron0model0ensemble0.csv")).expect("read csv");
    assert_eq!(csv.lines().next(), Some("100,10,110,120"));

    let reloaded = lipd::load(&out, &settings).expect("reload dataset");
    let depth = |document: &Document| {
        ensemble_table_at(document, "chron0model0ensemble0")
            .columns
            .get("depth")
            .and_then(|c| c.values.clone())
    };
    assert_eq!(depth(&reloaded.document), Some(vector(&[10.0, 20.0])));
    assert_eq!(reloaded.document.csv_store(), loaded.document.csv_store());
}

#[test]
fn column_beyond_the_csv_does_not_drop_the_rest_of_the_table() {
    let workspace = TestWorkspace::new();
    let metadata = json!({
        "dataSetName": "Short",
        "lipdVersion": 1.3,
        "paleoData": [{
            "measurementTable": [{
                "filename": "Short.paleo0measurement0.csv",
                "columns": [
                    {"variableName": "depth", "number": 1},
                    {"variableName": "d18O", "number": 2},
                    {"variableName": "note", "number": 3}
                ]
            }]
        }]
    });
    let dir = workspace.write_dataset(
        "short",
        &metadata,
        &[("Short.paleo0measurement0.csv", "1,-3.1\n2,-3.4\n")],
    );
    let settings = Settings::default();
    let loaded = lipd::load(&dir, &settings).expect("load dataset");
    assert_eq!(loaded.diagnostics.len(), 1);

    let out = workspace.path().join("out");
    let report = lipd::save(&loaded.document, &out, &settings).expect("save dataset");
    assert_eq!(report.csv_files, vec!["Short.paleo0measurement0.csv"]);
    assert_eq!(report.diagnostics.len(), 1);

    let reloaded = lipd::load(&out, &settings).expect("reload dataset");
    let table = reloaded
        .document
        .paleo
        .get("paleo0")
        .and_then(|entry| entry.measurement_tables.get("paleo0measurement0"))
        .expect("measurement table");
    assert_eq!(
        table.columns.get("depth").and_then(|c| c.values.clone()),
        Some(vector(&[1.0, 2.0]))
    );
    assert_eq!(
        table.columns.get("d18O").and_then(|c| c.values.clone()),
        Some(vector(&[-3.1, -3.4]))
    );
    assert!(table.columns.get("note").is_some_and(|c| c.values.is_none()));
}
