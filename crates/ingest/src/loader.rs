//! Record directory loading.
//!
//! An environment is a directory holding one JSON file per logical type.
//! A file is either a bare array of records, in which case the type name is
//! the file stem, or an object `{"type": "...", "records": [...]}`.
//!
//! Loading never stops at the first broken file: each type maps to its own
//! `Result` so the driver can fail that type and carry on with the others.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::IngestError;

/// Raw record sets of one environment, keyed by type name.
pub type RecordSets = BTreeMap<String, Result<Vec<Value>, IngestError>>;

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Bare(Vec<Value>),
    Typed {
        #[serde(rename = "type")]
        type_name: String,
        records: Vec<Value>,
    },
}

/// Load every `*.json` file of `dir`.
///
/// Fails only when the directory itself cannot be listed. Files are visited
/// in name order; a type that appears in two files is reported as an error
/// for that type.
pub fn load_record_dir(dir: &Path) -> Result<RecordSets, IngestError> {
    let entries = fs::read_dir(dir).map_err(|err| IngestError::io(dir, &err))?;

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| IngestError::io(dir, &err))?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut sets = RecordSets::new();
    for path in paths {
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            warn!(path = %path.display(), "record_file_skipped_non_utf8_name");
            continue;
        };

        let (type_name, records) = match read_record_file(&path) {
            Ok(RecordFile::Bare(records)) => (stem.to_string(), Ok(records)),
            Ok(RecordFile::Typed { type_name, records }) => (type_name, Ok(records)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "record_file_unreadable");
                (stem.to_string(), Err(err))
            }
        };

        if sets.contains_key(&type_name) {
            warn!(type_name = %type_name, path = %path.display(), "record_type_duplicated");
            sets.insert(
                type_name.clone(),
                Err(IngestError::InvalidJson {
                    path: path.display().to_string(),
                    message: format!("type `{type_name}` is defined by more than one file"),
                }),
            );
            continue;
        }

        if let Ok(records) = &records {
            debug!(type_name = %type_name, records = records.len(), "record_file_loaded");
        }
        sets.insert(type_name, records);
    }

    Ok(sets)
}

fn read_record_file(path: &Path) -> Result<RecordFile, IngestError> {
    let bytes = fs::read(path).map_err(|err| IngestError::io(path, &err))?;
    serde_json::from_slice(&bytes).map_err(|err| IngestError::InvalidJson {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: &Value) {
        fs::write(dir.join(name), value.to_string()).expect("write record file");
    }

    #[test]
    fn loads_bare_and_typed_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "dashboard.json", &json!([{ "id": "a" }]));
        write(
            dir.path(),
            "alerting.json",
            &json!({ "type": "builtin:alerting.profile", "records": [{ "objectId": "x" }, { "objectId": "y" }] }),
        );
        fs::write(dir.path().join("notes.txt"), "ignored").expect("write");

        let sets = load_record_dir(dir.path()).expect("load");
        let names: Vec<&str> = sets.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["builtin:alerting.profile", "dashboard"]);
        assert_eq!(sets["dashboard"].as_ref().map(Vec::len), Ok(1));
        assert_eq!(sets["builtin:alerting.profile"].as_ref().map(Vec::len), Ok(2));
    }

    #[test]
    fn broken_file_only_fails_its_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("HOST.json"), "{ not json").expect("write");
        write(dir.path(), "SERVICE.json", &json!([]));

        let sets = load_record_dir(dir.path()).expect("load");
        assert!(matches!(sets["HOST"], Err(IngestError::InvalidJson { .. })));
        assert_eq!(sets["SERVICE"].as_ref().map(Vec::len), Ok(0));
    }

    #[test]
    fn object_without_records_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "HOST.json", &json!({ "entityId": "x" }));
        let sets = load_record_dir(dir.path()).expect("load");
        assert!(sets["HOST"].is_err());
    }

    #[test]
    fn duplicate_type_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        write(dir.path(), "a.json", &json!({ "type": "HOST", "records": [] }));
        write(dir.path(), "b.json", &json!({ "type": "HOST", "records": [] }));
        let sets = load_record_dir(dir.path()).expect("load");
        assert!(sets["HOST"].is_err());
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load_record_dir(&dir.path().join("absent")).expect_err("missing dir");
        assert!(matches!(err, IngestError::Io { .. }));
    }
}
