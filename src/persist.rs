//! Reading and writing per-type result files.
//!
//! Every type owns `<dir>/<sanitized type>.json`. The same layout is used for
//! the output of a run, for the previous results a run builds on, and for the
//! entity results a configuration run translates references with.
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use ingest::{EntityMatches, Record, RecordKind, replace_in_map};
use matcher::MatchOutput;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{RunError, TypeError};

/// Subdirectory of the output directory holding rewritten configurations.
pub const CACHE_DIR: &str = "cache";

/// File-name safe form of a type name (`builtin:alerting.profile` →
/// `builtin_alerting.profile`).
pub fn sanitize_type_name(type_name: &str) -> String {
    type_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Result file of `type_name` inside `dir`.
pub fn result_path(dir: &Path, type_name: &str) -> PathBuf {
    dir.join(format!("{}.json", sanitize_type_name(type_name)))
}

/// Read the previous result of one type.
///
/// No directory, a missing directory or an unreadable file all mean there is
/// nothing to carry over. A file that exists but is empty or not a valid
/// result is an error.
pub fn read_previous(dir: Option<&Path>, type_name: &str) -> Result<Option<MatchOutput>, TypeError> {
    let Some(dir) = dir else {
        return Ok(None);
    };
    if !dir.is_dir() {
        debug!(type_name = %type_name, dir = %dir.display(), "previous_results_dir_missing");
        return Ok(None);
    }

    let path = result_path(dir, type_name);
    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) => {
            info!(
                type_name = %type_name,
                path = %path.display(),
                error = %err,
                "previous_result_unavailable"
            );
            return Ok(None);
        }
    };

    let previous_error = |message: String| TypeError::Previous {
        path: path.display().to_string(),
        message,
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(previous_error("file is empty".to_string()));
    }
    let previous: MatchOutput =
        serde_json::from_slice(&bytes).map_err(|err| previous_error(err.to_string()))?;

    debug!(
        type_name = %type_name,
        matches = previous.matches.len(),
        "previous_result_loaded"
    );
    Ok(Some(previous))
}

/// Rendered files of one type, written together once everything serialized.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    files: Vec<(PathBuf, Vec<u8>)>,
}

impl PendingWrites {
    pub(crate) fn add<T: Serialize>(&mut self, path: PathBuf, value: &T) -> Result<(), TypeError> {
        let mut bytes = serde_json::to_vec_pretty(value).map_err(|err| TypeError::Output {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        bytes.push(b'\n');
        self.files.push((path, bytes));
        Ok(())
    }

    /// Write every staged file to a temporary sibling, then move them all in
    /// place. Nothing is left behind when any step fails.
    pub(crate) fn commit(self) -> Result<Vec<PathBuf>, TypeError> {
        let mut staged = Vec::with_capacity(self.files.len());
        for (path, bytes) in self.files {
            let temp = write_temp(&path, &bytes).map_err(|err| output_error(&path, err))?;
            staged.push((path, temp));
        }

        let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
        for (path, temp) in staged {
            if let Err(err) = temp.persist(&path) {
                for done in &written {
                    if let Err(remove_err) = fs::remove_file(done) {
                        warn!(path = %done.display(), error = %remove_err, "output_rollback_failed");
                    }
                }
                return Err(output_error(&path, err.error));
            }
            written.push(path);
        }
        Ok(written)
    }
}

fn output_error(path: &Path, err: io::Error) -> TypeError {
    TypeError::Output {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

fn write_temp(path: &Path, bytes: &[u8]) -> io::Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(bytes)?;
    temp.flush()?;
    Ok(temp)
}

/// Queue the result document of one type.
pub(crate) fn stage_output(
    writes: &mut PendingWrites,
    output_dir: &Path,
    output: &MatchOutput,
) -> Result<(), TypeError> {
    writes.add(result_path(output_dir, &output.type_name), output)
}

#[derive(Serialize)]
struct CacheFile<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
    records: Vec<Value>,
}

/// Queue the source configurations with their ids replaced by the matched
/// target ids.
///
/// The file uses the typed record-file shape so it can be loaded back as a
/// record directory.
pub(crate) fn stage_config_cache(
    writes: &mut PendingWrites,
    output_dir: &Path,
    kind: &RecordKind,
    records: &[Record],
    matches: &BTreeMap<String, String>,
) -> Result<(), TypeError> {
    let records = rewrite_ids(kind, records, matches);
    let path = result_path(&output_dir.join(CACHE_DIR), kind.type_name());
    writes.add(
        path,
        &CacheFile {
            type_name: kind.type_name(),
            records,
        },
    )
}

/// Bodies of `records`, with matched ids replaced by their target id.
///
/// Every occurrence of a matched record's own id inside its body is replaced,
/// so self-references follow the id field.
pub fn rewrite_ids(
    kind: &RecordKind,
    records: &[Record],
    matches: &BTreeMap<String, String>,
) -> Vec<Value> {
    records
        .iter()
        .map(|record| match matches.get(record.id()) {
            Some(target_id) => {
                let replacement = BTreeMap::from([(record.id().to_string(), target_id.clone())]);
                let mut body = replace_in_map(record.body(), &replacement);
                body.insert(kind.id_field().to_string(), Value::String(target_id.clone()));
                Value::Object(body)
            }
            None => Value::Object(record.body().clone()),
        })
        .collect()
}

/// Load the entity matches an earlier entity run wrote to `dir`.
///
/// Every `*.json` file is one entity type's result.
pub fn load_entity_matches(dir: &Path) -> Result<EntityMatches, RunError> {
    let failure = |path: &Path, message: String| RunError::EntityMatches {
        path: path.display().to_string(),
        message,
    };

    let entries = fs::read_dir(dir).map_err(|err| failure(dir, err.to_string()))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|err| failure(dir, err.to_string()))?.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut matches = EntityMatches::new();
    for path in paths {
        let bytes = fs::read(&path).map_err(|err| failure(&path, err.to_string()))?;
        let output: MatchOutput =
            serde_json::from_slice(&bytes).map_err(|err| failure(&path, err.to_string()))?;
        if output.type_name.is_empty() {
            warn!(path = %path.display(), "entity_result_without_type_skipped");
            continue;
        }
        debug!(
            entities_type = %output.type_name,
            matches = output.matches.len(),
            "entity_matches_loaded"
        );
        matches.insert_type(output.type_name, output.matches);
    }

    info!(
        dir = %dir.display(),
        entity_types = matches.type_count(),
        "entity_matches_ready"
    );
    Ok(matches)
}
