//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use cfgmatch::{MatchParameters, result_path};
use matcher::MatchOutput;
use serde_json::Value;
use tempfile::TempDir;

/// One tier keyed on the `/key` field of every record.
pub const KEY_RULES: &str = r#"
rules:
  - name: key
    weight: 10
    is_seed: true
    rules:
      - name: key
        key: { source: pointer, path: /key }
        weight: 1
"#;

/// A split tier on `/key` and `/scope`.
pub const SPLIT_RULES: &str = r#"
rules:
  - name: key-and-scope
    weight: 20
    is_seed: true
    split_match: true
    rules:
      - name: key
        key: { source: pointer, path: /key }
        weight: 1
      - name: scope
        key: { source: pointer, path: /scope }
        weight: 1
"#;

/// [`SPLIT_RULES`] followed by a `/key`-only tier.
pub const SPLIT_THEN_KEY_RULES: &str = r#"
rules:
  - name: key-and-scope
    weight: 20
    is_seed: true
    split_match: true
    rules:
      - name: key
        key: { source: pointer, path: /key }
        weight: 1
      - name: scope
        key: { source: pointer, path: /scope }
        weight: 1
  - name: key
    weight: 10
    is_seed: true
    rules:
      - name: key
        key: { source: pointer, path: /key }
        weight: 1
"#;

/// Temporary directory with `source/` and `target/` record directories.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(dir.path().join("source")).expect("source dir");
        fs::create_dir_all(dir.path().join("target")).expect("target dir");
        Self { dir }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write `value` as JSON to `rel`, creating parent directories.
    pub fn write_json(&self, rel: &str, value: &Value) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(path, serde_json::to_vec_pretty(value).expect("serialize")).expect("write");
    }

    pub fn write_raw(&self, rel: &str, text: &str) {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dir");
        }
        fs::write(path, text).expect("write");
    }

    /// Write a match-parameter file and load it.
    ///
    /// `extra` is appended verbatim and may set rules, directories or engine
    /// options.
    pub fn params(&self, kind: &str, output: &str, extra: &str) -> MatchParameters {
        let yaml = format!(
            "version: \"1.0\"\nkind: {kind}\nsource:\n  dir: source\ntarget:\n  dir: target\noutput_dir: {output}\n{extra}"
        );
        let file = self.path(&format!("{output}.yaml"));
        fs::write(&file, yaml).expect("write params");
        MatchParameters::from_file(&file).expect("valid params")
    }

    pub fn output(&self, output: &str, type_name: &str) -> MatchOutput {
        let path = result_path(&self.path(output), type_name);
        let bytes = fs::read(&path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()));
        serde_json::from_slice(&bytes).expect("parse output")
    }

    pub fn has_output(&self, output: &str, type_name: &str) -> bool {
        result_path(&self.path(output), type_name).exists()
    }
}

/// Every file below `dir`, relative path → bytes, in path order.
pub fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    collect(dir, dir, &mut files);
    files.sort();
    files
}

fn collect(root: &Path, dir: &Path, files: &mut Vec<(PathBuf, Vec<u8>)>) {
    for entry in fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect(root, &path, files);
        } else {
            let rel = path.strip_prefix(root).expect("prefix").to_path_buf();
            files.push((rel, fs::read(&path).expect("read file")));
        }
    }
}
