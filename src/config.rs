//! YAML match-parameter files.
//!
//! A match run is described by one YAML file naming the two environments,
//! where results go, and optionally the rules to use instead of the built-in
//! ones.
//!
//! ## Example
//!
//! ```yaml
//! version: "1.0"
//! name: "prod to staging"
//! kind: configs
//!
//! source:
//!   dir: downloads/prod
//!   from: "2024-05-01T00:00:00Z"
//!   to: "2024-05-02T00:00:00Z"
//! target:
//!   dir: downloads/staging
//!
//! output_dir: results/configs
//! prev_result_dir: results/previous
//! entities_match_dir: results/entities
//!
//! engine:
//!   max_group_product: 1000000
//!   workers: 4
//! ```
//!
//! Relative paths are resolved against the directory holding the file.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use matcher::{
    EngineOptions, ExtractionInfo, IndexRuleType, MatchKey, default_config_rules,
    default_entity_rules, validate_rules,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading match-parameter files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// What kind of records a run links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Monitored entities; every file is one entity type.
    Entities,
    /// Configurations; every file is one classic API or settings schema.
    Configs,
}

impl MatchKind {
    pub fn is_entities(self) -> bool {
        matches!(self, MatchKind::Entities)
    }
}

/// One side of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Record directory, one JSON file per type.
    pub dir: PathBuf,

    /// Label used in logs.
    #[serde(default)]
    pub name: Option<String>,

    /// Start of the extraction window.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,

    /// End of the extraction window.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

impl EnvironmentConfig {
    fn validate(&self, side: &str) -> Result<(), ConfigLoadError> {
        if self.dir.as_os_str().is_empty() {
            return Err(ConfigLoadError::MissingField(format!("{side}.dir")));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ConfigLoadError::Validation(format!(
                    "{side}.from must not be after {side}.to"
                )));
            }
        }
        Ok(())
    }

    fn extraction_info(&self) -> ExtractionInfo {
        ExtractionInfo {
            from: format_timestamp(self.from),
            to: format_timestamp(self.to),
        }
    }

    /// Label for logs: the configured name, else the directory.
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.dir.display().to_string())
    }
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

/// Engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineYamlConfig {
    #[serde(default = "default_max_group_product")]
    pub max_group_product: usize,

    /// Size of the worker pool types are matched on; the global rayon pool
    /// is used when unset.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl EngineYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.max_group_product == 0 {
            return Err(ConfigLoadError::Validation(
                "engine.max_group_product must be >= 1".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(ConfigLoadError::Validation(
                "engine.workers must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineYamlConfig {
    fn default() -> Self {
        Self {
            max_group_product: default_max_group_product(),
            workers: None,
        }
    }
}

/// Top-level match-parameter file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchParameters {
    /// Configuration format version
    pub version: String,

    /// Optional run name
    #[serde(default)]
    pub name: Option<String>,

    pub kind: MatchKind,

    pub source: EnvironmentConfig,

    pub target: EnvironmentConfig,

    /// Where per-type results are written.
    pub output_dir: PathBuf,

    /// Results of an earlier run whose matches are carried over.
    #[serde(default)]
    pub prev_result_dir: Option<PathBuf>,

    /// Results of an entity run used to translate entity references of
    /// configurations. Only valid for `kind: configs`.
    #[serde(default)]
    pub entities_match_dir: Option<PathBuf>,

    /// Source and target are the same environment.
    #[serde(default)]
    pub self_match: bool,

    /// Tiers replacing the built-in rules of `kind`.
    #[serde(default)]
    pub rules: Option<Vec<IndexRuleType>>,

    #[serde(default)]
    pub engine: EngineYamlConfig,
}

impl MatchParameters {
    /// Load a YAML match-parameter file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut params = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            params.resolve_paths(base);
        }
        Ok(params)
    }

    /// Parse match parameters from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let params: MatchParameters = serde_yaml::from_str(yaml)?;
        params.validate()?;
        Ok(params)
    }

    /// Validate the parameters
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.source.validate("source")?;
        self.target.validate("target")?;

        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigLoadError::MissingField("output_dir".to_string()));
        }
        if self.kind.is_entities() && self.entities_match_dir.is_some() {
            return Err(ConfigLoadError::Validation(
                "entities_match_dir is only valid for kind: configs".to_string(),
            ));
        }
        if let Some(rules) = &self.rules {
            validate_rules(rules).map_err(|err| ConfigLoadError::Validation(err.to_string()))?;
        }

        self.engine.validate()?;

        Ok(())
    }

    /// Make every relative path relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.source.dir);
        resolve(&mut self.target.dir);
        resolve(&mut self.output_dir);
        if let Some(dir) = self.prev_result_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.entities_match_dir.as_mut() {
            resolve(dir);
        }
    }

    /// Configured tiers, or the built-in ones for the run's kind.
    pub fn rules(&self) -> Vec<IndexRuleType> {
        match (&self.rules, self.kind) {
            (Some(rules), _) => rules.clone(),
            (None, MatchKind::Entities) => default_entity_rules(),
            (None, MatchKind::Configs) => default_config_rules(),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            self_match: self.self_match,
            max_group_product: self.engine.max_group_product,
        }
    }

    /// Extraction windows recorded in every output document.
    pub fn match_key(&self) -> MatchKey {
        MatchKey {
            source: self.source.extraction_info(),
            target: self.target.extraction_info(),
        }
    }
}

fn default_max_group_product() -> usize {
    1_000_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
version: "1.0"
kind: entities
source:
  dir: src
target:
  dir: tgt
output_dir: out
"#;

    #[test]
    fn test_load_minimal_yaml() {
        let params = MatchParameters::from_yaml(MINIMAL).unwrap();
        assert_eq!(params.kind, MatchKind::Entities);
        assert!(params.name.is_none());
        assert!(!params.self_match);
        assert_eq!(params.engine.max_group_product, 1_000_000);
        assert_eq!(params.engine.workers, None);
        assert_eq!(params.rules(), default_entity_rules());
        assert_eq!(params.match_key(), MatchKey::default());
    }

    #[test]
    fn test_load_full_yaml() {
        let yaml = r#"
version: "1"
name: "prod to staging"
kind: configs
self_match: true
source:
  dir: /data/prod
  name: prod
  from: "2024-05-01T00:00:00Z"
  to: "2024-05-02T12:30:00+02:00"
target:
  dir: /data/staging
output_dir: /data/out
prev_result_dir: /data/prev
entities_match_dir: /data/entities
rules:
  - name: name
    weight: 100
    is_seed: true
    rules:
      - name: name
        key: { source: name }
        weight: 1
engine:
  max_group_product: 500
  workers: 2
"#;
        let params = MatchParameters::from_yaml(yaml).unwrap();
        assert_eq!(params.name.as_deref(), Some("prod to staging"));
        assert_eq!(params.source.label(), "prod");
        assert_eq!(params.target.label(), "/data/staging");
        assert_eq!(params.rules().len(), 1);

        let options = params.engine_options();
        assert!(options.self_match);
        assert_eq!(options.max_group_product, 500);

        let key = params.match_key();
        assert_eq!(key.source.from, "2024-05-01T00:00:00Z");
        assert_eq!(key.source.to, "2024-05-02T10:30:00Z");
        assert_eq!(key.target.from, "");
    }

    #[test]
    fn test_relative_paths_resolve_against_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("match.yaml");
        let yaml = format!("{MINIMAL}prev_result_dir: prev\n");
        fs::write(&file, yaml).unwrap();

        let params = MatchParameters::from_file(&file).unwrap();
        assert_eq!(params.source.dir, dir.path().join("src"));
        assert_eq!(params.target.dir, dir.path().join("tgt"));
        assert_eq!(params.output_dir, dir.path().join("out"));
        assert_eq!(params.prev_result_dir, Some(dir.path().join("prev")));
    }

    #[test]
    fn test_load_from_named_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let params = MatchParameters::from_file(temp_file.path()).unwrap();
        assert_eq!(params.version, "1.0");
        assert!(params.source.dir.is_absolute());
    }

    #[test]
    fn test_unsupported_version() {
        let yaml = MINIMAL.replace("\"1.0\"", "\"2.0\"");
        let err = MatchParameters::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::UnsupportedVersion(v) if v == "2.0"));
    }

    #[test]
    fn test_missing_dir() {
        let yaml = MINIMAL.replace("dir: src", "dir: \"\"");
        let err = MatchParameters::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::MissingField(f) if f == "source.dir"));
    }

    #[test]
    fn test_window_order_validation() {
        let yaml = MINIMAL.replace(
            "dir: tgt",
            "dir: tgt\n  from: \"2024-05-02T00:00:00Z\"\n  to: \"2024-05-01T00:00:00Z\"",
        );
        let err = MatchParameters::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("target.from must not be after target.to"));
    }

    #[test]
    fn test_entities_match_dir_requires_configs() {
        let yaml = format!("{MINIMAL}entities_match_dir: ents\n");
        let err = MatchParameters::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("entities_match_dir"));
    }

    #[test]
    fn test_invalid_rules_rejected() {
        let yaml = format!("{MINIMAL}rules:\n  - name: zero\n    weight: 0\n    rules: []\n");
        let err = MatchParameters::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Validation(_)));
    }

    #[test]
    fn test_engine_validation() {
        let yaml = format!("{MINIMAL}engine:\n  max_group_product: 0\n");
        let err = MatchParameters::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("max_group_product must be >= 1"));

        let yaml = format!("{MINIMAL}engine:\n  workers: 0\n");
        assert!(MatchParameters::from_yaml(&yaml).is_err());
    }

    #[test]
    fn test_unknown_kind_is_a_parse_error() {
        let yaml = MINIMAL.replace("kind: entities", "kind: dashboards");
        let err = MatchParameters::from_yaml(&yaml).unwrap_err();
        assert!(matches!(err, ConfigLoadError::YamlParse(_)));
    }
}
