//! Entity reference extraction and rewriting.
//!
//! Configurations point at monitored entities by id (`HOST-0123456789ABCDEF`,
//! `PROCESS_GROUP_INSTANCE-...`). Those ids are pulled out of the serialized
//! configuration so rules can compare configurations by the entities they
//! reference. When an entity match run already linked source entities to
//! target entities, the references are rewritten to their target ids first so
//! that both sides speak about the same entities.
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

static ENTITY_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:[A-Z]+_)?(?:[A-Z]+_)?(?:[A-Z]+_)?[A-Z]+-[0-9A-Z]{16}")
        .unwrap_or_else(|err| panic!("entity id pattern must compile: {err}"))
});

/// Length of the `-XXXXXXXXXXXXXXXX` suffix of an entity id.
const ENTITY_SUFFIX_LEN: usize = 17;

/// Source→target entity id matches, grouped by entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityMatches {
    by_type: BTreeMap<String, BTreeMap<String, String>>,
}

impl EntityMatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the matches of one entity type, replacing earlier ones.
    pub fn insert_type(&mut self, entities_type: impl Into<String>, matches: BTreeMap<String, String>) {
        self.by_type.insert(entities_type.into(), matches);
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(BTreeMap::is_empty)
    }

    /// Number of entity types with registered matches.
    pub fn type_count(&self) -> usize {
        self.by_type.len()
    }

    /// Look up the target id for a source entity id.
    pub fn lookup(&self, entity_id: &str) -> Option<&str> {
        let entity_type = entity_type_of(entity_id)?;
        self.by_type
            .get(entity_type)?
            .get(entity_id)
            .map(String::as_str)
    }
}

/// Entity type prefix of an entity id (`HOST` for `HOST-0123456789ABCDEF`).
pub fn entity_type_of(entity_id: &str) -> Option<&str> {
    let cut = entity_id.len().checked_sub(ENTITY_SUFFIX_LEN)?;
    entity_id.get(..cut).filter(|prefix| !prefix.is_empty())
}

/// All entity ids mentioned anywhere in `text`, in order of appearance.
pub fn find_entity_ids(text: &str) -> Vec<String> {
    ENTITY_ID_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Result of scanning a configuration body for entity references.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityScan {
    /// Referenced ids, already translated through the entity matches.
    pub references: Vec<String>,
    /// The body with references rewritten, if any reference changed.
    pub rewritten: Option<Map<String, Value>>,
}

/// Extract entity references from `body` and rewrite them through `matches`.
pub fn scan_entities(body: &Map<String, Value>, matches: Option<&EntityMatches>) -> EntityScan {
    let serialized = Value::Object(body.clone()).to_string();
    let found = find_entity_ids(&serialized);

    let mut replacements: BTreeMap<String, String> = BTreeMap::new();
    let references = found
        .into_iter()
        .map(|id| match matches.and_then(|m| m.lookup(&id)) {
            Some(target) if target != id => {
                replacements.insert(id, target.to_string());
                target.to_string()
            }
            _ => id,
        })
        .collect();

    let rewritten = if replacements.is_empty() {
        None
    } else {
        Some(replace_in_map(body, &replacements))
    };

    EntityScan {
        references,
        rewritten,
    }
}

fn replace_all(text: &str, replacements: &BTreeMap<String, String>) -> String {
    replacements
        .iter()
        .fold(text.to_string(), |acc, (from, to)| acc.replace(from.as_str(), to))
}

/// Copy of `map` with every occurrence of each `replacements` key, in keys and
/// string values at any depth, replaced by its value.
pub fn replace_in_map(map: &Map<String, Value>, replacements: &BTreeMap<String, String>) -> Map<String, Value> {
    map.iter()
        .map(|(key, value)| (replace_all(key, replacements), replace_in_value(value, replacements)))
        .collect()
}

fn replace_in_value(value: &Value, replacements: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(replace_all(s, replacements)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| replace_in_value(item, replacements))
                .collect(),
        ),
        Value::Object(map) => Value::Object(replace_in_map(map, replacements)),
        other => other.clone(),
    }
}
