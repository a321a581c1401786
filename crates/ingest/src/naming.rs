//! Human-readable name derivation for configuration records.
//!
//! Settings objects have no common name field, so the name is looked up in
//! the object's `value` by a fixed list of key patterns: first the exact keys
//! (`name`, `key`, `summary`, ...), then keys ending in one of them
//! (`displayName`, `ruleKey`, ...). The first letter of the pattern matches
//! either case. Keys are visited in sorted order so the result never depends
//! on map iteration order.
use serde_json::{Map, Value};

use crate::kind::RecordKind;

const NAME_PATTERNS: [&str; 7] = ["name", "key", "summary", "label", "title", "pattern", "rule"];

fn pattern_variants(pattern: &str) -> [String; 2] {
    let mut upper = pattern.to_string();
    if let Some(first) = upper.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    [pattern.to_string(), upper]
}

fn exact_match(key: &str, pattern: &str) -> bool {
    pattern_variants(pattern).iter().any(|p| key == p)
}

fn suffix_match(key: &str, pattern: &str) -> bool {
    pattern_variants(pattern).iter().any(|p| key.ends_with(p.as_str()))
}

fn first_named_string<'a>(
    value: &'a Map<String, Value>,
    matches: impl Fn(&str, &str) -> bool,
) -> Option<&'a str> {
    let mut keys: Vec<&String> = value.keys().collect();
    keys.sort();
    for pattern in NAME_PATTERNS {
        for key in &keys {
            if !matches(key.as_str(), pattern) {
                continue;
            }
            if let Some(Value::String(s)) = value.get(key.as_str()) {
                if !s.is_empty() {
                    return Some(s.as_str());
                }
            }
        }
    }
    None
}

/// Derive the name of a settings object from its `value` map.
pub fn settings_name(body: &Map<String, Value>) -> Option<String> {
    let value = body.get("value")?.as_object()?;
    first_named_string(value, exact_match)
        .or_else(|| first_named_string(value, suffix_match))
        .map(str::to_string)
}

/// Derive the name of a classic configuration.
///
/// Dashboards keep their name under `dashboardMetadata.name`; other APIs use
/// `name`, falling back to `displayName`.
pub fn classic_name(api: &str, body: &Map<String, Value>) -> Option<String> {
    let candidate = if api == "dashboard" {
        body.get("dashboardMetadata")
            .and_then(|meta| meta.get("name"))
    } else {
        body.get("name").or_else(|| body.get("displayName"))
    };
    candidate.and_then(scalar_to_string)
}

/// Derive the display name of any record kind.
pub fn derive_name(kind: &RecordKind, body: &Map<String, Value>) -> Option<String> {
    match kind {
        RecordKind::Entity { .. } => body.get("displayName").and_then(scalar_to_string),
        RecordKind::Classic { api } => classic_name(api, body),
        RecordKind::Settings { .. } => settings_name(body),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
