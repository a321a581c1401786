//! Typed record model.
//!
//! A [`Record`] is one decoded JSON object together with the metadata the
//! matcher needs: its external identifier, a derived display name, the entity
//! ids it references and, for entities, the first-seen timestamp. Everything
//! is derived once, when the record is built; the matcher only reads.
//!
//! # Type Hierarchy
//!
//! ```text
//! serde_json::Value (object)
//!         │
//!         ▼  Record::from_value(value, kind, entity_matches)
//! Record
//! ├── id: String            (kind.id_field(), required)
//! ├── name: Option<String>  (naming::derive_name)
//! ├── entity_refs: Vec<String>  (configs only, rewritten through entity matches)
//! ├── first_seen: Option<i64>   (entities only, required)
//! └── body: Map<String, Value>  (download envelope removed)
//! ```
use serde::Serialize;
use serde_json::{Map, Value};

use crate::entities::{scan_entities, EntityMatches};
use crate::error::IngestError;
use crate::kind::{RecordKind, DOWNLOADED_KEY, FIRST_SEEN_KEY};
use crate::naming::derive_name;

/// One source or target record of a logical type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    id: String,
    name: Option<String>,
    entity_refs: Vec<String>,
    first_seen: Option<i64>,
    body: Map<String, Value>,
}

impl Record {
    /// Build a typed record from a raw JSON value.
    ///
    /// Fails when the value is not an object, when the identifier field of
    /// `kind` is missing or not a non-empty string, or, for entities, when the
    /// first-seen timestamp is missing or not numeric.
    pub fn from_value(
        value: Value,
        kind: &RecordKind,
        entity_matches: Option<&EntityMatches>,
    ) -> Result<Self, IngestError> {
        let mut body = match value {
            Value::Object(map) => map,
            other => return Err(IngestError::NotAnObject(json_type_name(&other))),
        };

        if kind.is_config() {
            if let Some(Value::Object(inner)) = body.remove(DOWNLOADED_KEY) {
                body = inner;
            }
        }

        let id = required_str(&body, kind.id_field())?.to_string();

        let first_seen = if kind.is_entity() {
            Some(required_timestamp(&body, FIRST_SEEN_KEY)?)
        } else {
            None
        };

        let entity_refs = if kind.is_config() {
            let scan = scan_entities(&body, entity_matches);
            if let Some(rewritten) = scan.rewritten {
                body = rewritten;
            }
            scan.references
        } else {
            Vec::new()
        };

        let name = derive_name(kind, &body);

        Ok(Self {
            id,
            name,
            entity_refs,
            first_seen,
            body,
        })
    }

    /// External identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Derived display name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Entity ids referenced by the record, in order of appearance.
    pub fn entity_refs(&self) -> &[String] {
        &self.entity_refs
    }

    /// First-seen timestamp in epoch milliseconds (entities only).
    pub fn first_seen(&self) -> Option<i64> {
        self.first_seen
    }

    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Resolve a JSON pointer (`/properties/detectedName`) inside the body.
    pub fn pointer(&self, path: &str) -> Option<&Value> {
        let rest = path.strip_prefix('/')?;
        let (head, tail) = match rest.find('/') {
            Some(pos) => (&rest[..pos], &rest[pos..]),
            None => (rest, ""),
        };
        let head = head.replace("~1", "/").replace("~0", "~");
        self.body.get(&head)?.pointer(tail)
    }

    /// Read a required string field from the top level of the body.
    pub fn required_str(&self, field: &str) -> Result<&str, IngestError> {
        required_str(&self.body, field)
    }

    /// The body as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Type every raw value of a record set.
///
/// Errors carry the type name and the record's position in the input.
pub fn parse_records(
    values: Vec<Value>,
    kind: &RecordKind,
    entity_matches: Option<&EntityMatches>,
) -> Result<Vec<Record>, IngestError> {
    values
        .into_iter()
        .enumerate()
        .map(|(position, value)| {
            Record::from_value(value, kind, entity_matches).map_err(|err| {
                IngestError::InvalidRecord {
                    type_name: kind.type_name().to_string(),
                    position,
                    source: Box::new(err),
                }
            })
        })
        .collect()
}

fn required_str<'a>(body: &'a Map<String, Value>, field: &str) -> Result<&'a str, IngestError> {
    match body.get(field) {
        None | Some(Value::Null) => Err(IngestError::missing(field)),
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(_) => Err(IngestError::invalid(field, "a non-empty string")),
    }
}

fn required_timestamp(body: &Map<String, Value>, field: &str) -> Result<i64, IngestError> {
    match body.get(field) {
        None | Some(Value::Null) => Err(IngestError::missing(field)),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| IngestError::invalid(field, "a numeric timestamp")),
        Some(_) => Err(IngestError::invalid(field, "a numeric timestamp")),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
