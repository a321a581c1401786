//! Error types produced by the ingest crate.
//!
//! Every failure that can happen while turning raw JSON into typed
//! [`Record`](crate::Record) values is represented here. Errors are cloneable
//! and comparable so the driver can collect them per type and tests can match
//! on exact variants.
//!
//! # Error Categories
//!
//! | Error | Category | Description |
//! |-------|----------|-------------|
//! | [`NotAnObject`](IngestError::NotAnObject) | Input | A record is not a JSON object |
//! | [`MissingField`](IngestError::MissingField) | Input | A required identifier field is absent |
//! | [`InvalidField`](IngestError::InvalidField) | Input | A required field has the wrong JSON type |
//! | [`InvalidRecord`](IngestError::InvalidRecord) | Input | Wraps one of the above with its type and position |
//! | [`InvalidJson`](IngestError::InvalidJson) | Input | A record file could not be parsed |
//! | [`Io`](IngestError::Io) | I/O | A record file or directory could not be read |
//!
//! # Examples
//!
//! ```rust
//! use ingest::IngestError;
//!
//! let err = IngestError::MissingField { field: "entityId".into() };
//! assert_eq!(err.to_string(), "record is missing required field `entityId`");
//! ```
use thiserror::Error;

/// Errors that can occur while loading and typing records.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum IngestError {
    /// The record value is not a JSON object.
    ///
    /// Carries the JSON type name that was found instead.
    #[error("record is not a JSON object (found {0})")]
    NotAnObject(&'static str),

    /// A required field is not present on the record.
    #[error("record is missing required field `{field}`")]
    MissingField { field: String },

    /// A required field is present but holds the wrong JSON type.
    #[error("field `{field}` has an invalid value: expected {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    /// A record inside a typed record set failed validation.
    ///
    /// `position` is the record's position in the input file, before sorting.
    #[error("invalid record #{position} of type `{type_name}`: {source}")]
    InvalidRecord {
        type_name: String,
        position: usize,
        #[source]
        source: Box<IngestError>,
    },

    /// A record file is not valid JSON or does not have a supported shape.
    #[error("failed to parse `{path}`: {message}")]
    InvalidJson { path: String, message: String },

    /// A record file or directory could not be read.
    #[error("failed to read `{path}`: {message}")]
    Io { path: String, message: String },
}

impl IngestError {
    pub(crate) fn missing(field: &str) -> Self {
        IngestError::MissingField {
            field: field.to_string(),
        }
    }

    pub(crate) fn invalid(field: &str, expected: &'static str) -> Self {
        IngestError::InvalidField {
            field: field.to_string(),
            expected,
        }
    }

    pub(crate) fn io(path: &std::path::Path, err: &std::io::Error) -> Self {
        IngestError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }

    /// Returns `true` for errors caused by the content of a single record.
    pub fn is_record_error(&self) -> bool {
        matches!(
            self,
            IngestError::NotAnObject(_)
                | IngestError::MissingField { .. }
                | IngestError::InvalidField { .. }
                | IngestError::InvalidRecord { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_record_message_includes_context() {
        let err = IngestError::InvalidRecord {
            type_name: "HOST".into(),
            position: 3,
            source: Box::new(IngestError::missing("entityId")),
        };
        let msg = err.to_string();
        assert!(msg.contains("#3"));
        assert!(msg.contains("HOST"));
        assert!(msg.contains("entityId"));
        assert!(err.is_record_error());
    }

    #[test]
    fn io_errors_are_not_record_errors() {
        let err = IngestError::Io {
            path: "/tmp/x".into(),
            message: "denied".into(),
        };
        assert!(!err.is_record_error());
    }
}
