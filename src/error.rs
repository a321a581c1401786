//! Errors of a match run.
//!
//! A run fails as a whole only when it cannot start (bad parameters, an
//! unreadable record directory). Everything that goes wrong inside one type
//! is a [`TypeError`]; the run keeps going and reports every failed type at
//! the end through [`RunError::Types`].
use std::fmt;

use ingest::IngestError;
use matcher::{MatchError, Side};
use thiserror::Error;

use crate::config::ConfigLoadError;

/// Why a single type could not be matched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TypeError {
    #[error("{side} records are invalid: {source}")]
    Ingest {
        side: Side,
        #[source]
        source: IngestError,
    },

    #[error(transparent)]
    Match(#[from] MatchError),

    /// The previous result of the type exists but cannot be used.
    #[error("previous result `{path}` is unusable: {message}")]
    Previous { path: String, message: String },

    #[error("failed to write `{path}`: {message}")]
    Output { path: String, message: String },
}

/// A failed type and its cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeFailure {
    pub type_name: String,
    pub error: TypeError,
}

impl fmt::Display for TypeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.error)
    }
}

/// Errors returned by [`run_match`](crate::run_match).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigLoadError),

    #[error("invalid rules: {0}")]
    Rules(#[from] MatchError),

    #[error("failed to load {side} records: {source}")]
    Records {
        side: Side,
        #[source]
        source: IngestError,
    },

    #[error("failed to load entity matches from `{path}`: {message}")]
    EntityMatches { path: String, message: String },

    #[error("I/O error on `{path}`: {message}")]
    Io { path: String, message: String },

    #[error("failed to build worker pool: {0}")]
    Pool(String),

    #[error("{} type(s) failed: {}", .0.len(), summarize(.0))]
    Types(Vec<TypeFailure>),
}

impl RunError {
    /// Failed types, when the run itself completed.
    pub fn type_failures(&self) -> &[TypeFailure] {
        match self {
            RunError::Types(failures) => failures,
            _ => &[],
        }
    }
}

fn summarize(failures: &[TypeFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.type_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
