use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt;

/// One side of a match run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Records that are looked up (the environment being migrated from).
    Source,
    /// Records that are looked up against (the environment being migrated to).
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Tuning knobs of the comparison engine that are not part of the rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineOptions {
    /// Skip rules flagged `self_match_disabled` (source and target are the
    /// same environment).
    #[serde(default)]
    pub self_match: bool,
    /// Largest cross product of one key group that is expanded into pairs.
    /// Bigger groups are kept as a post-process entry instead.
    #[serde(default = "EngineOptions::default_max_group_product")]
    pub max_group_product: usize,
}

impl EngineOptions {
    pub(crate) fn default_max_group_product() -> usize {
        1_000_000
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.max_group_product == 0 {
            return Err(MatchError::InvalidConfig(
                "max_group_product must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            self_match: false,
            max_group_product: Self::default_max_group_product(),
        }
    }
}

/// Errors produced by the matching layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum MatchError {
    /// Invalid engine options.
    #[error("invalid match config: {0}")]
    InvalidConfig(String),
    /// Invalid rule configuration.
    #[error("invalid rule `{rule}`: {message}")]
    InvalidRule { rule: String, message: String },
    /// An index was removed from a remaining set it is not part of.
    #[error("{side} index {index} is not in the remaining set")]
    NotRemaining { side: Side, index: usize },
    /// An index was committed to the final match map twice.
    #[error("{side} index {index} is already matched")]
    AlreadyMatched { side: Side, index: usize },
}

impl MatchError {
    pub(crate) fn rule(rule: &str, message: impl Into<String>) -> Self {
        MatchError::InvalidRule {
            rule: rule.to_string(),
            message: message.into(),
        }
    }

    /// Returns `true` when the error signals a broken engine invariant rather
    /// than bad input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            MatchError::NotRemaining { .. } | MatchError::AlreadyMatched { .. }
        )
    }
}
