//! # cfgmatch Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` links the records of a source environment to the records of a
//! target environment. Records are compared through weighted rules grouped
//! in tiers; the engine keeps every pair that is the single best candidate
//! of both its source and its target, and carries the rest over to the next
//! tier. What is still ambiguous at the end is reported as multi-matched.
//!
//! ## Core Types
//!
//! - [`IndexRuleType`] / [`IndexRule`] / [`KeySource`]: declarative rules,
//!   serde-friendly so they can be loaded from configuration.
//! - [`RuleMapGenerator`]: selects and orders the tiers that actually run.
//! - [`RecordList`]: the records of one side, sorted by id; positions are the
//!   indices used everywhere else.
//! - [`MatchProcessing`]: per-type state of remaining indices on both sides.
//! - [`CompareResultList`]: candidate pairs with accumulated weights.
//! - [`Matcher`]: runs the tiers and assembles the [`MatchOutput`].
//!
//! ## Example Usage
//!
//! ```
//! use ingest::{parse_records, RecordKind};
//! use matcher::{
//!     EngineOptions, IndexRule, IndexRuleType, KeySource, MatchKey, MatchProcessing, Matcher,
//! };
//! use serde_json::json;
//!
//! let kind = RecordKind::for_type("dashboard", false);
//! let source = parse_records(vec![json!({ "id": "a", "name": "Overview" })], &kind, None)?;
//! let target = parse_records(vec![json!({ "id": "b", "name": "Overview" })], &kind, None)?;
//!
//! let rules = vec![IndexRuleType {
//!     name: "name".into(),
//!     weight: 100,
//!     is_seed: true,
//!     split_match: false,
//!     rules: vec![IndexRule::new("name", KeySource::Name, 1)],
//! }];
//! let matcher = Matcher::new(rules, EngineOptions::default())?;
//!
//! let mut processing = MatchProcessing::new(kind, source, target);
//! let output = matcher.match_type(&mut processing, None, MatchKey::default())?;
//! assert_eq!(output.matches.get("a").map(String::as_str), Some("b"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Observability
//!
//! Install a [`MatchMetrics`] implementation via [`set_match_metrics`] to record
//! per-type latency and result counts. This is typically done once during
//! startup so every type run reports to the same metrics backend.

pub mod compare;
pub mod engine;
pub mod index;
pub mod metrics;
pub mod output;
pub mod processing;
pub mod record_list;
pub mod rules;
pub mod types;

pub use crate::compare::{CompareResult, CompareResultList};
pub use crate::engine::{EngineOutcome, Matcher, TierReport};
pub use crate::index::{build_sorted_index, merge_join, KeyGroup, SortedIndex};
pub use crate::metrics::{set_match_metrics, MatchCounts, MatchMetrics};
pub use crate::output::{assemble_output, ExtractionInfo, MatchKey, MatchOutput};
pub use crate::processing::{MatchProcessing, SideState};
pub use crate::record_list::RecordList;
pub use crate::rules::{
    default_config_rules, default_entity_rules, validate_rules, ActiveTier, IndexRule,
    IndexRuleType, KeySource, RuleMapGenerator,
};
pub use crate::types::{EngineOptions, MatchError, Side};
