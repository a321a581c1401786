//! Output payload assembly.
//!
//! Turns the index-based result of an engine run into the external payload
//! keyed by record ids. Matches are resolved in three passes, each of which
//! only fills ids the earlier passes left free:
//!
//! 1. unique matches of the current run,
//! 2. matches of the previous run,
//! 3. multi-matched sources resolved by the most recent `firstSeenTms`.
//!
//! Every source record ends up in exactly one of `matches`, `multiMatched`
//! and `unmatched`. All maps are ordered so the serialized payload is stable.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compare::CompareResultList;
use crate::engine::EngineOutcome;
use crate::processing::MatchProcessing;

/// Extraction window of one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionInfo {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
}

/// Describes which extractions were matched against each other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchKey {
    #[serde(default)]
    pub source: ExtractionInfo,
    #[serde(default)]
    pub target: ExtractionInfo,
}

/// Result of matching one type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOutput {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub match_key: MatchKey,
    /// Source id → target id.
    #[serde(default)]
    pub matches: BTreeMap<String, String>,
    /// Source id → candidate target ids, in target order.
    #[serde(default)]
    pub multi_matched: BTreeMap<String, Vec<String>>,
    /// Source ids without any candidate.
    #[serde(default)]
    pub unmatched: Vec<String>,
}

impl MatchOutput {
    pub fn matched_count(&self) -> usize {
        self.matches.len()
    }

    pub fn multi_matched_count(&self) -> usize {
        self.multi_matched.len()
    }

    pub fn unmatched_count(&self) -> usize {
        self.unmatched.len()
    }
}

/// Ids resolved so far; a source or target is never claimed twice.
#[derive(Default)]
struct Claims {
    matches: BTreeMap<String, String>,
    targets: BTreeSet<String>,
}

impl Claims {
    fn claim(&mut self, source: &str, target: &str) -> bool {
        if self.matches.contains_key(source) || self.targets.contains(target) {
            return false;
        }
        self.targets.insert(target.to_string());
        self.matches.insert(source.to_string(), target.to_string());
        true
    }

    fn is_matched(&self, source: &str) -> bool {
        self.matches.contains_key(source)
    }
}

/// Build the payload of a finished run.
pub fn assemble_output(
    processing: &MatchProcessing,
    outcome: &EngineOutcome,
    previous: Option<&MatchOutput>,
    match_key: MatchKey,
) -> MatchOutput {
    let source = processing.source().list();
    let target = processing.target().list();
    let mut claims = Claims::default();

    for (&left, &right) in &outcome.matches {
        if let (Some(s), Some(t)) = (source.id_at(left), target.id_at(right)) {
            claims.claim(s, t);
        }
    }

    if let Some(previous) = previous {
        let mut honored = 0usize;
        for (s, t) in &previous.matches {
            if claims.claim(s, t) {
                honored += 1;
            }
        }
        debug!(
            type_name = %processing.type_name(),
            previous = previous.matches.len(),
            honored,
            "previous_matches_applied"
        );
    }

    let groups = group_by_source(&outcome.leftover);

    let mut by_first_seen: BTreeMap<String, String> = BTreeMap::new();
    for (&left, rights) in &groups {
        let Some(s) = source.id_at(left) else { continue };
        if claims.is_matched(s) {
            continue;
        }
        // Only a positive first-seen timestamp can win.
        let mut best: (i64, Option<usize>) = (0, None);
        for &right in rights {
            let Some(first_seen) = target.get(right).and_then(|r| r.first_seen()) else {
                continue;
            };
            if first_seen > best.0 {
                best = (first_seen, Some(right));
            }
        }
        if let Some(t) = best.1.and_then(|right| target.id_at(right)) {
            by_first_seen.insert(s.to_string(), t.to_string());
        }
    }

    let mut picks_per_target: BTreeMap<&str, usize> = BTreeMap::new();
    for t in by_first_seen.values() {
        *picks_per_target.entry(t.as_str()).or_insert(0) += 1;
    }
    for (s, t) in &by_first_seen {
        if picks_per_target.get(t.as_str()).copied().unwrap_or(0) > 1 {
            debug!(source = %s, target = %t, "first_seen_conflict_blocked");
            continue;
        }
        claims.claim(s, t);
    }

    let mut multi_matched = BTreeMap::new();
    for (&left, rights) in &groups {
        let Some(s) = source.id_at(left) else { continue };
        if claims.is_matched(s) {
            continue;
        }
        let candidates: Vec<String> = rights
            .iter()
            .filter_map(|&right| target.id_at(right).map(str::to_string))
            .collect();
        multi_matched.insert(s.to_string(), candidates);
    }

    let unmatched: Vec<String> = processing
        .source()
        .remaining()
        .iter()
        .filter(|idx| !groups.contains_key(*idx))
        .filter_map(|&idx| source.id_at(idx))
        .filter(|s| !claims.is_matched(s))
        .map(str::to_string)
        .collect();

    MatchOutput {
        type_name: processing.type_name().to_string(),
        match_key,
        matches: claims.matches,
        multi_matched,
        unmatched,
    }
}

/// Leftover target indices per source index, both ascending.
fn group_by_source(leftover: &CompareResultList) -> BTreeMap<usize, Vec<usize>> {
    let mut groups: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for result in leftover.iter() {
        groups.entry(result.left).or_default().push(result.right);
    }
    for rights in groups.values_mut() {
        rights.sort_unstable();
        rights.dedup();
    }
    groups
}
