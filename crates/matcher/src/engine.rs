use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, Level};

use crate::compare::{CompareResult, CompareResultList};
use crate::index::{build_sorted_index, merge_join};
use crate::metrics::{metrics_recorder, MatchCounts};
use crate::output::{assemble_output, MatchKey, MatchOutput};
use crate::processing::{MatchProcessing, SideState};
use crate::rules::{validate_rules, ActiveTier, IndexRule, IndexRuleType, RuleMapGenerator};
use crate::types::{EngineOptions, MatchError, Side};

#[cfg(test)]
mod tests;

/// What happened in one tier of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierReport {
    pub name: String,
    pub weight: u32,
    /// Source and target records the tier compared.
    pub source_candidates: usize,
    pub target_candidates: usize,
    /// Summed weight a pair needs in a split-match tier.
    pub max_match_value: u64,
    /// Distinct pairs after merging the previous leftover.
    pub pairs: usize,
    /// Key groups too large to expand.
    pub post_processed_groups: usize,
    pub matched: usize,
    pub leftover: usize,
}

/// Index-level result of running every tier of one type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutcome {
    /// Committed source index → target index.
    pub matches: BTreeMap<usize, usize>,
    /// Candidates of the last tier that were not resolved.
    pub leftover: CompareResultList,
    pub tiers: Vec<TierReport>,
}

/// Key groups of one rule that were too large to expand into pairs.
///
/// Applied once per merged pair: a pair inside a group earns the rule's
/// weight unless the rule already paid it through an expanded group.
#[derive(Debug)]
struct PostProcess {
    rule: String,
    weight: u64,
    groups: Vec<(BTreeSet<usize>, BTreeSet<usize>)>,
    expanded: BTreeSet<(usize, usize)>,
}

enum PostOutcome {
    Bonus(u64),
    Satisfied,
    Unsatisfied,
}

impl PostProcess {
    fn apply(&self, left: usize, right: usize) -> PostOutcome {
        if self.expanded.contains(&(left, right)) {
            return PostOutcome::Satisfied;
        }
        let inside = self
            .groups
            .iter()
            .any(|(l, r)| l.contains(&left) && r.contains(&right));
        if inside {
            PostOutcome::Bonus(self.weight)
        } else {
            PostOutcome::Unsatisfied
        }
    }
}

/// Tiered weighted-rule matcher.
///
/// Cheap to clone; the active tiers are shared so one matcher can serve every
/// type run of a process.
#[derive(Debug, Clone)]
pub struct Matcher {
    tiers: Arc<[ActiveTier]>,
    options: EngineOptions,
}

impl Matcher {
    /// Validate `rules` and `options` and select the active tiers.
    pub fn new(rules: Vec<IndexRuleType>, options: EngineOptions) -> Result<Self, MatchError> {
        validate_rules(&rules)?;
        options.validate()?;
        let tiers = RuleMapGenerator::new(options.self_match, rules).active_tiers();
        if tiers.is_empty() {
            return Err(MatchError::InvalidConfig(
                "no tier has an active rule".into(),
            ));
        }
        Ok(Self {
            tiers: tiers.into(),
            options,
        })
    }

    /// Active tiers in processing order.
    pub fn tiers(&self) -> &[ActiveTier] {
        &self.tiers
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Match one type and build its output payload.
    ///
    /// `previous` is the payload of an earlier run of the same type; its
    /// matches are honored where the current run leaves both ids free.
    pub fn match_type(
        &self,
        processing: &mut MatchProcessing,
        previous: Option<&MatchOutput>,
        match_key: MatchKey,
    ) -> Result<MatchOutput, MatchError> {
        let start = Instant::now();
        let span = tracing::span!(
            Level::INFO,
            "matcher.match_type",
            type_name = %processing.type_name()
        );
        let _guard = span.enter();

        let outcome = self.run(processing)?;
        let output = assemble_output(processing, &outcome, previous, match_key);
        let latency = start.elapsed();

        let counts = MatchCounts {
            source_records: processing.source().list().len(),
            target_records: processing.target().list().len(),
            matched: output.matched_count(),
            multi_matched: output.multi_matched_count(),
            unmatched: output.unmatched_count(),
        };
        info!(
            type_name = %processing.type_name(),
            source_records = counts.source_records,
            target_records = counts.target_records,
            matched = counts.matched,
            multi_matched = counts.multi_matched,
            unmatched = counts.unmatched,
            elapsed_micros = latency.as_micros(),
            "match_type_done"
        );

        if let Some(recorder) = metrics_recorder() {
            recorder.record_match(processing.type_name(), latency, counts);
        }

        Ok(output)
    }

    /// Run every active tier against `processing`.
    pub fn run(&self, processing: &mut MatchProcessing) -> Result<EngineOutcome, MatchError> {
        info!(
            type_name = %processing.type_name(),
            source_records = processing.source().list().len(),
            target_records = processing.target().list().len(),
            tiers = self.tiers.len(),
            "engine_start"
        );

        let mut outcome = EngineOutcome::default();
        let mut leftover = CompareResultList::new();

        for active in self.tiers.iter() {
            let (next, report) =
                self.run_tier(&active.tier, processing, &leftover, &mut outcome.matches)?;
            debug!(
                type_name = %processing.type_name(),
                tier = %report.name,
                tier_weight = report.weight,
                source_candidates = report.source_candidates,
                target_candidates = report.target_candidates,
                pairs = report.pairs,
                post_processed_groups = report.post_processed_groups,
                matched = report.matched,
                leftover = report.leftover,
                "tier_done"
            );
            outcome.tiers.push(report);
            leftover = next;
        }

        outcome.leftover = leftover;
        info!(
            type_name = %processing.type_name(),
            matched = outcome.matches.len(),
            leftover = outcome.leftover.len(),
            "engine_done"
        );
        Ok(outcome)
    }

    fn run_tier(
        &self,
        tier: &IndexRuleType,
        processing: &mut MatchProcessing,
        previous: &CompareResultList,
        matches: &mut BTreeMap<usize, usize>,
    ) -> Result<(CompareResultList, TierReport), MatchError> {
        processing.prepare_remaining(true, tier.is_seed, previous);

        let mut raw = CompareResultList::new();
        let mut post_processes = Vec::new();
        let mut max_match_value = 0u64;
        for rule in &tier.rules {
            let counts = self.run_rule(rule, processing, &mut raw, &mut post_processes);
            if counts {
                max_match_value += u64::from(rule.weight);
            }
        }

        let current = raw.summed();
        let current_max = current.max_weight();
        let mut current_weights: BTreeMap<(usize, usize), u64> =
            current.iter().map(|r| (r.pair(), r.weight)).collect();

        let mut merged = current;
        merged.extend(previous.elevated(current_max));
        let merged = merged.summed();

        for post in &post_processes {
            debug!(
                rule = %post.rule,
                groups = post.groups.len(),
                split_match = tier.split_match,
                "post_process_applied"
            );
        }

        let mut ineligible: BTreeSet<(usize, usize)> = BTreeSet::new();
        let merged: CompareResultList = merged
            .into_iter()
            .map(|mut result| {
                for post in &post_processes {
                    match post.apply(result.left, result.right) {
                        PostOutcome::Bonus(weight) => {
                            result.weight = result.weight.saturating_add(weight);
                            *current_weights.entry(result.pair()).or_insert(0) += weight;
                        }
                        PostOutcome::Satisfied => {}
                        PostOutcome::Unsatisfied => {
                            if tier.split_match {
                                ineligible.insert(result.pair());
                            }
                        }
                    }
                }
                result
            })
            .collect();

        if tier.split_match {
            for result in merged.iter() {
                let own = current_weights.get(&result.pair()).copied().unwrap_or(0);
                if own < max_match_value {
                    ineligible.insert(result.pair());
                }
            }
        }

        let unique = extract_unique_top_matches(&merged, &ineligible);
        keep_matches(matches, &unique)?;
        processing.adjust_remaining(&unique)?;

        let matched_left: BTreeSet<usize> = unique.iter().map(|r| r.left).collect();
        let matched_right: BTreeSet<usize> = unique.iter().map(|r| r.right).collect();
        let pairs = merged.len();
        let mut leftover = merged;
        leftover.retain(|r| !matched_left.contains(&r.left) && !matched_right.contains(&r.right));

        let report = TierReport {
            name: tier.name.clone(),
            weight: tier.weight,
            source_candidates: processing.source().current_remaining().len(),
            target_candidates: processing.target().current_remaining().len(),
            max_match_value,
            pairs,
            post_processed_groups: post_processes.iter().map(|p| p.groups.len()).sum(),
            matched: unique.len(),
            leftover: leftover.len(),
        };
        Ok((leftover, report))
    }

    /// Compare the current candidates of both sides under one rule.
    ///
    /// Returns whether the rule counts toward the tier's max match value: it
    /// must not need post-processing and at least one side must have keys.
    fn run_rule(
        &self,
        rule: &IndexRule,
        processing: &MatchProcessing,
        results: &mut CompareResultList,
        post_processes: &mut Vec<PostProcess>,
    ) -> bool {
        let left_index = rule_index(rule, processing.source());
        let right_index = rule_index(rule, processing.target());
        let weight = u64::from(rule.weight);

        let mut expanded: BTreeSet<(usize, usize)> = BTreeSet::new();
        let mut oversized: Vec<(BTreeSet<usize>, BTreeSet<usize>)> = Vec::new();
        merge_join(&left_index, &right_index, |group| {
            if group.product() > self.options.max_group_product {
                debug!(
                    rule = %rule.name,
                    key = %group.key,
                    sources = group.left.len(),
                    targets = group.right.len(),
                    "key_group_post_processed"
                );
                oversized.push((
                    group.left.into_iter().collect(),
                    group.right.into_iter().collect(),
                ));
                return;
            }
            for &left in &group.left {
                for &right in &group.right {
                    if expanded.insert((left, right)) {
                        results.push(CompareResult::new(left, right, weight));
                    }
                }
            }
        });

        if !oversized.is_empty() {
            post_processes.push(PostProcess {
                rule: rule.name.clone(),
                weight,
                groups: oversized,
                expanded,
            });
            return false;
        }
        !left_index.is_empty() || !right_index.is_empty()
    }
}

fn rule_index(rule: &IndexRule, side: &SideState) -> Vec<(String, usize)> {
    build_sorted_index(side.current_remaining(), |idx| {
        side.list()
            .get(idx)
            .map(|record| rule.key.keys(record))
            .unwrap_or_default()
    })
}

/// Pairs that are the single best candidate of both their source and their
/// target. Ties disqualify; `ineligible` pairs neither win nor compete.
fn extract_unique_top_matches(
    results: &CompareResultList,
    ineligible: &BTreeSet<(usize, usize)>,
) -> Vec<CompareResult> {
    let mut best_left: BTreeMap<usize, (u64, usize)> = BTreeMap::new();
    let mut best_right: BTreeMap<usize, (u64, usize)> = BTreeMap::new();

    for result in eligible(results, ineligible) {
        for (map, key) in [(&mut best_left, result.left), (&mut best_right, result.right)] {
            let entry = map.entry(key).or_insert((result.weight, 0));
            if result.weight > entry.0 {
                *entry = (result.weight, 1);
            } else if result.weight == entry.0 {
                entry.1 += 1;
            }
        }
    }

    let is_single_best = |map: &BTreeMap<usize, (u64, usize)>, key: usize, weight: u64| {
        map.get(&key) == Some(&(weight, 1))
    };

    eligible(results, ineligible)
        .filter(|r| {
            is_single_best(&best_left, r.left, r.weight)
                && is_single_best(&best_right, r.right, r.weight)
        })
        .copied()
        .collect()
}

fn eligible<'a>(
    results: &'a CompareResultList,
    ineligible: &'a BTreeSet<(usize, usize)>,
) -> impl Iterator<Item = &'a CompareResult> + 'a {
    results
        .iter()
        .filter(move |r| !ineligible.contains(&r.pair()))
}

fn keep_matches(
    matches: &mut BTreeMap<usize, usize>,
    unique: &[CompareResult],
) -> Result<(), MatchError> {
    let claimed: BTreeSet<usize> = matches.values().copied().collect();
    for result in unique {
        if matches.contains_key(&result.left) {
            error!(left = result.left, right = result.right, "source_matched_twice");
            return Err(MatchError::AlreadyMatched {
                side: Side::Source,
                index: result.left,
            });
        }
        if claimed.contains(&result.right) {
            error!(left = result.left, right = result.right, "target_matched_twice");
            return Err(MatchError::AlreadyMatched {
                side: Side::Target,
                index: result.right,
            });
        }
        matches.insert(result.left, result.right);
    }
    Ok(())
}
