use super::*;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use ingest::{Record, RecordKind};
use serde_json::{json, Value};

use crate::metrics::{set_match_metrics, MatchMetrics};
use crate::output::MatchOutput;
use crate::rules::{IndexRule, KeySource};

fn kind() -> RecordKind {
    RecordKind::for_type("dashboard", false)
}

fn records(values: Vec<Value>) -> Vec<Record> {
    values
        .into_iter()
        .map(|value| Record::from_value(value, &kind(), None).expect("valid record"))
        .collect()
}

fn tier(name: &str, weight: u32, is_seed: bool, split_match: bool, rules: Vec<IndexRule>) -> IndexRuleType {
    IndexRuleType {
        name: name.into(),
        weight,
        is_seed,
        split_match,
        rules,
    }
}

fn field(path: &str) -> IndexRule {
    IndexRule::pointer(path.trim_start_matches('/'), path, 1)
}

fn matcher(tiers: Vec<IndexRuleType>) -> Matcher {
    Matcher::new(tiers, EngineOptions::default()).expect("valid rules")
}

fn run(
    matcher: &Matcher,
    source: Vec<Value>,
    target: Vec<Value>,
    previous: Option<&MatchOutput>,
) -> Result<MatchOutput, MatchError> {
    let mut processing = MatchProcessing::new(kind(), records(source), records(target));
    matcher.match_type(&mut processing, previous, MatchKey::default())
}

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn single_shared_key_is_a_unique_match() -> Result<(), MatchError> {
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/key")])]);
    let out = run(
        &m,
        vec![json!({ "id": "A", "key": "X" })],
        vec![json!({ "id": "B", "key": "X" })],
        None,
    )?;

    assert_eq!(out.matches.get("A").map(String::as_str), Some("B"));
    assert!(out.multi_matched.is_empty());
    assert!(out.unmatched.is_empty());
    Ok(())
}

#[test]
fn shared_key_with_two_targets_is_multi_matched() -> Result<(), MatchError> {
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/key")])]);
    let out = run(
        &m,
        vec![json!({ "id": "A", "key": "X" })],
        vec![json!({ "id": "B2", "key": "X" }), json!({ "id": "B1", "key": "X" })],
        None,
    )?;

    assert!(out.matches.is_empty());
    assert_eq!(out.multi_matched.get("A"), Some(&ids(&["B1", "B2"])));
    assert!(out.unmatched.is_empty());
    Ok(())
}

#[test]
fn records_without_keys_end_unmatched() -> Result<(), MatchError> {
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/key")])]);
    let out = run(
        &m,
        vec![json!({ "id": "A" }), json!({ "id": "C", "key": "" })],
        vec![json!({ "id": "B", "key": "X" })],
        None,
    )?;
    assert!(out.matches.is_empty());
    assert_eq!(out.unmatched, ids(&["A", "C"]));
    Ok(())
}

#[test]
fn empty_sides_produce_empty_output() -> Result<(), MatchError> {
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/key")])]);
    let out = run(&m, vec![], vec![json!({ "id": "B", "key": "X" })], None)?;
    assert!(out.matches.is_empty());
    assert!(out.multi_matched.is_empty());
    assert!(out.unmatched.is_empty());
    Ok(())
}

#[test]
fn split_tier_defers_partial_pairs() -> Result<(), MatchError> {
    let split = tier("both", 100, true, true, vec![field("/name"), field("/scope")]);
    let source = vec![json!({ "id": "A", "name": "n", "scope": "s1" })];
    let target = vec![json!({ "id": "B", "name": "n", "scope": "s2" })];

    let only_split = matcher(vec![split.clone()]);
    let mut processing =
        MatchProcessing::new(kind(), records(source.clone()), records(target.clone()));
    let outcome = only_split.run(&mut processing)?;
    assert!(outcome.matches.is_empty());
    assert_eq!(outcome.tiers[0].max_match_value, 2);
    assert_eq!(outcome.leftover.as_slice(), &[CompareResult::new(0, 0, 1)]);

    let with_fallback = matcher(vec![
        split,
        tier("name", 50, true, false, vec![field("/name")]),
    ]);
    let mut processing = MatchProcessing::new(kind(), records(source), records(target));
    let outcome = with_fallback.run(&mut processing)?;
    assert_eq!(outcome.tiers[0].matched, 0);
    assert_eq!(outcome.tiers[1].matched, 1);
    assert_eq!(outcome.matches.get(&0), Some(&0));
    Ok(())
}

#[test]
fn split_tier_promotes_pairs_meeting_every_rule() -> Result<(), MatchError> {
    let m = matcher(vec![tier(
        "both",
        100,
        true,
        true,
        vec![field("/name"), field("/scope")],
    )]);
    let out = run(
        &m,
        vec![
            json!({ "id": "A", "name": "n", "scope": "s1" }),
            json!({ "id": "C", "name": "n", "scope": "s2" }),
        ],
        vec![
            json!({ "id": "B", "name": "n", "scope": "s1" }),
            json!({ "id": "D", "name": "n", "scope": "s3" }),
        ],
        None,
    )?;
    assert_eq!(out.matches.get("A").map(String::as_str), Some("B"));
    assert_eq!(out.multi_matched.get("C"), Some(&ids(&["D"])));
    Ok(())
}

#[test]
fn ties_disqualify_and_are_carried_forward() -> Result<(), MatchError> {
    // A-X scores 2, A-Y and B-Y score 1: A-X wins, Y is tied between A and B.
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/k1"), field("/k2")])]);
    let mut processing = MatchProcessing::new(
        kind(),
        records(vec![
            json!({ "id": "A", "k1": "x", "k2": ["x", "y"] }),
            json!({ "id": "B", "k1": "y" }),
        ]),
        records(vec![
            json!({ "id": "X", "k1": "x", "k2": "x" }),
            json!({ "id": "Y", "k1": "y", "k2": "y" }),
        ]),
    );
    let outcome = m.run(&mut processing)?;

    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches.get(&0), Some(&0));
    // B-Y lost its tie at the time of extraction and stays a candidate.
    assert_eq!(outcome.leftover.as_slice(), &[CompareResult::new(1, 1, 1)]);
    Ok(())
}

#[test]
fn multi_valued_key_counts_once_per_rule() -> Result<(), MatchError> {
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/tags")])]);
    let mut processing = MatchProcessing::new(
        kind(),
        records(vec![json!({ "id": "A", "tags": ["a", "b"] })]),
        records(vec![
            json!({ "id": "X", "tags": ["a", "b"] }),
            json!({ "id": "Y", "tags": ["a"] }),
        ]),
    );
    let outcome = m.run(&mut processing)?;
    assert!(outcome.matches.is_empty());
    assert_eq!(
        outcome.leftover.as_slice(),
        &[CompareResult::new(0, 0, 1), CompareResult::new(0, 1, 1)]
    );
    Ok(())
}

#[test]
fn leftover_is_elevated_above_the_next_tier() -> Result<(), MatchError> {
    let m = matcher(vec![
        tier("group", 100, true, false, vec![field("/group")]),
        tier("host", 50, true, false, vec![field("/host")]),
    ]);
    let out = run(
        &m,
        vec![json!({ "id": "A", "group": "g", "host": "h2" })],
        vec![
            json!({ "id": "X", "group": "g", "host": "h1" }),
            json!({ "id": "Y", "group": "g", "host": "h2" }),
        ],
        None,
    )?;
    assert_eq!(out.matches.get("A").map(String::as_str), Some("Y"));
    Ok(())
}

#[test]
fn non_seed_tier_only_sees_leftover_records() -> Result<(), MatchError> {
    let m = matcher(vec![
        tier("group", 100, true, false, vec![field("/group")]),
        tier("host", 50, false, false, vec![field("/host")]),
    ]);
    let out = run(
        &m,
        vec![
            json!({ "id": "A", "group": "g", "host": "hx" }),
            json!({ "id": "B", "group": "g" }),
            json!({ "id": "C", "host": "h" }),
        ],
        vec![
            json!({ "id": "X", "group": "g", "host": "hx" }),
            json!({ "id": "Y", "group": "g" }),
            json!({ "id": "Z", "host": "h" }),
        ],
        None,
    )?;

    assert_eq!(out.matches.len(), 1);
    assert_eq!(out.matches.get("A").map(String::as_str), Some("X"));
    assert_eq!(out.multi_matched.get("B"), Some(&ids(&["Y"])));
    assert_eq!(out.unmatched, ids(&["C"]));
    Ok(())
}

#[test]
fn seed_tier_sees_every_remaining_record() -> Result<(), MatchError> {
    let m = matcher(vec![
        tier("group", 100, true, false, vec![field("/group")]),
        tier("host", 50, true, false, vec![field("/host")]),
    ]);
    let out = run(
        &m,
        vec![json!({ "id": "C", "host": "h" })],
        vec![json!({ "id": "Z", "host": "h" })],
        None,
    )?;
    assert_eq!(out.matches.get("C").map(String::as_str), Some("Z"));
    Ok(())
}

#[test]
fn self_match_skips_disabled_rules() -> Result<(), MatchError> {
    let tiers = vec![
        tier(
            "ids",
            100,
            true,
            false,
            vec![IndexRule::new("id", KeySource::Id, 1).self_match_disabled()],
        ),
        tier("names", 50, true, false, vec![IndexRule::new("name", KeySource::Name, 1)]),
    ];
    let source = vec![json!({ "id": "A", "name": "one" })];
    let target = vec![
        json!({ "id": "A", "name": "two" }),
        json!({ "id": "B", "name": "one" }),
    ];

    let normal = Matcher::new(tiers.clone(), EngineOptions::default())?;
    let out = run(&normal, source.clone(), target.clone(), None)?;
    assert_eq!(out.matches.get("A").map(String::as_str), Some("A"));

    let self_match = Matcher::new(
        tiers,
        EngineOptions {
            self_match: true,
            ..EngineOptions::default()
        },
    )?;
    assert_eq!(self_match.tiers().len(), 1);
    let out = run(&self_match, source, target, None)?;
    assert_eq!(out.matches.get("A").map(String::as_str), Some("B"));
    Ok(())
}

#[test]
fn oversized_groups_become_post_process_bonus() -> Result<(), MatchError> {
    let options = EngineOptions {
        max_group_product: 1,
        ..EngineOptions::default()
    };
    let m = Matcher::new(
        vec![tier("t", 10, true, false, vec![field("/env"), field("/name")])],
        options,
    )?;
    let mut processing = MatchProcessing::new(
        kind(),
        records(vec![
            json!({ "id": "A", "env": "prod", "name": "a" }),
            json!({ "id": "B", "env": "prod", "name": "b" }),
        ]),
        records(vec![
            json!({ "id": "X", "env": "prod", "name": "a" }),
            json!({ "id": "Y", "env": "prod", "name": "b" }),
        ]),
    );
    let outcome = m.run(&mut processing)?;

    let report = &outcome.tiers[0];
    assert_eq!(report.post_processed_groups, 1);
    assert_eq!(report.max_match_value, 1);
    assert_eq!(outcome.matches.len(), 2);
    assert_eq!(outcome.matches.get(&0), Some(&0));
    assert_eq!(outcome.matches.get(&1), Some(&1));
    Ok(())
}

#[test]
fn split_tier_rejects_pairs_outside_post_process_groups() -> Result<(), MatchError> {
    let options = EngineOptions {
        max_group_product: 1,
        ..EngineOptions::default()
    };
    let m = Matcher::new(
        vec![tier("t", 10, true, true, vec![field("/env"), field("/name")])],
        options,
    )?;
    let mut processing = MatchProcessing::new(
        kind(),
        records(vec![
            json!({ "id": "A", "env": "prod", "name": "a" }),
            json!({ "id": "B", "env": "prod", "name": "b" }),
        ]),
        records(vec![
            json!({ "id": "X", "env": "prod", "name": "a" }),
            json!({ "id": "Y", "env": "dev", "name": "b" }),
        ]),
    );
    let outcome = m.run(&mut processing)?;

    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches.get(&0), Some(&0));
    assert_eq!(outcome.leftover.as_slice(), &[CompareResult::new(1, 1, 1)]);
    Ok(())
}

#[test]
fn previous_match_is_kept_without_current_candidate() -> Result<(), MatchError> {
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/key")])]);
    let previous = MatchOutput {
        type_name: "dashboard".into(),
        matches: [("A".to_string(), "B".to_string())].into_iter().collect(),
        ..MatchOutput::default()
    };
    let out = run(
        &m,
        vec![json!({ "id": "A", "key": "nothing" })],
        vec![json!({ "id": "B", "key": "else" })],
        Some(&previous),
    )?;
    assert_eq!(out.matches.get("A").map(String::as_str), Some("B"));
    assert!(out.unmatched.is_empty());
    Ok(())
}

#[test]
fn committed_pairs_form_a_bijection_and_outputs_partition() -> Result<(), MatchError> {
    let m = matcher(vec![
        tier("exact", 100, true, false, vec![field("/a"), field("/b")]),
        tier("loose", 50, false, false, vec![field("/c")]),
    ]);
    let source: Vec<Value> = (0..40)
        .map(|i| json!({ "id": format!("s{i:02}"), "a": i % 7, "b": i % 3, "c": i % 2 }))
        .collect();
    let target: Vec<Value> = (0..35)
        .map(|i| json!({ "id": format!("t{i:02}"), "a": i % 7, "b": i % 5, "c": i % 2 }))
        .collect();
    let out = run(&m, source.clone(), target, None)?;

    let targets: BTreeSet<&String> = out.matches.values().collect();
    assert_eq!(targets.len(), out.matches.len());

    for value in &source {
        let id = value["id"].as_str().expect("id");
        let buckets = [
            out.matches.contains_key(id),
            out.multi_matched.contains_key(id),
            out.unmatched.iter().any(|u| u == id),
        ];
        assert_eq!(buckets.iter().filter(|b| **b).count(), 1, "{id} in {buckets:?}");
    }
    Ok(())
}

#[test]
fn identical_input_gives_identical_output() -> Result<(), MatchError> {
    let m = matcher(vec![tier("t", 10, true, false, vec![field("/k")])]);
    let source: Vec<Value> = (0..20)
        .map(|i| json!({ "id": format!("s{i}"), "k": i % 4 }))
        .collect();
    let target: Vec<Value> = (0..20)
        .rev()
        .map(|i| json!({ "id": format!("t{i}"), "k": i % 5 }))
        .collect();
    let first = run(&m, source.clone(), target.clone(), None)?;
    let second = run(&m, source, target, None)?;
    let first = serde_json::to_string(&first).expect("serialize");
    let second = serde_json::to_string(&second).expect("serialize");
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn keep_matches_rejects_double_commit() {
    let mut matches = BTreeMap::new();
    keep_matches(&mut matches, &[CompareResult::new(0, 1, 1)]).expect("first commit");
    let err = keep_matches(&mut matches, &[CompareResult::new(0, 2, 1)])
        .expect_err("source 0 is committed");
    assert_eq!(
        err,
        MatchError::AlreadyMatched {
            side: Side::Source,
            index: 0
        }
    );
    let err = keep_matches(&mut matches, &[CompareResult::new(3, 1, 1)])
        .expect_err("target 1 is committed");
    assert!(err.is_invariant_violation());
}

#[test]
fn invalid_rules_are_rejected_up_front() {
    let err = Matcher::new(
        vec![tier("t", 10, true, false, vec![IndexRule::new("w", KeySource::Id, 0)])],
        EngineOptions::default(),
    )
    .expect_err("zero weight");
    assert!(matches!(err, MatchError::InvalidRule { .. }));

    let err = Matcher::new(
        vec![tier(
            "t",
            10,
            true,
            false,
            vec![IndexRule::new("id", KeySource::Id, 1).self_match_disabled()],
        )],
        EngineOptions {
            self_match: true,
            ..EngineOptions::default()
        },
    )
    .expect_err("no active tier");
    assert!(matches!(err, MatchError::InvalidConfig(_)));
}

#[derive(Default)]
struct RecordingMetrics {
    events: Arc<RwLock<Vec<(String, MatchCounts)>>>,
}

impl RecordingMetrics {
    fn snapshot(&self) -> Vec<(String, MatchCounts)> {
        self.events.read().unwrap().clone()
    }
}

impl MatchMetrics for RecordingMetrics {
    fn record_match(&self, type_name: &str, _latency: Duration, counts: MatchCounts) {
        self.events
            .write()
            .unwrap()
            .push((type_name.to_string(), counts));
    }
}

#[test]
fn metrics_recorder_observes_type_runs() -> Result<(), MatchError> {
    let metrics = Arc::new(RecordingMetrics::default());
    set_match_metrics(Some(metrics.clone()));

    let m = matcher(vec![tier("t", 10, true, false, vec![field("/key")])]);
    let kind = RecordKind::for_type("metrics-probe", false);
    let rec = |value: Value| Record::from_value(value, &kind, None).expect("valid record");
    let mut processing = MatchProcessing::new(
        kind.clone(),
        vec![rec(json!({ "id": "A", "key": "X" }))],
        vec![rec(json!({ "id": "B", "key": "X" })), rec(json!({ "id": "C" }))],
    );
    m.match_type(&mut processing, None, MatchKey::default())?;
    set_match_metrics(None);

    let events = metrics.snapshot();
    // Other tests may run concurrently and report through the same recorder.
    let probe = events
        .iter()
        .find(|(name, _)| name == "metrics-probe")
        .map(|(_, counts)| *counts)
        .expect("probe run recorded");
    assert_eq!(probe.source_records, 1);
    assert_eq!(probe.target_records, 2);
    assert_eq!(probe.matched, 1);
    Ok(())
}
