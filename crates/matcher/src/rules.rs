//! Weighted index rule model.
//!
//! A rule pulls one or more keys out of a record; every source/target pair
//! sharing a key earns the rule's weight. Rules are grouped into tiers
//! ([`IndexRuleType`]) that are processed from the highest tier weight down.
//!
//! ```text
//! IndexRuleType (tier)          is_seed / split_match / weight
//! └── IndexRule                 key source / weight / self_match_disabled
//!     └── KeySource             Id | Name | EntityRefs | Pointer { path }
//! ```
use ingest::Record;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::MatchError;

/// Where a rule reads its keys from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum KeySource {
    /// The record's external identifier.
    Id,
    /// The derived display name.
    Name,
    /// Every entity id the record references.
    EntityRefs,
    /// A JSON pointer into the record body.
    Pointer { path: String },
}

impl KeySource {
    /// Extract the keys of `record`, sorted and without duplicates.
    ///
    /// Missing values, `null` and empty strings produce no key. Arrays produce
    /// one key per scalar element; objects are keyed by their canonical JSON
    /// text.
    pub fn keys(&self, record: &Record) -> Vec<String> {
        let mut keys = match self {
            KeySource::Id => vec![record.id().to_string()],
            KeySource::Name => record.name().map(str::to_string).into_iter().collect(),
            KeySource::EntityRefs => record.entity_refs().to_vec(),
            KeySource::Pointer { path } => {
                let mut out = Vec::new();
                if let Some(value) = record.pointer(path) {
                    collect_value_keys(value, &mut out);
                }
                out
            }
        };
        keys.retain(|key| !key.is_empty());
        keys.sort();
        keys.dedup();
        keys
    }
}

fn collect_value_keys(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Null => {}
        Value::String(s) => out.push(s.clone()),
        Value::Number(n) => out.push(n.to_string()),
        Value::Bool(b) => out.push(b.to_string()),
        Value::Array(items) => {
            for item in items {
                if !matches!(item, Value::Array(_)) {
                    collect_value_keys(item, out);
                }
            }
        }
        // serde_json keeps object keys sorted, so the text is canonical.
        Value::Object(_) => out.push(value.to_string()),
    }
}

/// A single weighted comparison rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRule {
    pub name: String,
    pub key: KeySource,
    pub weight: u32,
    /// Skip this rule when source and target are the same environment.
    #[serde(default)]
    pub self_match_disabled: bool,
}

impl IndexRule {
    pub fn new(name: &str, key: KeySource, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            key,
            weight,
            self_match_disabled: false,
        }
    }

    pub fn pointer(name: &str, path: &str, weight: u32) -> Self {
        Self::new(
            name,
            KeySource::Pointer {
                path: path.to_string(),
            },
            weight,
        )
    }

    pub fn self_match_disabled(mut self) -> Self {
        self.self_match_disabled = true;
        self
    }
}

/// A tier: rules processed together before the next tier runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRuleType {
    pub name: String,
    /// Tier weight; tiers run from the highest weight down.
    pub weight: u32,
    /// Seed tiers see every remaining record, other tiers only the records
    /// left over as candidates by the previous tier.
    #[serde(default)]
    pub is_seed: bool,
    /// A pair must satisfy every counting rule of the tier to be matched in
    /// the tier.
    #[serde(default)]
    pub split_match: bool,
    pub rules: Vec<IndexRule>,
}

/// A tier selected for a run, with its position in the configured list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTier {
    pub position: usize,
    pub tier: IndexRuleType,
}

/// Builds the ordered list of tiers that actually run.
#[derive(Debug, Clone)]
pub struct RuleMapGenerator {
    self_match: bool,
    tiers: Vec<IndexRuleType>,
}

impl RuleMapGenerator {
    pub fn new(self_match: bool, tiers: Vec<IndexRuleType>) -> Self {
        Self { self_match, tiers }
    }

    /// Active tiers, highest weight first.
    ///
    /// Self-match-disabled rules are dropped in self-match mode, tiers without
    /// rules are dropped, and tiers of equal weight keep their configured
    /// order.
    pub fn active_tiers(&self) -> Vec<ActiveTier> {
        let mut active: Vec<ActiveTier> = self
            .tiers
            .iter()
            .enumerate()
            .filter_map(|(position, tier)| {
                let rules: Vec<IndexRule> = tier
                    .rules
                    .iter()
                    .filter(|rule| !(self.self_match && rule.self_match_disabled))
                    .cloned()
                    .collect();
                if rules.is_empty() {
                    return None;
                }
                Some(ActiveTier {
                    position,
                    tier: IndexRuleType {
                        rules,
                        ..tier.clone()
                    },
                })
            })
            .collect();
        active.sort_by(|a, b| b.tier.weight.cmp(&a.tier.weight));
        active
    }
}

/// Check a tier list before any record is touched.
pub fn validate_rules(tiers: &[IndexRuleType]) -> Result<(), MatchError> {
    if tiers.is_empty() {
        return Err(MatchError::rule("<rules>", "at least one tier is required"));
    }
    for tier in tiers {
        if tier.name.trim().is_empty() {
            return Err(MatchError::rule("<tier>", "tier name must not be empty"));
        }
        if tier.weight == 0 {
            return Err(MatchError::rule(&tier.name, "tier weight must be positive"));
        }
        for rule in &tier.rules {
            if rule.name.trim().is_empty() {
                return Err(MatchError::rule(&tier.name, "rule name must not be empty"));
            }
            if rule.weight == 0 {
                return Err(MatchError::rule(&rule.name, "weight must be positive"));
            }
            if let KeySource::Pointer { path } = &rule.key {
                if !path.starts_with('/') || path.len() < 2 {
                    return Err(MatchError::rule(
                        &rule.name,
                        format!("pointer `{path}` must start with `/` and name a field"),
                    ));
                }
            }
        }
    }
    Ok(())
}

/// Default tiers for matching monitored entities.
pub fn default_entity_rules() -> Vec<IndexRuleType> {
    vec![
        IndexRuleType {
            name: "entity-id".into(),
            weight: 300,
            is_seed: true,
            split_match: false,
            rules: vec![IndexRule::new("entityId", KeySource::Id, 1).self_match_disabled()],
        },
        IndexRuleType {
            name: "identity".into(),
            weight: 200,
            is_seed: true,
            split_match: false,
            rules: vec![
                IndexRule::new("displayName", KeySource::Name, 1),
                IndexRule::pointer("detectedName", "/properties/detectedName", 1),
                IndexRule::pointer(
                    "oneAgentCustomHostName",
                    "/properties/oneAgentCustomHostName",
                    1,
                ),
                IndexRule::pointer("ipAddress", "/properties/ipAddress", 1),
            ],
        },
        IndexRuleType {
            name: "properties".into(),
            weight: 100,
            is_seed: false,
            split_match: false,
            rules: vec![
                IndexRule::pointer("macAddresses", "/properties/macAddresses", 1),
                IndexRule::pointer("internalIpAddresses", "/properties/internalIpAddresses", 1),
                IndexRule::pointer("hostGroupName", "/properties/hostGroupName", 1),
                IndexRule::pointer("softwareTechnologies", "/properties/softwareTechnologies", 1),
                IndexRule::pointer("tags", "/tags", 1),
            ],
        },
    ]
}

/// Default tiers for matching configurations.
pub fn default_config_rules() -> Vec<IndexRuleType> {
    vec![
        IndexRuleType {
            name: "config-id".into(),
            weight: 300,
            is_seed: true,
            split_match: false,
            rules: vec![IndexRule::new("configId", KeySource::Id, 1).self_match_disabled()],
        },
        IndexRuleType {
            name: "name-and-scope".into(),
            weight: 200,
            is_seed: true,
            split_match: true,
            rules: vec![
                IndexRule::new("name", KeySource::Name, 1),
                IndexRule::new("entities", KeySource::EntityRefs, 1),
            ],
        },
        IndexRuleType {
            name: "name".into(),
            weight: 100,
            is_seed: true,
            split_match: false,
            rules: vec![IndexRule::new("name", KeySource::Name, 1)],
        },
        IndexRuleType {
            name: "scope".into(),
            weight: 50,
            is_seed: false,
            split_match: false,
            rules: vec![IndexRule::new("entities", KeySource::EntityRefs, 1)],
        },
    ]
}
