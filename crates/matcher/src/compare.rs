//! Candidate pairs and their accumulated weights.
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// A candidate pairing of a source index and a target index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CompareResult {
    pub left: usize,
    pub right: usize,
    pub weight: u64,
}

impl CompareResult {
    pub fn new(left: usize, right: usize, weight: u64) -> Self {
        Self {
            left,
            right,
            weight,
        }
    }

    pub fn pair(&self) -> (usize, usize) {
        (self.left, self.right)
    }
}

/// Candidate pairs of one tier.
///
/// Pushing never merges; [`CompareResultList::summed`] folds results of the
/// same pair into one by adding their weights and orders the list by
/// `(left, right)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompareResultList {
    results: Vec<CompareResult>,
}

impl CompareResultList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: CompareResult) {
        self.results.push(result);
    }

    pub fn extend(&mut self, other: CompareResultList) {
        self.results.extend(other.results);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompareResult> {
        self.results.iter()
    }

    pub fn as_slice(&self) -> &[CompareResult] {
        &self.results
    }

    /// Sum weights per pair, ordered by `(left, right)`.
    pub fn summed(&self) -> Self {
        let mut sums: BTreeMap<(usize, usize), u64> = BTreeMap::new();
        for result in &self.results {
            *sums.entry(result.pair()).or_insert(0) += result.weight;
        }
        Self {
            results: sums
                .into_iter()
                .map(|((left, right), weight)| CompareResult::new(left, right, weight))
                .collect(),
        }
    }

    /// Highest weight of any result, `0` when empty.
    pub fn max_weight(&self) -> u64 {
        self.results.iter().map(|r| r.weight).max().unwrap_or(0)
    }

    /// Add `by` to every weight.
    pub fn elevated(&self, by: u64) -> Self {
        Self {
            results: self
                .results
                .iter()
                .map(|r| CompareResult::new(r.left, r.right, r.weight.saturating_add(by)))
                .collect(),
        }
    }

    /// Distinct source indices, ascending.
    pub fn left_ids(&self) -> BTreeSet<usize> {
        self.results.iter().map(|r| r.left).collect()
    }

    /// Distinct target indices, ascending.
    pub fn right_ids(&self) -> BTreeSet<usize> {
        self.results.iter().map(|r| r.right).collect()
    }

    /// Keep only results for which `keep` returns `true`.
    pub fn retain(&mut self, keep: impl FnMut(&CompareResult) -> bool) {
        self.results.retain(keep);
    }
}

impl FromIterator<CompareResult> for CompareResultList {
    fn from_iter<I: IntoIterator<Item = CompareResult>>(iter: I) -> Self {
        Self {
            results: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CompareResultList {
    type Item = CompareResult;
    type IntoIter = std::vec::IntoIter<CompareResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}
