//! Per-type match state.
//!
//! A [`MatchProcessing`] value is created for every type run and owned by the
//! worker running it. It holds both record lists and, per side, the indices
//! that are still unmatched (`remaining`) plus the subset the running tier
//! works on (`current_remaining`).
use std::collections::BTreeSet;

use ingest::{Record, RecordKind};
use tracing::error;

use crate::compare::{CompareResult, CompareResultList};
use crate::record_list::RecordList;
use crate::types::{MatchError, Side};

/// State of one side of a type run.
#[derive(Debug, Clone, PartialEq)]
pub struct SideState {
    list: RecordList,
    remaining: Vec<usize>,
    current_remaining: Vec<usize>,
}

impl SideState {
    fn new(records: Vec<Record>) -> Self {
        let mut list = RecordList::new(records);
        list.sort();
        let remaining: Vec<usize> = (0..list.len()).collect();
        Self {
            current_remaining: remaining.clone(),
            list,
            remaining,
        }
    }

    pub fn list(&self) -> &RecordList {
        &self.list
    }

    /// Unmatched indices, ascending.
    pub fn remaining(&self) -> &[usize] {
        &self.remaining
    }

    /// Indices the running tier compares, ascending.
    pub fn current_remaining(&self) -> &[usize] {
        &self.current_remaining
    }

    fn restrict(&mut self, keep: impl Fn(usize) -> bool) {
        self.current_remaining = self
            .remaining
            .iter()
            .copied()
            .filter(|&idx| keep(idx))
            .collect();
    }

    fn remove(&mut self, side: Side, sorted: &[usize]) -> Result<(), MatchError> {
        for &index in sorted {
            match self.remaining.binary_search(&index) {
                Ok(pos) => {
                    self.remaining.remove(pos);
                }
                Err(_) => {
                    error!(side = %side, index, "remaining_index_missing");
                    return Err(MatchError::NotRemaining { side, index });
                }
            }
        }
        Ok(())
    }
}

/// Mutable state of a single type run.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchProcessing {
    kind: RecordKind,
    source: SideState,
    target: SideState,
}

impl MatchProcessing {
    /// Sort both record lists and mark every record as remaining.
    pub fn new(kind: RecordKind, source: Vec<Record>, target: Vec<Record>) -> Self {
        Self {
            kind,
            source: SideState::new(source),
            target: SideState::new(target),
        }
    }

    pub fn kind(&self) -> &RecordKind {
        &self.kind
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    pub fn source(&self) -> &SideState {
        &self.source
    }

    pub fn target(&self) -> &SideState {
        &self.target
    }

    pub fn side(&self, side: Side) -> &SideState {
        match side {
            Side::Source => &self.source,
            Side::Target => &self.target,
        }
    }

    /// Select the records the next tier compares.
    ///
    /// Both flags select every remaining record. `keep_seeded` alone keeps the
    /// remaining records that appear in `results` (left indices on the source
    /// side, right indices on the target side); `keep_unseeded` alone keeps
    /// those that do not. Neither flag selects nothing.
    pub fn prepare_remaining(
        &mut self,
        keep_seeded: bool,
        keep_unseeded: bool,
        results: &CompareResultList,
    ) {
        let left: BTreeSet<usize> = results.left_ids();
        let right: BTreeSet<usize> = results.right_ids();
        match (keep_seeded, keep_unseeded) {
            (true, true) => {
                self.source.restrict(|_| true);
                self.target.restrict(|_| true);
            }
            (true, false) => {
                self.source.restrict(|idx| left.contains(&idx));
                self.target.restrict(|idx| right.contains(&idx));
            }
            (false, true) => {
                self.source.restrict(|idx| !left.contains(&idx));
                self.target.restrict(|idx| !right.contains(&idx));
            }
            (false, false) => {
                self.source.restrict(|_| false);
                self.target.restrict(|_| false);
            }
        }
    }

    /// Remove the indices of freshly committed pairs from both remaining sets.
    pub fn adjust_remaining(&mut self, unique: &[CompareResult]) -> Result<(), MatchError> {
        let mut left: Vec<usize> = unique.iter().map(|r| r.left).collect();
        left.sort_unstable();
        self.source.remove(Side::Source, &left)?;

        let mut right: Vec<usize> = unique.iter().map(|r| r.right).collect();
        right.sort_unstable();
        self.target.remove(Side::Target, &right)
    }
}
