// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregation of the outcomes of one run.

use crate::outcome::{Outcome, TestCaseId};
use deqp_expect_metadata::{CaseResultSummary, RunSummary};
use std::collections::{BTreeMap, BTreeSet};

/// The outcomes of a single run, in counted, grouped and raw form.
///
/// All three views are built together as pairs are pushed. The raw pair list
/// is kept so that a case seen with two different outcomes in the same run
/// still reaches the merge step as a conflict.
///
/// An aggregator is owned by one run and is consumed by
/// [`MergeEngine::merge`](crate::merge::MergeEngine::merge).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunAggregator {
    pairs: Vec<(TestCaseId, Outcome)>,
    counts: BTreeMap<Outcome, usize>,
    by_outcome: BTreeMap<Outcome, BTreeSet<TestCaseId>>,
}

impl RunAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one outcome.
    pub fn push(&mut self, case_id: TestCaseId, outcome: Outcome) {
        *self.counts.entry(outcome.clone()).or_default() += 1;
        self.by_outcome
            .entry(outcome.clone())
            .or_default()
            .insert(case_id.clone());
        self.pairs.push((case_id, outcome));
    }

    /// Returns true if no outcomes were recorded.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Returns the number of recorded outcomes, duplicates included.
    pub fn total(&self) -> usize {
        self.pairs.len()
    }

    /// Returns the number of recorded outcomes that are not healthy.
    pub fn failure_count(&self) -> usize {
        self.counts
            .iter()
            .filter(|(outcome, _)| !outcome.is_healthy())
            .map(|(_, count)| count)
            .sum()
    }

    /// Returns outcome counts.
    pub fn counts(&self) -> &BTreeMap<Outcome, usize> {
        &self.counts
    }

    /// Returns the set of test cases seen with each outcome.
    pub fn by_outcome(&self) -> &BTreeMap<Outcome, BTreeSet<TestCaseId>> {
        &self.by_outcome
    }

    /// Returns every recorded pair in execution order.
    pub fn pairs(&self) -> &[(TestCaseId, Outcome)] {
        &self.pairs
    }

    /// Consumes the aggregator, returning the recorded pairs.
    pub fn into_pairs(self) -> Vec<(TestCaseId, Outcome)> {
        self.pairs
    }

    /// Returns the test cases seen with two or more distinct outcomes in this
    /// run, with those outcomes.
    pub fn conflicts(&self) -> BTreeMap<&TestCaseId, BTreeSet<&Outcome>> {
        let mut seen: BTreeMap<&TestCaseId, BTreeSet<&Outcome>> = BTreeMap::new();
        for (case_id, outcome) in &self.pairs {
            seen.entry(case_id).or_default().insert(outcome);
        }
        seen.retain(|_, outcomes| outcomes.len() > 1);
        seen
    }

    /// Produces a machine-readable summary.
    ///
    /// If `include_results` is true, every pair is listed.
    pub fn summary(&self, include_results: bool) -> RunSummary {
        let mut summary = RunSummary::default();
        summary.total = self.total();
        summary.failures = self.failure_count();
        summary.counts = self
            .counts
            .iter()
            .map(|(outcome, count)| (outcome.to_string(), *count))
            .collect();
        summary.conflicts = self
            .conflicts()
            .into_iter()
            .map(|(case_id, outcomes)| {
                (
                    case_id.to_string(),
                    outcomes.into_iter().map(|o| o.to_string()).collect(),
                )
            })
            .collect();
        if include_results {
            summary.results = self
                .pairs
                .iter()
                .map(|(case_id, outcome)| CaseResultSummary {
                    case: case_id.to_string(),
                    outcome: outcome.to_string(),
                })
                .collect();
        }
        summary
    }
}

impl Extend<(TestCaseId, Outcome)> for RunAggregator {
    fn extend<T: IntoIterator<Item = (TestCaseId, Outcome)>>(&mut self, iter: T) {
        for (case_id, outcome) in iter {
            self.push(case_id, outcome);
        }
    }
}

impl FromIterator<(TestCaseId, Outcome)> for RunAggregator {
    fn from_iter<T: IntoIterator<Item = (TestCaseId, Outcome)>>(iter: T) -> Self {
        let mut aggregator = Self::new();
        aggregator.extend(iter);
        aggregator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::{btreemap, btreeset};
    use pretty_assertions::assert_eq;

    fn id(s: &str) -> TestCaseId {
        TestCaseId::new(s).unwrap()
    }

    #[test]
    fn empty_run() {
        let run = RunAggregator::new();
        assert!(run.is_empty());
        assert_eq!(run.total(), 0);
        assert_eq!(run.failure_count(), 0);
        assert!(run.counts().is_empty());
        assert!(run.by_outcome().is_empty());
        assert!(run.conflicts().is_empty());
    }

    #[test]
    fn counts_and_sets() {
        let run: RunAggregator = [
            (id("a"), Outcome::Pass),
            (id("b"), Outcome::Fail),
            (id("a"), Outcome::Pass),
            (id("c"), Outcome::NotSupported),
            (id("d"), Outcome::Crash),
        ]
        .into_iter()
        .collect();

        assert_eq!(run.total(), 5);
        assert_eq!(run.failure_count(), 2);
        assert_eq!(
            run.counts(),
            &btreemap! {
                Outcome::Pass => 2,
                Outcome::Fail => 1,
                Outcome::NotSupported => 1,
                Outcome::Crash => 1,
            }
        );
        assert_eq!(
            run.by_outcome(),
            &btreemap! {
                Outcome::Pass => btreeset! {id("a")},
                Outcome::Fail => btreeset! {id("b")},
                Outcome::NotSupported => btreeset! {id("c")},
                Outcome::Crash => btreeset! {id("d")},
            }
        );
        assert!(run.conflicts().is_empty());
    }

    #[test]
    fn same_run_conflicts_are_kept() {
        let run: RunAggregator = [
            (id("a"), Outcome::Pass),
            (id("a"), Outcome::Fail),
            (id("b"), Outcome::Pass),
        ]
        .into_iter()
        .collect();

        let a = id("a");
        assert_eq!(
            run.conflicts(),
            btreemap! { &a => btreeset! {&Outcome::Fail, &Outcome::Pass} }
        );
        assert_eq!(run.pairs().len(), 3);
    }

    #[test]
    fn summary() {
        let run: RunAggregator = [
            (id("a"), Outcome::Pass),
            (id("a"), Outcome::Timeout),
        ]
        .into_iter()
        .collect();
        let summary = run.summary(true);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(
            summary.counts,
            btreemap! {"Pass".to_owned() => 1, "Timeout".to_owned() => 1}
        );
        assert_eq!(
            summary.conflicts,
            btreemap! {"a".to_owned() => vec!["Pass".to_owned(), "Timeout".to_owned()]}
        );
        assert_eq!(summary.results.len(), 2);
        assert!(run.summary(false).results.is_empty());
    }
}
