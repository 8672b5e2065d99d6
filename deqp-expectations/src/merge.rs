// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Folding a run into a persisted baseline.
//!
//! Flakiness is detected across history, not within one run: every case id of
//! the run is added to the set of its outcome, and afterwards any case id
//! found in two kinds at once has been seen with two distinct outcomes and
//! moves to [`Outcome::Flaky`].

use crate::{
    aggregator::RunAggregator,
    errors::MergeError,
    expectations::{ExpectationBaseline, ExpectationKey, ExpectationStore},
    outcome::{Outcome, TestCaseId},
};
use itertools::Itertools;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};
use tracing::{debug, info};

/// Decides which pairs of distinct outcomes make a case flaky.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlakyPolicy {
    /// Any two distinct outcomes make a case flaky, including two different
    /// failure kinds.
    #[default]
    AnyOutcome,

    /// A case is flaky only if one of its outcomes is healthy. A case that
    /// fails in different ways keeps the kind it was most recently seen with.
    HealthyVsUnhealthy,
}

impl FlakyPolicy {
    /// All variants, in the order shown in help text.
    pub const VARIANTS: &'static [&'static str] = &["any-outcome", "healthy-vs-unhealthy"];

    /// Returns the configuration name of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnyOutcome => "any-outcome",
            Self::HealthyVsUnhealthy => "healthy-vs-unhealthy",
        }
    }

    fn counts_as_flaky(self, a: &Outcome, b: &Outcome) -> bool {
        match self {
            Self::AnyOutcome => true,
            Self::HealthyVsUnhealthy => {
                // A case already recorded as flaky stays flaky.
                *a == Outcome::Flaky || *b == Outcome::Flaky || a.is_healthy() || b.is_healthy()
            }
        }
    }
}

impl fmt::Display for FlakyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlakyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "any-outcome" => Ok(Self::AnyOutcome),
            "healthy-vs-unhealthy" => Ok(Self::HealthyVsUnhealthy),
            other => Err(format!(
                "unknown flaky detection policy `{other}` (expected one of: {})",
                Self::VARIANTS.join(", "),
            )),
        }
    }
}

/// The result of folding one run into a baseline, without persisting it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FoldedBaseline {
    /// The updated baseline.
    pub baseline: ExpectationBaseline,

    /// Case ids that became flaky with this run.
    pub newly_flaky: BTreeSet<TestCaseId>,

    /// Case ids that the previous baseline did not know about.
    pub new_cases: BTreeSet<TestCaseId>,
}

/// Folds the pairs of one run into `existing`.
///
/// This is the whole merge algorithm minus I/O:
///
/// 1. every pair adds its case id to the set of its outcome;
/// 2. the union of the intersections of every two kinds that `policy`
///    accepts, plus the previous flaky set, becomes the new flaky set;
/// 3. flaky case ids are removed from every other kind.
///
/// Case ids still present in two kinds after that (only possible when
/// `policy` rejects some pairs) keep the outcome they were last seen with in
/// `pairs`.
pub fn fold_run(
    existing: ExpectationBaseline,
    pairs: &[(TestCaseId, Outcome)],
    policy: FlakyPolicy,
) -> FoldedBaseline {
    let known: BTreeSet<TestCaseId> = existing.cases().cloned().collect();
    let mut kinds = existing.into_kinds();
    let old_flaky = kinds.get(&Outcome::Flaky).cloned().unwrap_or_default();

    for (case_id, outcome) in pairs {
        kinds
            .entry(outcome.clone())
            .or_default()
            .insert(case_id.clone());
    }

    let mut flaky = kinds.get(&Outcome::Flaky).cloned().unwrap_or_default();
    for ((kind_a, cases_a), (kind_b, cases_b)) in kinds.iter().tuple_combinations() {
        if policy.counts_as_flaky(kind_a, kind_b) {
            flaky.extend(cases_a.intersection(cases_b).cloned());
        }
    }

    for (kind, cases) in kinds.iter_mut() {
        if *kind != Outcome::Flaky {
            cases.retain(|case_id| !flaky.contains(case_id));
        }
    }

    resolve_leftovers(&mut kinds, pairs);
    kinds.insert(Outcome::Flaky, flaky.clone());

    let new_cases = pairs
        .iter()
        .map(|(case_id, _)| case_id)
        .filter(|case_id| !known.contains(*case_id))
        .cloned()
        .collect();

    FoldedBaseline {
        baseline: ExpectationBaseline::from_disjoint(kinds),
        newly_flaky: flaky.difference(&old_flaky).cloned().collect(),
        new_cases,
    }
}

/// Keeps a case id that is still under two or more kinds only under the
/// kind it was last seen with.
fn resolve_leftovers(
    kinds: &mut BTreeMap<Outcome, BTreeSet<TestCaseId>>,
    pairs: &[(TestCaseId, Outcome)],
) {
    let mut membership: BTreeMap<&TestCaseId, usize> = BTreeMap::new();
    for cases in kinds.values() {
        for case_id in cases {
            *membership.entry(case_id).or_default() += 1;
        }
    }
    let ambiguous: BTreeSet<TestCaseId> = membership
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(case_id, _)| case_id.clone())
        .collect();
    if ambiguous.is_empty() {
        return;
    }

    let mut latest: BTreeMap<&TestCaseId, &Outcome> = BTreeMap::new();
    for (case_id, outcome) in pairs {
        if ambiguous.contains(case_id) {
            latest.insert(case_id, outcome);
        }
    }

    for (kind, cases) in kinds.iter_mut() {
        cases.retain(|case_id| match latest.get(case_id) {
            Some(latest_kind) => *latest_kind == kind,
            None => true,
        });
    }
}

/// What a call to [`MergeEngine::merge`] did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeSummary {
    /// The baseline after the merge.
    pub baseline: ExpectationBaseline,

    /// Case ids that became flaky with this run.
    pub newly_flaky: BTreeSet<TestCaseId>,

    /// Case ids that the previous baseline did not know about.
    pub new_cases: BTreeSet<TestCaseId>,

    /// Whether the baseline was written. False for an empty run.
    pub saved: bool,
}

/// Reconciles runs against the baselines of an [`ExpectationStore`].
#[derive(Debug)]
pub struct MergeEngine<'a, S: ?Sized> {
    store: &'a S,
    policy: FlakyPolicy,
}

impl<'a, S: ExpectationStore + ?Sized> MergeEngine<'a, S> {
    /// Creates an engine using the default flaky detection policy.
    pub fn new(store: &'a S) -> Self {
        Self::with_policy(store, FlakyPolicy::default())
    }

    /// Creates an engine using the given flaky detection policy.
    pub fn with_policy(store: &'a S, policy: FlakyPolicy) -> Self {
        Self { store, policy }
    }

    /// Returns the flaky detection policy.
    pub fn policy(&self) -> FlakyPolicy {
        self.policy
    }

    /// Merges a complete run into the baseline for `key` and persists the
    /// result.
    ///
    /// A run with no results leaves the stored baseline untouched. Whether a
    /// run is complete is up to the caller: partial runs must not be passed
    /// in.
    pub fn merge(
        &self,
        key: &ExpectationKey,
        run: RunAggregator,
    ) -> Result<MergeSummary, MergeError> {
        let existing = self.store.load(key)?;

        if run.is_empty() {
            info!("no results for {key}, baseline left unchanged");
            return Ok(MergeSummary {
                baseline: existing,
                newly_flaky: BTreeSet::new(),
                new_cases: BTreeSet::new(),
                saved: false,
            });
        }

        let conflicts = run.conflicts();
        if !conflicts.is_empty() {
            debug!(
                "{} cases of {key} had conflicting outcomes within the run",
                conflicts.len(),
            );
        }

        let pairs = run.into_pairs();
        let FoldedBaseline {
            baseline,
            newly_flaky,
            new_cases,
        } = fold_run(existing, &pairs, self.policy);

        for (kind, cases) in &baseline {
            debug!("{key}: {kind}: {} cases", cases.len());
        }
        if !newly_flaky.is_empty() {
            info!("{key}: {} newly flaky cases", newly_flaky.len());
        }

        self.store.save(key, &baseline)?;
        Ok(MergeSummary {
            baseline,
            newly_flaky,
            new_cases,
            saved: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{BaselineLoadError, BaselineResetError, BaselineSaveError};
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Mutex;
    use test_strategy::proptest;

    #[derive(Debug, Default)]
    struct MemoryStore {
        baselines: Mutex<BTreeMap<ExpectationKey, ExpectationBaseline>>,
        saves: Mutex<usize>,
    }

    impl ExpectationStore for MemoryStore {
        fn load(&self, key: &ExpectationKey) -> Result<ExpectationBaseline, BaselineLoadError> {
            Ok(self
                .baselines
                .lock()
                .unwrap()
                .get(key)
                .cloned()
                .unwrap_or_default())
        }

        fn save(
            &self,
            key: &ExpectationKey,
            baseline: &ExpectationBaseline,
        ) -> Result<(), BaselineSaveError> {
            *self.saves.lock().unwrap() += 1;
            self.baselines
                .lock()
                .unwrap()
                .insert(key.clone(), baseline.clone());
            Ok(())
        }

        fn reset(&self, key: &ExpectationKey) -> Result<bool, BaselineResetError> {
            Ok(self.baselines.lock().unwrap().remove(key).is_some())
        }

        fn load_subset(
            &self,
            key: &ExpectationKey,
            kind: &Outcome,
        ) -> Result<Option<Vec<TestCaseId>>, BaselineLoadError> {
            Ok(self
                .baselines
                .lock()
                .unwrap()
                .get(key)
                .and_then(|baseline| baseline.get(kind))
                .map(|cases| cases.iter().cloned().collect()))
        }
    }

    fn id(s: &str) -> TestCaseId {
        TestCaseId::new(s).unwrap()
    }

    fn key() -> ExpectationKey {
        ExpectationKey::new("gpu", "dEQP-GLES2.functional").unwrap()
    }

    fn run(pairs: &[(&str, Outcome)]) -> RunAggregator {
        pairs
            .iter()
            .map(|(case_id, outcome)| (id(case_id), outcome.clone()))
            .collect()
    }

    fn baseline(kinds: Vec<(Outcome, BTreeSet<TestCaseId>)>) -> ExpectationBaseline {
        ExpectationBaseline::from_kinds(kinds).unwrap()
    }

    #[test]
    fn two_runs_scenario() {
        let store = MemoryStore::default();
        let engine = MergeEngine::new(&store);

        let first = engine
            .merge(
                &key(),
                run(&[("A", Outcome::Pass), ("B", Outcome::Fail), ("C", Outcome::Pass)]),
            )
            .unwrap();
        assert_eq!(
            first.baseline,
            baseline(vec![
                (Outcome::Pass, btreeset! {id("A"), id("C")}),
                (Outcome::Fail, btreeset! {id("B")}),
            ])
        );
        assert!(first.newly_flaky.is_empty());
        assert_eq!(first.new_cases, btreeset! {id("A"), id("B"), id("C")});
        assert!(first.saved);

        let second = engine
            .merge(
                &key(),
                run(&[("A", Outcome::Pass), ("B", Outcome::Pass), ("C", Outcome::Fail)]),
            )
            .unwrap();
        let expected = baseline(vec![
            (Outcome::Pass, btreeset! {id("A")}),
            (Outcome::Flaky, btreeset! {id("B"), id("C")}),
        ]);
        assert_eq!(second.baseline, expected);
        assert_eq!(second.newly_flaky, btreeset! {id("B"), id("C")});
        assert!(second.new_cases.is_empty());
        assert_eq!(store.load(&key()).unwrap(), expected);
    }

    #[test]
    fn identical_run_is_idempotent() {
        let store = MemoryStore::default();
        let engine = MergeEngine::new(&store);
        let pairs = [("A", Outcome::Pass), ("B", Outcome::Crash), ("C", Outcome::Pass)];

        let first = engine.merge(&key(), run(&pairs)).unwrap();
        let second = engine.merge(&key(), run(&pairs)).unwrap();
        assert_eq!(first.baseline, second.baseline);
        assert_eq!(second.baseline.flaky(), None);
        assert!(second.newly_flaky.is_empty());
    }

    #[test]
    fn empty_run_leaves_baseline_unchanged() {
        let store = MemoryStore::default();
        let engine = MergeEngine::new(&store);
        engine
            .merge(&key(), run(&[("A", Outcome::Pass), ("B", Outcome::Fail)]))
            .unwrap();
        let before = store.load(&key()).unwrap();

        let summary = engine.merge(&key(), RunAggregator::new()).unwrap();
        assert!(!summary.saved);
        assert_eq!(summary.baseline, before);
        assert_eq!(store.load(&key()).unwrap(), before);
        assert_eq!(*store.saves.lock().unwrap(), 1);
    }

    #[test]
    fn same_run_conflict_is_flaky() {
        let folded = fold_run(
            ExpectationBaseline::new(),
            &[
                (id("A"), Outcome::Pass),
                (id("A"), Outcome::Fail),
                (id("B"), Outcome::Pass),
                (id("B"), Outcome::Pass),
            ],
            FlakyPolicy::AnyOutcome,
        );
        assert_eq!(
            folded.baseline,
            baseline(vec![
                (Outcome::Pass, btreeset! {id("B")}),
                (Outcome::Flaky, btreeset! {id("A")}),
            ])
        );
    }

    #[test]
    fn flaky_cases_stay_flaky() {
        let existing = baseline(vec![
            (Outcome::Pass, btreeset! {id("A")}),
            (Outcome::Flaky, btreeset! {id("B")}),
        ]);
        let folded = fold_run(
            existing,
            &[(id("A"), Outcome::Pass), (id("B"), Outcome::Pass)],
            FlakyPolicy::AnyOutcome,
        );
        assert_eq!(
            folded.baseline,
            baseline(vec![
                (Outcome::Pass, btreeset! {id("A")}),
                (Outcome::Flaky, btreeset! {id("B")}),
            ])
        );
        assert!(folded.newly_flaky.is_empty());
    }

    #[test]
    fn different_failures_are_flaky_by_default() {
        let existing = baseline(vec![(Outcome::Fail, btreeset! {id("A")})]);
        let folded = fold_run(
            existing,
            &[(id("A"), Outcome::InternalError)],
            FlakyPolicy::AnyOutcome,
        );
        assert_eq!(folded.baseline.kind_of(&id("A")), Some(&Outcome::Flaky));
    }

    #[test]
    fn healthy_vs_unhealthy_policy() {
        let existing = baseline(vec![
            (Outcome::Fail, btreeset! {id("A")}),
            (Outcome::Pass, btreeset! {id("B")}),
        ]);
        let folded = fold_run(
            existing,
            &[
                (id("A"), Outcome::InternalError),
                (id("A"), Outcome::Timeout),
                (id("B"), Outcome::Crash),
            ],
            FlakyPolicy::HealthyVsUnhealthy,
        );
        assert_eq!(
            folded.baseline,
            baseline(vec![
                (Outcome::Timeout, btreeset! {id("A")}),
                (Outcome::Flaky, btreeset! {id("B")}),
            ])
        );
        assert_eq!(folded.newly_flaky, btreeset! {id("B")});
    }

    #[test]
    fn policy_names() {
        for name in FlakyPolicy::VARIANTS {
            let policy: FlakyPolicy = name.parse().unwrap();
            assert_eq!(policy.as_str(), *name);
        }
        assert!("sometimes".parse::<FlakyPolicy>().is_err());
    }

    fn arb_outcome() -> impl Strategy<Value = Outcome> {
        prop_oneof![
            Just(Outcome::Pass),
            Just(Outcome::NotSupported),
            Just(Outcome::Fail),
            Just(Outcome::Crash),
            Just(Outcome::Timeout),
        ]
    }

    fn arb_run() -> impl Strategy<Value = Vec<(TestCaseId, Outcome)>> {
        prop::collection::vec(
            ("[a-e]".prop_map(|s| id(&s)), arb_outcome()),
            0..20,
        )
    }

    #[proptest]
    fn fold_keeps_cases_disjoint(
        #[strategy(prop::collection::vec(arb_run(), 1..4))] runs: Vec<Vec<(TestCaseId, Outcome)>>,
        #[strategy(prop_oneof![Just(FlakyPolicy::AnyOutcome), Just(FlakyPolicy::HealthyVsUnhealthy)])]
        policy: FlakyPolicy,
    ) {
        let mut current = ExpectationBaseline::new();
        let mut seen = BTreeSet::new();
        for pairs in &runs {
            let old_flaky = current.flaky().cloned().unwrap_or_default();
            current = fold_run(current, pairs, policy).baseline;

            // Rebuilding from the kinds fails if any case is under two kinds.
            let rebuilt = ExpectationBaseline::from_kinds(
                current.iter().map(|(kind, cases)| (kind.clone(), cases.clone())),
            );
            prop_assert!(rebuilt.is_ok());

            let new_flaky = current.flaky().cloned().unwrap_or_default();
            prop_assert!(old_flaky.is_subset(&new_flaky));

            seen.extend(pairs.iter().map(|(case_id, _)| case_id.clone()));
            let recorded: BTreeSet<_> = current.cases().cloned().collect();
            prop_assert_eq!(&recorded, &seen);
        }
    }

    #[proptest]
    fn refolding_a_run_adds_no_flaky_cases(#[strategy(arb_run())] pairs: Vec<(TestCaseId, Outcome)>) {
        let once = fold_run(ExpectationBaseline::new(), &pairs, FlakyPolicy::AnyOutcome);
        let twice = fold_run(once.baseline.clone(), &pairs, FlakyPolicy::AnyOutcome);
        prop_assert!(twice.newly_flaky.is_empty());
        prop_assert_eq!(twice.baseline, once.baseline);
    }
}
