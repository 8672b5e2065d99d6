// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::BaselineLoadError,
    outcome::{Outcome, TestCaseId},
};
use camino::Utf8Path;
use serde::Serialize;
use std::collections::{btree_map, BTreeMap, BTreeSet};

/// The persisted classification of every known test case for one
/// [`ExpectationKey`](super::ExpectationKey).
///
/// Each test case is recorded under exactly one outcome kind, and empty
/// kinds are never stored. Cases observed with two or more distinct outcomes
/// live under [`Outcome::Flaky`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpectationBaseline {
    kinds: BTreeMap<Outcome, BTreeSet<TestCaseId>>,
}

/// A test case found under two kinds while building a baseline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateCase {
    /// The test case.
    pub case_id: TestCaseId,

    /// The first kind it was found under.
    pub first: Outcome,

    /// The second kind it was found under.
    pub second: Outcome,
}

impl ExpectationBaseline {
    /// Creates an empty baseline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a baseline from per-kind sets, checking that no case appears
    /// under two kinds. Empty sets are dropped.
    pub fn from_kinds(
        kinds: impl IntoIterator<Item = (Outcome, BTreeSet<TestCaseId>)>,
    ) -> Result<Self, DuplicateCase> {
        let mut seen: BTreeMap<TestCaseId, Outcome> = BTreeMap::new();
        let mut out: BTreeMap<Outcome, BTreeSet<TestCaseId>> = BTreeMap::new();
        for (kind, cases) in kinds {
            for case_id in &cases {
                if let Some(first) = seen.get(case_id) {
                    if first != &kind {
                        return Err(DuplicateCase {
                            case_id: case_id.clone(),
                            first: first.clone(),
                            second: kind,
                        });
                    }
                } else {
                    seen.insert(case_id.clone(), kind.clone());
                }
            }
            if !cases.is_empty() {
                out.entry(kind).or_default().extend(cases);
            }
        }
        Ok(Self { kinds: out })
    }

    /// Builds a baseline from sets that are already known to be disjoint.
    pub(crate) fn from_disjoint(mut kinds: BTreeMap<Outcome, BTreeSet<TestCaseId>>) -> Self {
        kinds.retain(|_, cases| !cases.is_empty());
        Self { kinds }
    }

    /// Returns true if the baseline records no test cases.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Returns the number of recorded test cases.
    pub fn case_count(&self) -> usize {
        self.kinds.values().map(BTreeSet::len).sum()
    }

    /// Returns the cases recorded under `kind`.
    pub fn get(&self, kind: &Outcome) -> Option<&BTreeSet<TestCaseId>> {
        self.kinds.get(kind)
    }

    /// Returns the cases recorded as flaky.
    pub fn flaky(&self) -> Option<&BTreeSet<TestCaseId>> {
        self.get(&Outcome::Flaky)
    }

    /// Returns the kind a case is recorded under.
    pub fn kind_of(&self, case_id: &TestCaseId) -> Option<&Outcome> {
        self.kinds
            .iter()
            .find(|(_, cases)| cases.contains(case_id))
            .map(|(kind, _)| kind)
    }

    /// Iterates over recorded kinds and their cases, sorted by kind name.
    pub fn iter(&self) -> btree_map::Iter<'_, Outcome, BTreeSet<TestCaseId>> {
        self.kinds.iter()
    }

    /// Iterates over every recorded case.
    pub fn cases(&self) -> impl Iterator<Item = &TestCaseId> + '_ {
        self.kinds.values().flatten()
    }

    pub(crate) fn into_kinds(self) -> BTreeMap<Outcome, BTreeSet<TestCaseId>> {
        self.kinds
    }

    /// Serializes the baseline as JSON with sorted keys and members and
    /// four-space indentation.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.kinds.serialize(&mut serializer)?;
        buf.push(b'\n');
        // serde_json only produces UTF-8.
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Parses a baseline previously produced by [`Self::to_json`].
    ///
    /// `path` is used for error reporting.
    pub fn from_json(json: &str, path: &Utf8Path) -> Result<Self, BaselineLoadError> {
        let raw: BTreeMap<String, Vec<String>> =
            serde_json::from_str(json).map_err(|error| BaselineLoadError::Deserialize {
                path: path.to_owned(),
                error,
            })?;

        let mut kinds: BTreeMap<Outcome, BTreeSet<TestCaseId>> = BTreeMap::new();
        for (raw_kind, raw_cases) in raw {
            if raw_kind.trim().is_empty() {
                return Err(BaselineLoadError::EmptyKind {
                    path: path.to_owned(),
                });
            }
            let kind = Outcome::parse(&raw_kind);
            let cases = raw_cases
                .iter()
                .map(TestCaseId::new)
                .collect::<Result<BTreeSet<_>, _>>()
                .map_err(|error| BaselineLoadError::InvalidCaseId {
                    path: path.to_owned(),
                    kind: kind.clone(),
                    error,
                })?;
            // Two spellings of the same kind (e.g. the legacy fallback name)
            // are folded together.
            kinds.entry(kind).or_default().extend(cases);
        }

        Self::from_kinds(kinds).map_err(|dup| BaselineLoadError::DuplicateCase {
            path: path.to_owned(),
            case_id: dup.case_id.to_string(),
            first: dup.first,
            second: dup.second,
        })
    }
}

impl<'a> IntoIterator for &'a ExpectationBaseline {
    type Item = (&'a Outcome, &'a BTreeSet<TestCaseId>);
    type IntoIter = btree_map::Iter<'a, Outcome, BTreeSet<TestCaseId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
