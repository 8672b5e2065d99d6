// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Choosing the cases of the next run from a baseline.

use crate::{
    errors::PlanError,
    expectations::{ExpectationKey, ExpectationStore},
    outcome::{Outcome, TestCaseId},
};
use camino::Utf8Path;
use std::collections::BTreeSet;
use tracing::{debug, info};

static CASELIST_PREFIX: &str = "TEST: ";

/// Returns the sorted cases recorded under `subset` for `key`.
///
/// When nothing is recorded under `Pass` yet, the cases are bootstrapped from
/// `caselist`, the output of dEQP's `--deqp-runmode=txt-caselist`: every
/// `TEST:` entry under the key's filter, minus every case the baseline
/// records under another kind. This keeps known crashes and hangs out of the
/// first runs on a new GPU family.
pub fn plan_cases<S: ExpectationStore + ?Sized>(
    store: &S,
    key: &ExpectationKey,
    subset: &Outcome,
    caselist: Option<&str>,
) -> Result<Vec<TestCaseId>, PlanError> {
    let cases = match store.load_subset(key, subset)? {
        Some(cases) => {
            debug!("{key}: {} cases recorded under `{subset}`", cases.len());
            cases.into_iter().collect::<BTreeSet<_>>()
        }
        None if *subset != Outcome::Pass => {
            return Err(PlanError::MissingSubset {
                key: key.to_string(),
                subset: subset.clone(),
            });
        }
        None => {
            let caselist = caselist.ok_or_else(|| PlanError::NoCaselist {
                key: key.to_string(),
            })?;
            bootstrap(store, key, caselist)?
        }
    };

    if cases.is_empty() {
        return Err(PlanError::Empty {
            key: key.to_string(),
            subset: subset.clone(),
        });
    }
    Ok(cases.into_iter().collect())
}

fn bootstrap<S: ExpectationStore + ?Sized>(
    store: &S,
    key: &ExpectationKey,
    caselist: &str,
) -> Result<BTreeSet<TestCaseId>, PlanError> {
    let baseline = store.load(key)?;
    let not_passing: BTreeSet<&TestCaseId> = baseline
        .iter()
        .filter(|(kind, _)| **kind != Outcome::Pass)
        .flat_map(|(_, cases)| cases)
        .collect();

    info!("{key}: bootstrapping test cases from caselist");
    let cases: BTreeSet<TestCaseId> = caselist_entries(caselist)
        .filter(|case_id| case_id.matches_prefix(key.filter()))
        .filter(|case_id| !not_passing.contains(case_id))
        .collect();
    debug!(
        "{key}: {} cases bootstrapped, {} excluded by the baseline",
        cases.len(),
        not_passing.len(),
    );
    Ok(cases)
}

/// Iterates over the `TEST:` entries of a dEQP caselist. Group entries
/// (`GROUP:`) and anything else are skipped.
pub fn caselist_entries(caselist: &str) -> impl Iterator<Item = TestCaseId> + '_ {
    caselist.lines().filter_map(|line| {
        let rest = line.trim_start().strip_prefix(CASELIST_PREFIX)?;
        TestCaseId::new(rest).ok()
    })
}

/// Reads a caselist file.
pub fn read_caselist(path: &Utf8Path) -> Result<String, PlanError> {
    std::fs::read_to_string(path).map_err(|error| PlanError::CaselistRead {
        path: path.to_owned(),
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expectations::{ExpectationBaseline, FsExpectationStore};
    use camino_tempfile::tempdir;
    use indoc::indoc;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    static CASELIST: &str = indoc! {"
        GROUP: dEQP-GLES2.info
        TEST: dEQP-GLES2.info.vendor
        TEST: dEQP-GLES2.info.renderer
        TEST: dEQP-GLES2.info.version
        GROUP: dEQP-GLES2.infox
        TEST: dEQP-GLES2.infox.extra
        GROUP: dEQP-GLES2.capability
        TEST: dEQP-GLES2.capability.limits.vertex_attribs
    "};

    fn id(s: &str) -> TestCaseId {
        TestCaseId::new(s).unwrap()
    }

    fn key() -> ExpectationKey {
        ExpectationKey::new("hsw", "dEQP-GLES2.info").unwrap()
    }

    #[test]
    fn recorded_subset() {
        let dir = tempdir().unwrap();
        let store = FsExpectationStore::new(dir.path());
        store
            .save(
                &key(),
                &ExpectationBaseline::from_kinds([
                    (Outcome::Pass, btreeset! {id("dEQP-GLES2.info.vendor")}),
                    (Outcome::Timeout, btreeset! {id("dEQP-GLES2.info.version")}),
                ])
                .unwrap(),
            )
            .unwrap();

        assert_eq!(
            plan_cases(&store, &key(), &Outcome::Timeout, None).unwrap(),
            vec![id("dEQP-GLES2.info.version")]
        );
        // A recorded Pass subset wins over the caselist.
        assert_eq!(
            plan_cases(&store, &key(), &Outcome::Pass, Some(CASELIST)).unwrap(),
            vec![id("dEQP-GLES2.info.vendor")]
        );
        assert!(matches!(
            plan_cases(&store, &key(), &Outcome::Crash, None),
            Err(PlanError::MissingSubset { .. })
        ));
    }

    #[test]
    fn bootstrap_from_caselist() {
        let dir = tempdir().unwrap();
        let store = FsExpectationStore::new(dir.path());
        store
            .save(
                &key(),
                &ExpectationBaseline::from_kinds([(
                    Outcome::Crash,
                    btreeset! {id("dEQP-GLES2.info.renderer")},
                )])
                .unwrap(),
            )
            .unwrap();

        assert_eq!(
            plan_cases(&store, &key(), &Outcome::Pass, Some(CASELIST)).unwrap(),
            vec![id("dEQP-GLES2.info.vendor"), id("dEQP-GLES2.info.version")]
        );
        assert!(matches!(
            plan_cases(&store, &key(), &Outcome::Pass, None),
            Err(PlanError::NoCaselist { .. })
        ));
    }

    #[test]
    fn empty_plan_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FsExpectationStore::new(dir.path());
        let key = ExpectationKey::new("hsw", "dEQP-GLES3").unwrap();
        assert!(matches!(
            plan_cases(&store, &key, &Outcome::Pass, Some(CASELIST)),
            Err(PlanError::Empty { .. })
        ));
    }

    #[test]
    fn missing_caselist_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_caselist(&dir.path().join("dEQP-GLES2-cases.txt")),
            Err(PlanError::CaselistRead { .. })
        ));
    }
}
