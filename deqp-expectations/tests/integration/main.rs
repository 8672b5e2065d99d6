// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: logs on disk are parsed, merged into a filesystem store
//! and read back for planning.

use camino::{Utf8Path, Utf8PathBuf};
use camino_tempfile::tempdir;
use deqp_expectations::{
    aggregator::RunAggregator,
    autotest::AutotestLog,
    expectations::{ExpectationBaseline, ExpectationKey, ExpectationStore, FsExpectationStore},
    log_parser::{LogParser, read_log},
    merge::MergeEngine,
    outcome::{Outcome, TestCaseId},
    plan::{plan_cases, read_caselist},
};
use maplit::{btreemap, btreeset};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;

fn fixture(name: &str) -> Utf8PathBuf {
    Utf8Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../fixtures/logs")
        .join(name)
}

fn id(s: &str) -> TestCaseId {
    TestCaseId::new(s).unwrap()
}

fn ids(ids: &[&str]) -> BTreeSet<TestCaseId> {
    ids.iter().copied().map(id).collect()
}

fn raw_run(name: &str) -> RunAggregator {
    let text = read_log(&fixture(name)).unwrap();
    LogParser::new(&text).collect()
}

#[test]
fn raw_logs_become_a_baseline() {
    let dir = tempdir().unwrap();
    let store = FsExpectationStore::new(dir.path());
    let engine = MergeEngine::new(&store);
    let key = ExpectationKey::new("broadwell", "dEQP-GLES2").unwrap();

    // The last block of the first log was cut off and is not counted.
    let run1 = raw_run("gles2-run1.qpa");
    assert_eq!(run1.total(), 4);
    assert_eq!(run1.failure_count(), 2);

    let first = engine.merge(&key, run1).unwrap();
    assert!(first.saved);
    assert!(first.newly_flaky.is_empty());
    assert_eq!(first.new_cases.len(), 4);

    let second = engine.merge(&key, raw_run("gles2-run2.qpa")).unwrap();
    assert_eq!(
        second.newly_flaky,
        ids(&["dEQP-GLES2.functional.color_clear.single_rgb"])
    );
    assert_eq!(
        second.new_cases,
        ids(&["dEQP-GLES2.functional.color_clear.masked_rgb"])
    );

    let expected = ExpectationBaseline::from_kinds(btreemap! {
        Outcome::Pass => ids(&["dEQP-GLES2.info.vendor", "dEQP-GLES2.info.renderer"]),
        Outcome::Crash => ids(&["dEQP-GLES2.functional.color_clear.single_rgba"]),
        Outcome::QualityWarning => ids(&["dEQP-GLES2.functional.color_clear.masked_rgb"]),
        Outcome::Flaky => ids(&["dEQP-GLES2.functional.color_clear.single_rgb"]),
    })
    .unwrap();
    assert_eq!(second.baseline, expected);
    assert_eq!(store.load(&key).unwrap(), expected);

    // The Fail subset emptied out and its file went with it.
    let family_dir = dir.path().join("broadwell");
    assert!(!family_dir.join("dEQP-GLES2.Fail").exists());
    assert_eq!(
        std::fs::read_to_string(family_dir.join("dEQP-GLES2.Flaky")).unwrap(),
        "dEQP-GLES2.functional.color_clear.single_rgb\n"
    );
    assert!(family_dir.join("dEQP-GLES2.json").is_file());

    let planned = plan_cases(&store, &key, &Outcome::Pass, None).unwrap();
    assert_eq!(
        planned,
        vec![id("dEQP-GLES2.info.renderer"), id("dEQP-GLES2.info.vendor")]
    );
}

#[test]
fn hasty_log_uses_caselist_positions() {
    let text = read_log(&fixture("hasty.qpa")).unwrap();
    let caselist = std::fs::read_to_string(fixture("hasty-caselist.txt")).unwrap();
    let cases = caselist.lines().map(id);

    let run: RunAggregator = LogParser::with_caselist(&text, cases).collect();
    assert_eq!(
        run.pairs(),
        [
            (id("dEQP-GLES3.functional.fbo.blit.rect.basic"), Outcome::Pass),
            (
                id("dEQP-GLES3.functional.fbo.blit.rect.nearest"),
                Outcome::NotSupported
            ),
            (
                id("dEQP-GLES3.functional.fbo.blit.rect.linear"),
                Outcome::Timeout
            ),
        ]
    );
    assert_eq!(run.failure_count(), 1);
}

#[test]
fn autotest_log_merge_and_reset() {
    let dir = tempdir().unwrap();
    let store = FsExpectationStore::new(dir.path());

    let path = fixture("autotest-INFO");
    let log = AutotestLog::read(&path).unwrap();
    assert!(log.completed);
    // dEQP output logged between a case and its result does not hide it.
    assert_eq!(log.results.len(), 4);
    let key = log.key(&path).unwrap();
    assert_eq!(key.to_string(), "broadwell/dEQP-GLES2.info");

    let run: RunAggregator = log.results.into_iter().collect();
    let summary = MergeEngine::new(&store).merge(&key, run).unwrap();
    assert_eq!(
        summary.baseline.get(&Outcome::Fail),
        Some(&ids(&["dEQP-GLES2.info.version"]))
    );
    assert_eq!(
        store.load_subset(&key, &Outcome::Pass).unwrap(),
        Some(vec![
            id("dEQP-GLES2.info.extensions"),
            id("dEQP-GLES2.info.renderer"),
            id("dEQP-GLES2.info.vendor"),
        ])
    );

    assert!(store.reset(&key).unwrap());
    assert!(!store.reset(&key).unwrap());
    assert!(store.load(&key).unwrap().is_empty());
    assert_eq!(store.load_subset(&key, &Outcome::Pass).unwrap(), None);
}

#[test]
fn bootstrap_skips_known_failures() {
    let dir = tempdir().unwrap();
    let store = FsExpectationStore::new(dir.path());
    let key = ExpectationKey::new("kabylake", "dEQP-GLES2.functional").unwrap();

    let crashes = ExpectationBaseline::from_kinds(btreemap! {
        Outcome::Crash => btreeset! {id("dEQP-GLES2.functional.color_clear.single_rgba")},
    })
    .unwrap();
    store.save(&key, &crashes).unwrap();

    let caselist = read_caselist(&fixture("gles2-caselist.txt")).unwrap();
    let planned = plan_cases(&store, &key, &Outcome::Pass, Some(&caselist)).unwrap();
    assert_eq!(
        planned,
        vec![
            id("dEQP-GLES2.functional.color_clear.masked_rgb"),
            id("dEQP-GLES2.functional.color_clear.single_rgb"),
        ]
    );
}
