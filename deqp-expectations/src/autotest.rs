// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reading the INFO log written by the autotest harness around dEQP.
//!
//! When dEQP is run one case per process, the harness does not keep the raw
//! dEQP log. Instead it logs which baseline the run belongs to and one
//! `TestCase:`/`Result:` line pair per executed case:
//!
//! ```text
//! 04/23 07:30:01.002 INFO |graphics_d:0318| ChromeOS BOARD = samus
//! 04/23 07:30:01.002 INFO |graphics_d:0319| ChromeOS CPU family = intel
//! 04/23 07:30:01.002 INFO |graphics_d:0320| ChromeOS GPU family = broadwell
//! 04/23 07:30:01.003 INFO |graphics_d:0321| dEQP test filter = dEQP-GLES3.info
//! 04/23 07:30:21.624 INFO |graphics_d:0240| [1/7] TestCase: dEQP-GLES3.info.vendor
//! 04/23 07:30:21.840 INFO |graphics_d:0261| Result: Pass
//! 04/23 07:30:29.100 INFO |graphics_d:0363| Completed all tests. Saw 7 tests and 0 failures.
//! ```

use crate::{
    errors::AutotestLogError,
    expectations::ExpectationKey,
    log_parser::read_log,
    outcome::{Outcome, TestCaseId},
};
use camino::Utf8Path;
use itertools::Itertools;
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static BOARD_MARKER: &str = "ChromeOS BOARD = ";
static CPU_FAMILY_MARKER: &str = "ChromeOS CPU family = ";
static GPU_FAMILY_MARKER: &str = "ChromeOS GPU family = ";
static FILTER_MARKER: &str = "dEQP test filter = ";
static COMPLETED_MARKER: &str = "Completed all tests.";
static TEST_CASE_MARKER: &str = "TestCase: ";
static RESULT_MARKER: &str = "Result: ";

/// Lines that survive [`relevant_lines`].
static RELEVANT_MARKERS: &[&str] = &[
    BOARD_MARKER,
    CPU_FAMILY_MARKER,
    GPU_FAMILY_MARKER,
    FILTER_MARKER,
    TEST_CASE_MARKER,
    RESULT_MARKER,
];

static TEST_RESULT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)TestCase: (.+?)\r?$\n.*?Result: (.+?)\r?$").expect("regex is valid")
});

/// The contents of one autotest INFO log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutotestLog {
    /// The board the run happened on.
    pub board: Option<String>,

    /// The CPU family of the board.
    pub cpu_family: Option<String>,

    /// The GPU family of the board.
    pub gpu_family: Option<String>,

    /// The test filter the run was started with.
    pub filter: Option<String>,

    /// The executed cases in order.
    pub results: Vec<(TestCaseId, Outcome)>,

    /// Whether the harness reached the end of the run.
    pub completed: bool,
}

impl AutotestLog {
    /// Returns true if `text` looks like an autotest INFO log rather than a
    /// raw dEQP log.
    pub fn is_autotest_log(text: &str) -> bool {
        text.contains(GPU_FAMILY_MARKER) || text.contains(FILTER_MARKER)
    }

    /// Parses the text of an INFO log. Unknown lines are ignored.
    ///
    /// The harness logs the command line and the tee'd dEQP output between
    /// a `TestCase:` line and its `Result:` line, so results are matched
    /// after everything but metadata and case lines has been dropped.
    pub fn parse(text: &str) -> Self {
        let relevant = relevant_lines(text);
        let results = TEST_RESULT_REGEX
            .captures_iter(&relevant)
            .filter_map(|captures| {
                let case_id = TestCaseId::new(&captures[1]).ok()?;
                Some((case_id, Outcome::parse(&captures[2])))
            })
            .collect();

        Self {
            board: metadata(text, BOARD_MARKER),
            cpu_family: metadata(text, CPU_FAMILY_MARKER),
            gpu_family: metadata(text, GPU_FAMILY_MARKER),
            filter: metadata(text, FILTER_MARKER),
            results,
            completed: text.contains(COMPLETED_MARKER),
        }
    }

    /// Reads and parses the INFO log at `path`. A missing file reads as an
    /// empty log.
    pub fn read(path: &Utf8Path) -> Result<Self, AutotestLogError> {
        let text = read_log(path)?;
        let log = Self::parse(&text);
        debug!(
            "read {} results from autotest log `{path}` (board: {}, complete: {})",
            log.results.len(),
            log.board.as_deref().unwrap_or("unknown"),
            log.completed,
        );
        Ok(log)
    }

    /// Returns the baseline this log belongs to.
    ///
    /// `path` is used for error reporting.
    pub fn key(&self, path: &Utf8Path) -> Result<ExpectationKey, AutotestLogError> {
        let gpu_family =
            self.gpu_family
                .as_deref()
                .ok_or_else(|| AutotestLogError::MissingMetadata {
                    path: path.to_owned(),
                    marker: GPU_FAMILY_MARKER.trim_end(),
                })?;
        let filter = self
            .filter
            .as_deref()
            .ok_or_else(|| AutotestLogError::MissingMetadata {
                path: path.to_owned(),
                marker: FILTER_MARKER.trim_end(),
            })?;
        ExpectationKey::new(gpu_family, filter).map_err(|error| AutotestLogError::InvalidKey {
            path: path.to_owned(),
            error,
        })
    }
}

/// Keeps only metadata, `TestCase:` and `Result:` lines.
fn relevant_lines(text: &str) -> String {
    text.lines()
        .filter(|line| RELEVANT_MARKERS.iter().any(|marker| line.contains(marker)))
        .join("\n")
}

/// Returns the trimmed value after the first occurrence of `marker`.
fn metadata(text: &str, marker: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (_, value) = line.split_once(marker)?;
        let value = value.trim();
        (!value.is_empty()).then(|| value.to_owned())
    })
}
