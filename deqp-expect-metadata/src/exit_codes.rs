// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `deqp-expect` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum DeqpExpectExitCode {}

impl DeqpExpectExitCode {
    /// No errors occurred and deqp-expect exited normally.
    pub const OK: i32 = 0;

    /// A log was parsed but contained no test results.
    pub const NO_TESTS_RUN: i32 = 4;

    /// One or more parsed outcomes were neither `Pass` nor `NotSupported`.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// A log could not be read, or did not identify its baseline.
    pub const LOG_READ_FAILED: i32 = 101;

    /// A log was incomplete and incomplete logs were configured to be rejected.
    pub const INCOMPLETE_RUN: i32 = 106;

    /// A persisted baseline is corrupt or could not be read.
    ///
    /// This indicates damaged history: the baseline was left untouched.
    pub const BASELINE_CORRUPT: i32 = 107;

    /// A baseline could not be written or removed.
    pub const BASELINE_WRITE_FAILED: i32 = 108;

    /// No cases could be selected for the next run.
    pub const NO_CASES_PLANNED: i32 = 109;

    /// Writing data to stdout or stderr produced an error.
    pub const WRITE_OUTPUT_ERROR: i32 = 110;

    /// A user issue happened while setting up a deqp-expect invocation.
    pub const SETUP_ERROR: i32 = 96;
}
