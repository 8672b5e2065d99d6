// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, Styles};
use camino::Utf8PathBuf;
use deqp_expect_metadata::DeqpExpectExitCode;
use deqp_expectations::errors::*;
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// The #[error()] strings are placeholders. Errors are meant to be printed with
// display_to_stderr, which colorizes them.

/// An expected failure of a deqp-expect command.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("current directory is invalid")]
    CurrentDirInvalid { error: std::io::Error },
    #[error("current directory is not valid UTF-8")]
    CurrentDirNotUtf8 { path: std::path::PathBuf },
    #[error("config error")]
    Config {
        #[from]
        err: ConfigError,
    },
    #[error("invalid baseline key")]
    InvalidKey {
        #[from]
        err: ExpectationKeyError,
    },
    #[error("raw dEQP log without a baseline key")]
    MissingKeyArgs { log: Utf8PathBuf },
    #[error("caselist read error")]
    CaselistRead {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
    #[error("log read error")]
    LogRead {
        #[from]
        err: LogReadError,
    },
    #[error("autotest log error")]
    AutotestLog {
        #[from]
        err: AutotestLogError,
    },
    #[error("incomplete run")]
    IncompleteRun { log: Utf8PathBuf },
    #[error("baseline load error")]
    BaselineLoad {
        #[from]
        err: BaselineLoadError,
    },
    #[error("baseline reset error")]
    BaselineReset {
        #[from]
        err: BaselineResetError,
    },
    #[error("merge error")]
    Merge {
        key: String,
        #[source]
        err: MergeError,
    },
    #[error("plan error")]
    Plan {
        #[from]
        err: PlanError,
    },
    #[error("some logs could not be merged")]
    SomeLogsFailed {
        failed: usize,
        total: usize,
        exit_code: i32,
    },
    #[error("failed to serialize output")]
    SerializeOutput {
        #[from]
        err: serde_json::Error,
    },
    #[error("failed to write output")]
    WriteOutput {
        #[from]
        err: std::io::Error,
    },
    #[error("no test results")]
    NoTestsRun { log: Utf8PathBuf },
    #[error("test run failed")]
    TestRunFailed { failures: usize, total: usize },
}

impl ExpectedError {
    pub(crate) fn merge(key: impl ToString, err: MergeError) -> Self {
        Self::Merge {
            key: key.to_string(),
            err,
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirInvalid { .. }
            | Self::CurrentDirNotUtf8 { .. }
            | Self::Config { .. }
            | Self::InvalidKey { .. }
            | Self::MissingKeyArgs { .. }
            | Self::CaselistRead { .. } => DeqpExpectExitCode::SETUP_ERROR,
            Self::LogRead { .. } | Self::AutotestLog { .. } => DeqpExpectExitCode::LOG_READ_FAILED,
            Self::IncompleteRun { .. } => DeqpExpectExitCode::INCOMPLETE_RUN,
            Self::BaselineLoad { .. } => DeqpExpectExitCode::BASELINE_CORRUPT,
            Self::BaselineReset { .. } => DeqpExpectExitCode::BASELINE_WRITE_FAILED,
            Self::Merge { err, .. } => match err {
                MergeError::Load(_) => DeqpExpectExitCode::BASELINE_CORRUPT,
                MergeError::Save(_) => DeqpExpectExitCode::BASELINE_WRITE_FAILED,
            },
            Self::Plan { err } => match err {
                PlanError::Load(_) => DeqpExpectExitCode::BASELINE_CORRUPT,
                PlanError::CaselistRead { .. } => DeqpExpectExitCode::SETUP_ERROR,
                PlanError::MissingSubset { .. }
                | PlanError::NoCaselist { .. }
                | PlanError::Empty { .. } => DeqpExpectExitCode::NO_CASES_PLANNED,
            },
            Self::SomeLogsFailed { exit_code, .. } => *exit_code,
            Self::SerializeOutput { .. } | Self::WriteOutput { .. } => {
                DeqpExpectExitCode::WRITE_OUTPUT_ERROR
            }
            Self::NoTestsRun { .. } => DeqpExpectExitCode::NO_TESTS_RUN,
            Self::TestRunFailed { .. } => DeqpExpectExitCode::TEST_RUN_FAILED,
        }
    }

    /// Displays this error to stderr, followed by its chain of causes.
    pub fn display_to_stderr(&self, styles: &Styles) {
        let mut next_error = match &self {
            Self::CurrentDirInvalid { error } => {
                error!("could not read the current directory");
                Some(error as &dyn Error)
            }
            Self::CurrentDirNotUtf8 { path } => {
                error!(
                    "current directory `{}` is not valid UTF-8",
                    path.display().style(styles.bold)
                );
                None
            }
            Self::Config { err } => {
                error!("failed to load configuration");
                Some(err as &dyn Error)
            }
            Self::InvalidKey { err } => {
                error!("invalid baseline key");
                Some(err as &dyn Error)
            }
            Self::MissingKeyArgs { log } => {
                error!(
                    "`{}` is a raw dEQP log: pass {} and {} to name its baseline",
                    log.style(styles.bold),
                    "--gpu".style(styles.bold),
                    "--filter".style(styles.bold),
                );
                None
            }
            Self::CaselistRead { path, err } => {
                error!("failed to read caselist `{}`", path.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::LogRead { err } => {
                error!("failed to read log `{}`", err.path().style(styles.bold));
                err.source()
            }
            Self::AutotestLog { err } => {
                error!("failed to process autotest log");
                Some(err as &dyn Error)
            }
            Self::IncompleteRun { log } => {
                error!(
                    "`{}` does not record a completed run, refusing to merge it \
                     (require-complete is set)",
                    log.style(styles.bold),
                );
                None
            }
            Self::BaselineLoad { err } => {
                error!("expectation history could not be loaded");
                Some(err as &dyn Error)
            }
            Self::BaselineReset { err } => {
                error!("failed to reset baseline");
                Some(err as &dyn Error)
            }
            Self::Merge { key, err } => {
                error!("failed to merge results into {}", key.style(styles.bold));
                Some(err as &dyn Error)
            }
            Self::Plan { err } => {
                error!("failed to plan the next run");
                Some(err as &dyn Error)
            }
            Self::SomeLogsFailed { failed, total, .. } => {
                error!("{failed} of {total} logs could not be merged");
                None
            }
            Self::SerializeOutput { err } => {
                error!("failed to serialize output");
                Some(err as &dyn Error)
            }
            Self::WriteOutput { err } => {
                error!("failed to write output");
                Some(err as &dyn Error)
            }
            Self::NoTestsRun { log } => {
                error!("no test results found in `{}`", log.style(styles.bold));
                None
            }
            Self::TestRunFailed { failures, total } => {
                error!(
                    "{} of {total} test results did not pass",
                    failures.style(styles.unhealthy)
                );
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
