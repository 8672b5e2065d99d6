// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by deqp-expectations.
//!
//! The log parser and the run aggregator never fail: per-case problems are
//! encoded as [`Outcome::ParseFailure`](crate::outcome::Outcome::ParseFailure).
//! The errors here cover lost or corrupted history, invalid identifiers and
//! I/O failures around the expectation store.

use crate::outcome::Outcome;
use camino::Utf8PathBuf;
use thiserror::Error;

/// An error that occurs while constructing a
/// [`TestCaseId`](crate::outcome::TestCaseId).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("test case id is empty")]
#[non_exhaustive]
pub struct TestCaseIdError {}

impl TestCaseIdError {
    pub(crate) fn new() -> Self {
        Self {}
    }
}

/// An error that occurs while constructing an
/// [`ExpectationKey`](crate::expectations::ExpectationKey).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExpectationKeyError {
    /// The component was empty.
    #[error("{component} is empty")]
    Empty {
        /// The component that was empty.
        component: KeyComponent,
    },

    /// The component contained a path separator.
    #[error("{component} `{value}` contains a path separator")]
    PathSeparator {
        /// The component that was invalid.
        component: KeyComponent,

        /// The value provided.
        value: String,
    },

    /// The component was a relative path component such as `..`.
    #[error("{component} `{value}` is a reserved path component")]
    Reserved {
        /// The component that was invalid.
        component: KeyComponent,

        /// The value provided.
        value: String,
    },
}

/// A part of an [`ExpectationKey`](crate::expectations::ExpectationKey).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyComponent {
    /// The GPU family.
    GpuFamily,

    /// The test filter prefix.
    Filter,
}

impl std::fmt::Display for KeyComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GpuFamily => write!(f, "GPU family"),
            Self::Filter => write!(f, "test filter"),
        }
    }
}

/// An error that occurs while reading a log file.
///
/// A missing log is not an error: it parses as zero results.
#[derive(Debug, Error)]
#[error("failed to read log file `{path}`")]
pub struct LogReadError {
    path: Utf8PathBuf,
    #[source]
    error: std::io::Error,
}

impl LogReadError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: std::io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }

    /// Returns the path that could not be read.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }
}

/// An error that occurs while reading an autotest INFO log.
#[derive(Debug, Error)]
pub enum AutotestLogError {
    /// The log could not be read.
    #[error(transparent)]
    Read(#[from] LogReadError),

    /// A metadata line required to identify the baseline was missing.
    #[error("log `{path}` has no `{marker}` line")]
    MissingMetadata {
        /// The log file.
        path: Utf8PathBuf,

        /// The marker that was searched for.
        marker: &'static str,
    },

    /// The metadata did not form a valid expectation key.
    #[error("log `{path}` names an invalid baseline")]
    InvalidKey {
        /// The log file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: ExpectationKeyError,
    },
}

/// An error that occurs while loading a persisted baseline.
///
/// Every variant indicates that history could not be recovered. Callers
/// must not substitute an empty baseline.
#[derive(Debug, Error)]
pub enum BaselineLoadError {
    /// The baseline file exists but could not be read.
    #[error("failed to read baseline `{path}`")]
    Read {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The baseline file is not a JSON object of string arrays.
    #[error("baseline `{path}` is not a valid expectation file")]
    Deserialize {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// An outcome kind in the baseline was empty.
    #[error("baseline `{path}` contains an empty outcome kind")]
    EmptyKind {
        /// The baseline file.
        path: Utf8PathBuf,
    },

    /// A test case id in the baseline was empty.
    #[error("baseline `{path}` contains an empty test case id under `{kind}`")]
    InvalidCaseId {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The kind the id was recorded under.
        kind: Outcome,

        /// The underlying error.
        #[source]
        error: TestCaseIdError,
    },

    /// A test case was recorded under two outcome kinds.
    #[error("baseline `{path}` records `{case_id}` under both `{first}` and `{second}`")]
    DuplicateCase {
        /// The baseline file.
        path: Utf8PathBuf,

        /// The duplicated test case.
        case_id: String,

        /// The first kind the case was found under.
        first: Outcome,

        /// The second kind the case was found under.
        second: Outcome,
    },

    /// A plain-text subset file exists but could not be read.
    #[error("failed to read subset file `{path}`")]
    SubsetRead {
        /// The subset file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while saving a baseline.
///
/// A failed save never leaves a partially written JSON file behind.
#[derive(Debug, Error)]
pub enum BaselineSaveError {
    /// The directory holding the baseline could not be created.
    #[error("failed to create expectations directory `{path}`")]
    CreateDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The directory holding the baseline could not be listed.
    #[error("failed to list expectations directory `{path}`")]
    ListDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A stale plain-text file could not be removed.
    #[error("failed to remove stale expectation file `{path}`")]
    RemoveStale {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The baseline could not be serialized.
    #[error("failed to serialize baseline for `{path}`")]
    Serialize {
        /// The file being written.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: serde_json::Error,
    },

    /// A file could not be written.
    #[error("failed to write expectation file `{path}`")]
    Write {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while resetting a baseline.
#[derive(Debug, Error)]
pub enum BaselineResetError {
    /// The directory holding the baseline could not be listed.
    #[error("failed to list expectations directory `{path}`")]
    ListDir {
        /// The directory.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// A file could not be removed.
    #[error("failed to remove expectation file `{path}`")]
    Remove {
        /// The file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },
}

/// An error that occurs while merging a run into a baseline.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The existing baseline could not be loaded.
    #[error("failed to load existing baseline")]
    Load(#[from] BaselineLoadError),

    /// The merged baseline could not be saved.
    #[error("failed to save merged baseline")]
    Save(#[from] BaselineSaveError),
}

/// An error that occurs while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file was explicitly requested but does not exist.
    #[error("config file `{path}` not found")]
    FileNotFound {
        /// The config file.
        path: Utf8PathBuf,
    },

    /// The config file could not be read.
    #[error("failed to read config file `{path}`")]
    Read {
        /// The config file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// The config file could not be parsed.
    #[error("failed to parse config file `{path}`")]
    Parse {
        /// The config file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: toml::de::Error,
    },
}

/// An error that occurs while selecting cases for the next run.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The baseline or a subset file could not be loaded.
    #[error("failed to load expectations")]
    Load(#[from] BaselineLoadError),

    /// A non-`Pass` subset was requested but no such file exists.
    #[error("no `{subset}` subset recorded for {key}")]
    MissingSubset {
        /// The key that was looked up.
        key: String,

        /// The requested subset.
        subset: Outcome,
    },

    /// No `Pass` subset exists and no caselist was provided to bootstrap from.
    #[error("no `Pass` subset recorded for {key} and no caselist to bootstrap from")]
    NoCaselist {
        /// The key that was looked up.
        key: String,
    },

    /// The caselist file could not be read.
    #[error("failed to read caselist `{path}`")]
    CaselistRead {
        /// The caselist file.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        error: std::io::Error,
    },

    /// Planning produced no cases.
    #[error("no `{subset}` test cases found for {key}")]
    Empty {
        /// The key that was looked up.
        key: String,

        /// The requested subset.
        subset: Outcome,
    },
}
