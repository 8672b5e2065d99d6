// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted expectation baselines.
//!
//! A baseline records, for one GPU family and one test filter, which outcome
//! kind every known test case is expected to have. Baselines are stored in
//! two forms at once: a JSON file holding the full baseline, and one plain
//! text file per outcome kind listing its cases, which is what the execution
//! side reads to pick the cases of the next run.

mod baseline;
mod store;

pub use baseline::{DuplicateCase, ExpectationBaseline};
pub use store::FsExpectationStore;

use crate::{
    errors::{
        BaselineLoadError, BaselineResetError, BaselineSaveError, ExpectationKeyError,
        KeyComponent,
    },
    outcome::{Outcome, TestCaseId},
};
use std::fmt;

/// Identifies one baseline: a GPU family and a test filter prefix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpectationKey {
    gpu_family: String,
    filter: String,
}

impl ExpectationKey {
    /// Creates a new key. Both components are trimmed, must be non-empty and
    /// must be usable as a single path component.
    pub fn new(
        gpu_family: impl AsRef<str>,
        filter: impl AsRef<str>,
    ) -> Result<Self, ExpectationKeyError> {
        Ok(Self {
            gpu_family: validate_component(KeyComponent::GpuFamily, gpu_family.as_ref())?,
            filter: validate_component(KeyComponent::Filter, filter.as_ref())?,
        })
    }

    /// Returns the GPU family.
    pub fn gpu_family(&self) -> &str {
        &self.gpu_family
    }

    /// Returns the test filter prefix, for example `dEQP-GLES2.info`.
    pub fn filter(&self) -> &str {
        &self.filter
    }
}

fn validate_component(component: KeyComponent, value: &str) -> Result<String, ExpectationKeyError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ExpectationKeyError::Empty { component });
    }
    if value.contains(['/', '\\']) {
        return Err(ExpectationKeyError::PathSeparator {
            component,
            value: value.to_owned(),
        });
    }
    if value == "." || value == ".." {
        return Err(ExpectationKeyError::Reserved {
            component,
            value: value.to_owned(),
        });
    }
    Ok(value.to_owned())
}

impl fmt::Display for ExpectationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.gpu_family, self.filter)
    }
}

/// Load/save access to baselines.
///
/// Implementations assume a single writer per key for the duration of a
/// merge.
pub trait ExpectationStore {
    /// Loads the baseline for `key`.
    ///
    /// Returns an empty baseline if nothing was persisted for `key` yet. Any
    /// persisted state that cannot be read back exactly is an error.
    fn load(&self, key: &ExpectationKey) -> Result<ExpectationBaseline, BaselineLoadError>;

    /// Persists the baseline for `key`, replacing what was stored before.
    ///
    /// A failed save must not leave a partially written baseline that a
    /// later [`load`](Self::load) accepts.
    fn save(
        &self,
        key: &ExpectationKey,
        baseline: &ExpectationBaseline,
    ) -> Result<(), BaselineSaveError>;

    /// Removes everything persisted for `key`. Returns false if there was
    /// nothing to remove.
    fn reset(&self, key: &ExpectationKey) -> Result<bool, BaselineResetError>;

    /// Loads the plain-text list of cases recorded under `kind`, if one was
    /// persisted.
    fn load_subset(
        &self,
        key: &ExpectationKey,
        kind: &Outcome,
    ) -> Result<Option<Vec<TestCaseId>>, BaselineLoadError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn valid_key() {
        let key = ExpectationKey::new(" baytrail ", "dEQP-GLES2.info\r").unwrap();
        assert_eq!(key.gpu_family(), "baytrail");
        assert_eq!(key.filter(), "dEQP-GLES2.info");
        assert_eq!(key.to_string(), "baytrail/dEQP-GLES2.info");
    }

    #[test_case("", "dEQP-GLES2.info", ExpectationKeyError::Empty { component: KeyComponent::GpuFamily }; "empty gpu")]
    #[test_case("baytrail", "  ", ExpectationKeyError::Empty { component: KeyComponent::Filter }; "empty filter")]
    #[test_case(
        "bay/trail",
        "dEQP-GLES2.info",
        ExpectationKeyError::PathSeparator { component: KeyComponent::GpuFamily, value: "bay/trail".to_owned() }
        ; "separator in gpu"
    )]
    #[test_case(
        "baytrail",
        "..\\x",
        ExpectationKeyError::PathSeparator { component: KeyComponent::Filter, value: "..\\x".to_owned() }
        ; "backslash in filter"
    )]
    #[test_case(
        "..",
        "dEQP-GLES2.info",
        ExpectationKeyError::Reserved { component: KeyComponent::GpuFamily, value: "..".to_owned() }
        ; "parent dir"
    )]
    fn invalid_key(gpu: &str, filter: &str, expected: ExpectationKeyError) {
        assert_eq!(ExpectationKey::new(gpu, filter).unwrap_err(), expected);
    }
}
