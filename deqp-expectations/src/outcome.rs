// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test case identifiers and outcome classification.

use crate::errors::TestCaseIdError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smol_str::SmolStr;
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

/// A dotted, hierarchical dEQP test case identifier, for example
/// `dEQP-GLES3.functional.shaders.operator.unary_operator.bitwise_not.highp_ivec3_vertex`.
///
/// Identifiers are trimmed on construction and are never empty.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TestCaseId(SmolStr);

impl TestCaseId {
    /// Creates a new identifier, trimming surrounding whitespace.
    pub fn new(id: impl AsRef<str>) -> Result<Self, TestCaseIdError> {
        let id = id.as_ref().trim();
        if id.is_empty() {
            return Err(TestCaseIdError::new());
        }
        Ok(Self(id.into()))
    }

    /// Returns the identifier as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this id lies under the given dotted prefix.
    ///
    /// `dEQP-GLES2.info.vendor` matches `dEQP-GLES2.info` and
    /// `dEQP-GLES2.info.vendor`, but not `dEQP-GLES2.inf`.
    pub fn matches_prefix(&self, prefix: &str) -> bool {
        match self.0.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }
}

impl FromStr for TestCaseId {
    type Err = TestCaseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for TestCaseId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TestCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TestCaseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The classification of a single test case execution.
///
/// The well-known dEQP status codes are modeled as variants. Any other
/// status string is kept verbatim in [`Outcome::Other`], so new kinds
/// emitted by a driver harness are never lost.
///
/// Outcomes compare, hash and sort by their canonical string name, which is
/// also the order they are serialized in.
#[derive(Clone, Debug)]
pub enum Outcome {
    /// The test passed.
    Pass,
    /// The tested feature is not supported by the implementation.
    NotSupported,
    /// The test failed.
    Fail,
    /// The test passed with a quality warning.
    QualityWarning,
    /// The test passed with a compatibility warning.
    CompatibilityWarning,
    /// The test hit an internal error in the test framework.
    InternalError,
    /// The test process crashed.
    Crash,
    /// The test hit the watchdog timeout.
    Timeout,
    /// The test could not allocate a resource it needed.
    ResourceError,
    /// The result block for the test could not be parsed.
    ParseFailure,
    /// The test was observed with two or more distinct outcomes.
    ///
    /// Reserved for baselines; a harness never reports this directly.
    Flaky,
    /// Any status string not covered above, kept verbatim.
    Other(SmolStr),
}

impl Outcome {
    /// Every well-known outcome, in declaration order.
    pub const WELL_KNOWN: &'static [Outcome] = &[
        Outcome::Pass,
        Outcome::NotSupported,
        Outcome::Fail,
        Outcome::QualityWarning,
        Outcome::CompatibilityWarning,
        Outcome::InternalError,
        Outcome::Crash,
        Outcome::Timeout,
        Outcome::ResourceError,
        Outcome::ParseFailure,
        Outcome::Flaky,
    ];

    /// Classifies a raw status string.
    ///
    /// Surrounding whitespace is trimmed. An empty string and the legacy
    /// `ParseTestResultFail` spelling both map to [`Outcome::ParseFailure`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "ParseFailure" | "ParseTestResultFail" => Self::ParseFailure,
            "Pass" => Self::Pass,
            "NotSupported" => Self::NotSupported,
            "Fail" => Self::Fail,
            "QualityWarning" => Self::QualityWarning,
            "CompatibilityWarning" => Self::CompatibilityWarning,
            "InternalError" => Self::InternalError,
            "Crash" => Self::Crash,
            "Timeout" => Self::Timeout,
            "ResourceError" => Self::ResourceError,
            "Flaky" => Self::Flaky,
            other => Self::Other(other.into()),
        }
    }

    /// Returns the canonical string name of this outcome.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pass => "Pass",
            Self::NotSupported => "NotSupported",
            Self::Fail => "Fail",
            Self::QualityWarning => "QualityWarning",
            Self::CompatibilityWarning => "CompatibilityWarning",
            Self::InternalError => "InternalError",
            Self::Crash => "Crash",
            Self::Timeout => "Timeout",
            Self::ResourceError => "ResourceError",
            Self::ParseFailure => "ParseFailure",
            Self::Flaky => "Flaky",
            Self::Other(s) => s,
        }
    }

    /// Returns true for `Pass` and `NotSupported`, the only outcomes that do
    /// not count as failures.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Pass | Self::NotSupported)
    }

    /// Returns true if this outcome's name can be used as the suffix of a
    /// plain-text expectation file (`<filter>.<name>`).
    pub fn is_file_suffix(&self) -> bool {
        let name = self.as_str();
        !name.is_empty()
            && name != "json"
            && !name
                .chars()
                .any(|c| c == '.' || c == '/' || c == '\\' || c.is_whitespace() || c.is_control())
    }
}

impl FromStr for Outcome {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl PartialEq for Outcome {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Outcome {}

impl Hash for Outcome {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl Ord for Outcome {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialOrd for Outcome {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Pass", Outcome::Pass; "pass")]
    #[test_case("  NotSupported\n", Outcome::NotSupported; "trimmed")]
    #[test_case("ParseTestResultFail", Outcome::ParseFailure; "legacy fallback")]
    #[test_case("", Outcome::ParseFailure; "empty")]
    #[test_case("Waiver", Outcome::Other("Waiver".into()); "unknown kept verbatim")]
    #[test_case("pass", Outcome::Other("pass".into()); "case sensitive")]
    fn parse_outcome(input: &str, expected: Outcome) {
        assert_eq!(Outcome::parse(input), expected);
    }

    #[test]
    fn outcome_roundtrips_through_name() {
        for outcome in Outcome::WELL_KNOWN {
            assert_eq!(&Outcome::parse(outcome.as_str()), outcome);
        }
    }

    #[test]
    fn healthy_outcomes() {
        assert!(Outcome::Pass.is_healthy());
        assert!(Outcome::NotSupported.is_healthy());
        assert!(!Outcome::parse("pass").is_healthy());
        assert!(!Outcome::parse("notsupported").is_healthy());
        assert!(!Outcome::Fail.is_healthy());
        assert!(!Outcome::Flaky.is_healthy());
        assert!(!Outcome::parse("Waiver").is_healthy());
    }

    #[test]
    fn outcomes_sort_by_name() {
        let mut outcomes = vec![
            Outcome::Pass,
            Outcome::Other("Aborted".into()),
            Outcome::Fail,
            Outcome::Crash,
        ];
        outcomes.sort();
        let names: Vec<_> = outcomes.iter().map(Outcome::as_str).collect();
        assert_eq!(names, ["Aborted", "Crash", "Fail", "Pass"]);
    }

    #[test_case("Pass", true; "plain")]
    #[test_case("json", false; "reserved")]
    #[test_case("a.b", false; "dot")]
    #[test_case("../x", false; "separator")]
    fn file_suffix(name: &str, expected: bool) {
        assert_eq!(Outcome::parse(name).is_file_suffix(), expected);
    }

    #[test]
    fn test_case_id_validation() {
        assert_eq!(
            TestCaseId::new("  dEQP-GLES2.info.vendor ").unwrap().as_str(),
            "dEQP-GLES2.info.vendor"
        );
        assert!(TestCaseId::new("   ").is_err());
        assert!(serde_json::from_str::<TestCaseId>(r#""""#).is_err());
    }

    #[test_case("dEQP-GLES2.info", true; "group")]
    #[test_case("dEQP-GLES2.info.vendor", true; "exact")]
    #[test_case("dEQP-GLES2.inf", false; "partial component")]
    #[test_case("dEQP-GLES3", false; "other module")]
    fn test_case_id_prefix(prefix: &str, expected: bool) {
        let id = TestCaseId::new("dEQP-GLES2.info.vendor").unwrap();
        assert_eq!(id.matches_prefix(prefix), expected);
    }
}
