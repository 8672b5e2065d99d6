// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A machine-readable summary of one parsed run.
///
/// Produced by `deqp-expect parse --message-format json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[non_exhaustive]
pub struct RunSummary {
    /// The number of parsed outcomes, duplicates included.
    pub total: usize,

    /// The number of outcomes other than `Pass` and `NotSupported`.
    pub failures: usize,

    /// Outcome counts keyed by outcome name.
    pub counts: BTreeMap<String, usize>,

    /// Test cases seen with more than one distinct outcome in this run, with
    /// the outcomes they were seen with.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub conflicts: BTreeMap<String, Vec<String>>,

    /// Every parsed `(test case, outcome)` pair in execution order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<CaseResultSummary>,
}

impl RunSummary {
    /// Returns true if every outcome was healthy.
    pub fn is_success(&self) -> bool {
        self.failures == 0
    }

    /// Parses a summary from JSON.
    pub fn parse_json(json: impl AsRef<str>) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json.as_ref())
    }
}

/// One parsed result.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CaseResultSummary {
    /// The test case identifier.
    pub case: String,

    /// The outcome name.
    pub outcome: String,
}
