// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Result classification and expectation merging for dEQP conformance runs.
//!
//! The flow of one run is:
//!
//! 1. [`log_parser::LogParser`] (or [`autotest::AutotestLog`] for harness
//!    INFO logs) turns a log into `(TestCaseId, Outcome)` pairs;
//! 2. [`aggregator::RunAggregator`] collects the pairs of the run;
//! 3. [`merge::MergeEngine`] folds the run into the baseline kept by an
//!    [`expectations::ExpectationStore`], moving every case seen with two
//!    distinct outcomes across history to `Flaky`.
//!
//! [`plan::plan_cases`] reads the persisted baselines back to choose the cases
//! of the next run.

pub mod aggregator;
pub mod autotest;
pub mod config;
pub mod errors;
pub mod expectations;
pub mod log_parser;
pub mod merge;
pub mod outcome;
pub mod plan;
