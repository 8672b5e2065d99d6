// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Maintain per-GPU dEQP expectation baselines from conformance logs.
//!
//! This crate is the `deqp-expect` command-line tool. The merging logic lives
//! in the `deqp-expectations` crate.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
