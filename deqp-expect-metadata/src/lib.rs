// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Documented exit codes and machine-readable output formats for
//! `deqp-expect`.

mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
