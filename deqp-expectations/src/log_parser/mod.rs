// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of raw dEQP execution logs.
//!
//! A dEQP log is line oriented. Each executed case writes a block:
//!
//! ```text
//! #beginTestCaseResult dEQP-GLES2.info.vendor
//! <?xml version="1.0"?>
//! <TestCaseResult CasePath="dEQP-GLES2.info.vendor" ...>
//! <Result StatusCode="Pass">Pass</Result>
//! </TestCaseResult>
//! #endTestCaseResult
//! ```
//!
//! A case aborted by the harness ends with `#terminateTestCaseResult <status>`
//! instead, and a process that died mid-write leaves an unterminated block at
//! the end of the file. [`LogParser`] turns all of these into
//! `(TestCaseId, Outcome)` pairs without ever failing.

mod imp;
mod payload;

pub use imp::LogParser;

use crate::errors::LogReadError;
use camino::Utf8Path;
use std::io;
use tracing::debug;

/// Reads a log file for parsing.
///
/// A missing file reads as an empty log. Invalid UTF-8 is replaced rather
/// than rejected, since a crashing process may have left a torn write.
pub fn read_log(path: &Utf8Path) -> Result<String, LogReadError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            debug!("log file `{path}` does not exist, treating it as empty");
            Ok(String::new())
        }
        Err(error) => Err(LogReadError::new(path, error)),
    }
}
