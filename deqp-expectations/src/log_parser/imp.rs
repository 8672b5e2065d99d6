// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::payload::parse_payload;
use crate::outcome::{Outcome, TestCaseId};
use std::{str::Lines, vec};
use tracing::{debug, warn};

static BEGIN_MARKER: &str = "#beginTestCaseResult";
static END_MARKER: &str = "#endTestCaseResult";
static TERMINATE_MARKER: &str = "#terminateTestCaseResult";
static CASE_MARKER: &str = "TestCase:";

/// The state of a [`LogParser`].
#[derive(Clone, Debug, PartialEq, Eq)]
enum ParserState {
    /// Between blocks.
    Idle,
    /// Accumulating the payload of an open block.
    InBlock {
        /// The case named by the begin marker or a preceding `TestCase:` line.
        case_id: Option<TestCaseId>,
        payload: String,
    },
    /// The last case was aborted by a terminate marker.
    Terminated,
}

/// A classified log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LogLine<'a> {
    Begin { token: &'a str },
    End,
    Terminate { token: &'a str },
    Case { token: &'a str },
    Other(&'a str),
}

impl<'a> LogLine<'a> {
    fn classify(line: &'a str) -> Self {
        if let Some(token) = strip_marker(line, TERMINATE_MARKER) {
            Self::Terminate { token }
        } else if strip_marker(line, END_MARKER).is_some() {
            Self::End
        } else if let Some(token) = strip_marker(line, BEGIN_MARKER) {
            Self::Begin { token }
        } else if let Some(token) = line.strip_prefix(CASE_MARKER) {
            Self::Case { token }
        } else {
            Self::Other(line)
        }
    }
}

/// Returns the rest of the line if it starts with `marker` as a whole word.
fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(marker)?;
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

/// Returns the first whitespace-separated token, if any.
fn first_token(s: &str) -> Option<&str> {
    s.split_whitespace().next()
}

/// A streaming parser over the text of one dEQP execution log.
///
/// The parser is an iterator of `(TestCaseId, Outcome)` pairs in encounter
/// order. It never fails: malformed blocks are reported as
/// [`Outcome::ParseFailure`] or [`Outcome::InternalError`], and a trailing
/// block cut off by a crash is dropped.
///
/// Transitions (`emit` produces one pair):
///
/// | state            | begin                                | end                       | terminate                  | other line        |
/// |------------------|--------------------------------------|---------------------------|----------------------------|-------------------|
/// | `Idle`           | open block                           | ignored                   | emit token, `Terminated`   | `TestCase:` noted |
/// | `InBlock`        | emit `InternalError`, open new block | emit payload status, `Idle` | emit token, `Terminated` | appended to payload |
/// | `Terminated`     | open block                           | ignored                   | emit token, `Terminated`   | `TestCase:` noted |
#[derive(Debug)]
pub struct LogParser<'a> {
    lines: Lines<'a>,
    line_number: usize,
    state: ParserState,
    pending_case: Option<TestCaseId>,
    caselist: Option<vec::IntoIter<TestCaseId>>,
}

impl<'a> LogParser<'a> {
    /// Creates a parser for a log produced by running cases one at a time.
    ///
    /// Each outcome is associated with the case named by its begin marker or
    /// the closest preceding `TestCase:` line, falling back to the `CasePath`
    /// recorded in the payload.
    pub fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines(),
            line_number: 0,
            state: ParserState::Idle,
            pending_case: None,
            caselist: None,
        }
    }

    /// Creates a parser for a log produced by a batch ("hasty") run.
    ///
    /// The n-th emitted outcome belongs to the n-th case of `caselist` unless
    /// the log names the case explicitly.
    pub fn with_caselist(text: &'a str, caselist: impl IntoIterator<Item = TestCaseId>) -> Self {
        Self {
            caselist: Some(caselist.into_iter().collect::<Vec<_>>().into_iter()),
            ..Self::new(text)
        }
    }

    fn process_line(&mut self, line: &'a str) -> Option<(TestCaseId, Outcome)> {
        let state = std::mem::replace(&mut self.state, ParserState::Idle);
        match (state, LogLine::classify(line)) {
            (ParserState::InBlock { case_id, .. }, LogLine::Begin { token }) => {
                debug!(
                    line = self.line_number,
                    "begin marker inside an open block, closing it as an internal error"
                );
                self.state = self.open_block(token);
                self.emit(case_id, None, Outcome::InternalError)
            }
            (ParserState::InBlock { case_id, payload }, LogLine::End) => {
                let parsed = parse_payload(&payload);
                self.emit(case_id, parsed.case_path, parsed.outcome)
            }
            (ParserState::InBlock { case_id, .. }, LogLine::Terminate { token }) => {
                self.state = ParserState::Terminated;
                self.emit(case_id, None, terminate_outcome(token))
            }
            (
                ParserState::InBlock {
                    case_id,
                    mut payload,
                },
                LogLine::Case { .. } | LogLine::Other(_),
            ) => {
                if !payload.is_empty() {
                    payload.push('\n');
                }
                payload.push_str(line);
                self.state = ParserState::InBlock { case_id, payload };
                None
            }
            (ParserState::Idle | ParserState::Terminated, LogLine::Begin { token }) => {
                self.state = self.open_block(token);
                None
            }
            (ParserState::Idle | ParserState::Terminated, LogLine::Terminate { token }) => {
                // The harness aborted a case whose block never started, e.g.
                // a crash during setup.
                self.state = ParserState::Terminated;
                let case_id = self.pending_case.take();
                self.emit(case_id, None, terminate_outcome(token))
            }
            (ParserState::Terminated, LogLine::End) => None,
            (ParserState::Idle, LogLine::End) => {
                debug!(line = self.line_number, "end marker outside of a block");
                None
            }
            (state @ (ParserState::Idle | ParserState::Terminated), LogLine::Case { token }) => {
                self.state = state;
                match TestCaseId::new(token) {
                    Ok(case_id) => self.pending_case = Some(case_id),
                    Err(_) => debug!(line = self.line_number, "empty `TestCase:` line"),
                }
                None
            }
            (state @ (ParserState::Idle | ParserState::Terminated), LogLine::Other(_)) => {
                self.state = state;
                None
            }
        }
    }

    fn open_block(&mut self, token: &str) -> ParserState {
        let named = first_token(token).and_then(|t| TestCaseId::new(t).ok());
        let pending = self.pending_case.take();
        ParserState::InBlock {
            case_id: named.or(pending),
            payload: String::new(),
        }
    }

    /// Associates an outcome with a case id and produces the pair.
    ///
    /// The positional cursor advances on every emitted outcome so that
    /// explicit names and caselist positions stay aligned.
    fn emit(
        &mut self,
        explicit: Option<TestCaseId>,
        from_payload: Option<TestCaseId>,
        outcome: Outcome,
    ) -> Option<(TestCaseId, Outcome)> {
        let positional = self.caselist.as_mut().and_then(|cases| cases.next());
        match explicit.or(positional).or(from_payload) {
            Some(case_id) => Some((case_id, outcome)),
            None => {
                warn!(
                    line = self.line_number,
                    %outcome,
                    "dropping outcome that cannot be associated with a test case"
                );
                None
            }
        }
    }
}

fn terminate_outcome(token: &str) -> Outcome {
    Outcome::parse(first_token(token).unwrap_or_default())
}

impl Iterator for LogParser<'_> {
    type Item = (TestCaseId, Outcome);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.lines.next() {
            self.line_number += 1;
            if let Some(pair) = self.process_line(line) {
                return Some(pair);
            }
        }

        if let ParserState::InBlock { case_id, .. } = &self.state {
            debug!(
                case_id = case_id.as_ref().map(|id| id.as_str()),
                "log ends inside an unterminated block, ignoring it"
            );
            self.state = ParserState::Idle;
        }
        None
    }
}
