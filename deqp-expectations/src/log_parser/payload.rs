// Copyright (c) The deqp-expect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsing of the XML payload between begin and end markers.

use crate::outcome::{Outcome, TestCaseId};
use quick_xml::{
    Reader,
    events::{BytesStart, Event},
};

static STATUS_CODE_ATTR: &str = "StatusCode";
static CASE_PATH_ATTR: &str = "CasePath";
static RESULT_TAG: &[u8] = b"Result";

/// The information recovered from one result payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(super) struct ParsedPayload {
    pub(super) outcome: Outcome,
    pub(super) case_path: Option<TestCaseId>,
}

impl ParsedPayload {
    fn failure(case_path: Option<TestCaseId>) -> Self {
        Self {
            outcome: Outcome::ParseFailure,
            case_path,
        }
    }
}

/// Extracts the status code from a `<TestCaseResult>` document.
///
/// The status is the `StatusCode` attribute of a `<Result>` element directly
/// under the root, or failing that of the root itself. A document that is
/// not well-formed, has more than one root, or carries no status code
/// yields [`Outcome::ParseFailure`].
pub(super) fn parse_payload(payload: &str) -> ParsedPayload {
    let mut reader = Reader::from_str(payload);
    let mut depth = 0usize;
    let mut root_seen = false;
    let mut root_status = None;
    let mut result_status = None;
    let mut case_path = None;

    loop {
        let (element, is_empty) = match reader.read_event() {
            Ok(Event::Start(element)) => (element, false),
            Ok(Event::Empty(element)) => (element, true),
            Ok(Event::End(_)) => {
                match depth.checked_sub(1) {
                    Some(d) => depth = d,
                    None => return ParsedPayload::failure(case_path),
                }
                continue;
            }
            Ok(Event::Eof) => break,
            Ok(_) => continue,
            Err(_) => return ParsedPayload::failure(case_path),
        };

        let element_depth = depth + 1;
        if element_depth == 1 {
            if root_seen {
                return ParsedPayload::failure(case_path);
            }
            root_seen = true;
            match read_attrs(&element) {
                Some((status, path)) => {
                    root_status = status;
                    case_path = path.and_then(|p| TestCaseId::new(p).ok());
                }
                None => return ParsedPayload::failure(case_path),
            }
        } else if element_depth == 2 && element.name().as_ref() == RESULT_TAG {
            match read_attrs(&element) {
                Some((status, _)) => {
                    if result_status.is_none() {
                        result_status = status;
                    }
                }
                None => return ParsedPayload::failure(case_path),
            }
        }

        if !is_empty {
            depth = element_depth;
        }
    }

    if !root_seen || depth != 0 {
        return ParsedPayload::failure(case_path);
    }

    match result_status.or(root_status) {
        Some(status) => ParsedPayload {
            outcome: Outcome::parse(&status),
            case_path,
        },
        None => ParsedPayload::failure(case_path),
    }
}

/// Returns `(StatusCode, CasePath)`, or `None` if an attribute is malformed.
fn read_attrs(element: &BytesStart<'_>) -> Option<(Option<String>, Option<String>)> {
    let read = |name: &str| -> Option<Option<String>> {
        match element.try_get_attribute(name) {
            Ok(Some(attr)) => attr.unescape_value().ok().map(|v| Some(v.into_owned())),
            Ok(None) => Some(None),
            Err(_) => None,
        }
    };
    Some((read(STATUS_CODE_ATTR)?, read(CASE_PATH_ATTR)?))
}
