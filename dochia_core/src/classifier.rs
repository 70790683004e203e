//! Response classification.
//!
//! Maps one response to a single verdict given what the playbook expected.
//! Everything here is pure: no I/O, no state, no reporting.

use crate::http::HttpResponse;
use crate::matching::IgnoreRules;
use crate::model::{DEFAULT_CONTENT_TYPE, PlaybookData};
use crate::response_code::{ResponseCodeFamily, is_4xx, is_unimplemented};
use serde_json::Value as JsonValue;
use std::fmt;

/// Codes that services commonly return without documenting them.
const NOT_NECESSARILY_DOCUMENTED: [&str; 6] = ["406", "413", "414", "415", "431", "501"];

/// Content types whose bodies are never validated against a schema.
const CONTENT_TYPES_NOT_MATCHING_SCHEMA: [&str; 4] = [
    "application/octet-stream",
    "application/xml",
    "text/plain",
    "text/html",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VerdictLevel {
    Info,
    Warn,
    Error,
    Skip,
}

impl fmt::Display for VerdictLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerdictLevel::Info => "success",
            VerdictLevel::Warn => "warning",
            VerdictLevel::Error => "error",
            VerdictLevel::Skip => "skipped",
        };
        f.write_str(name)
    }
}

/// A terminal outcome for one test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub level: VerdictLevel,
    /// Short, groupable reason such as `Not found`.
    pub reason: String,
    pub message: String,
}

impl Verdict {
    pub fn new(level: VerdictLevel, reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn expected_response(code: &str) -> Self {
        Self::new(
            VerdictLevel::Info,
            "All Good!",
            format!(
                "Response matches expected result. Response code [{code}] is documented and response body matches the corresponding schema."
            ),
        )
    }

    pub fn not_matching_response_schema(code: &str) -> Self {
        Self::new(
            VerdictLevel::Warn,
            "Not matching response schema",
            format!(
                "Response does NOT match expected result. Response code [{code}] is documented, but response body does NOT match the corresponding schema."
            ),
        )
    }

    pub fn not_matching_content_type(expected: &[String], actual: Option<&str>) -> Self {
        Self::new(
            VerdictLevel::Warn,
            "Response content type not matching the contract",
            format!(
                "Response content type not matching the contract: expected {:?}, actual [{}]",
                expected,
                actual.unwrap_or("unknown")
            ),
        )
    }

    pub fn not_implemented() -> Self {
        Self::new(
            VerdictLevel::Warn,
            "Not implemented",
            "Response HTTP code 501: you forgot to implement this functionality!",
        )
    }

    pub fn not_found() -> Self {
        Self::new(
            VerdictLevel::Error,
            "Not found",
            "Response HTTP code 404: you might need to provide business context using ref-data",
        )
    }

    pub fn response_time_exceeds_max(actual_ms: u64, max_ms: u64) -> Self {
        Self::new(
            VerdictLevel::Error,
            "Response time exceeds max",
            format!(
                "Test case executed successfully, but response time exceeds max-response-time: actual {actual_ms}, max {max_ms}"
            ),
        )
    }

    pub fn unexpected_exception(playbook: &str, error: &str) -> Self {
        Self::new(
            VerdictLevel::Error,
            "Unexpected exception",
            format!("Playbook [{playbook}] failed due to [{error}]"),
        )
    }

    pub fn unexpected_response_code(code: &str, expected: &ResponseCodeFamily) -> Self {
        Self::new(
            VerdictLevel::Error,
            format!("Unexpected response code: {code}"),
            format!(
                "Response does NOT match expected result. Response code is NOT from a list of expected codes for this PLAYBOOK: expected {expected}, actual [{code}]"
            ),
        )
    }

    pub fn undocumented_response_code(
        code: &str,
        expected: &ResponseCodeFamily,
        documented: &[String],
    ) -> Self {
        Self::new(
            VerdictLevel::Warn,
            format!("Undocumented response code: {code}"),
            format!(
                "Response does NOT match expected result. Response code is from a list of expected codes for this PLAYBOOK, but it is undocumented: expected {expected}, actual [{code}], documented response codes: {documented:?}"
            ),
        )
    }

    pub fn unexpected_behaviour(code: &str, expected: &ResponseCodeFamily) -> Self {
        Self::new(
            VerdictLevel::Error,
            format!("Unexpected behaviour {code}"),
            format!("Unexpected behaviour: expected {expected}, actual [{code}]"),
        )
    }

    fn downgraded_to_info_if(mut self, ignored: bool) -> Self {
        if ignored {
            self.level = VerdictLevel::Info;
        }
        self
    }
}

/// Which optional checks the playbook wants applied to the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseChecks {
    pub match_schema: bool,
    pub match_content_type: bool,
}

impl Default for ResponseChecks {
    fn default() -> Self {
        Self {
            match_schema: true,
            match_content_type: true,
        }
    }
}

/// Classifies `response` against the expected family.
///
/// Precedence: content type, then expected-and-documented, then
/// expected-but-undocumented, then documented-but-unexpected, then not found,
/// and finally unexpected behaviour.
pub fn classify(
    data: &PlaybookData,
    response: &HttpResponse,
    expected: &ResponseCodeFamily,
    checks: ResponseChecks,
    ignore: &IgnoreRules,
) -> Verdict {
    let code = response.code_as_string();
    let matches_schema = !checks.match_schema || matches_response_schema(data, response);
    let code_expected = expected.matches_allowed(&code);
    let code_documented = is_documented(data, &code);
    let content_type_matches =
        !checks.match_content_type || is_content_type_matching(data, response);

    if !content_type_matches && !ignore.ignore_content_type {
        let documented = data
            .content_types_for(&code)
            .cloned()
            .unwrap_or_else(|| vec![DEFAULT_CONTENT_TYPE.to_string()]);
        return Verdict::not_matching_content_type(&documented, response.content_type.as_deref());
    }

    match (code_expected, code_documented) {
        (true, true) if matches_schema => Verdict::expected_response(&code),
        (true, true) => Verdict::not_matching_response_schema(&code)
            .downgraded_to_info_if(ignore.ignore_body_validation),
        (true, false) => Verdict::undocumented_response_code(&code, expected, &data.response_codes)
            .downgraded_to_info_if(ignore.ignore_undocumented),
        (false, true) if response.response_code == 404 => Verdict::not_found(),
        (false, true) if is_unimplemented(response.response_code) => Verdict::not_implemented(),
        (false, true) => Verdict::unexpected_response_code(&code, expected),
        (false, false) if response.response_code == 404 => Verdict::not_found(),
        (false, false) => Verdict::unexpected_behaviour(&code, expected),
    }
}

fn is_documented(data: &PlaybookData, code: &str) -> bool {
    data.is_code_documented(code) || NOT_NECESSARILY_DOCUMENTED.contains(&code)
}

fn is_content_type_matching(data: &PlaybookData, response: &HttpResponse) -> bool {
    let Some(actual) = response.content_type.as_deref() else {
        return true;
    };
    match data.content_types_for(&response.code_as_string()) {
        Some(documented) if !documented.is_empty() => documented
            .iter()
            .any(|expected| are_content_types_equivalent(actual, expected)),
        _ => are_content_types_equivalent(actual, DEFAULT_CONTENT_TYPE),
    }
}

/// Compares media types ignoring parameters, so `application/problem+json`
/// is equivalent to `application/json`.
pub fn are_content_types_equivalent(first: &str, second: &str) -> bool {
    let (Some((first_type, first_sub)), Some((second_type, second_sub))) =
        (split_media_type(first), split_media_type(second))
    else {
        return false;
    };
    if first_type == "*" || second_type == "*" {
        return true;
    }
    first_type == second_type
        && (first_sub == "*"
            || second_sub == "*"
            || first_sub.ends_with(&second_sub)
            || second_sub.ends_with(&first_sub))
}

fn split_media_type(value: &str) -> Option<(String, String)> {
    let essence = value.split(';').next()?.trim().to_ascii_lowercase();
    let (kind, sub) = essence.split_once('/')?;
    if kind.is_empty() || sub.is_empty() {
        return None;
    }
    Some((kind.to_string(), sub.to_string()))
}

fn matches_response_schema(data: &PlaybookData, response: &HttpResponse) -> bool {
    let code = response.code_as_string();
    let documented = data.response_properties_for(&code);
    let Some(json) = response.json_body.as_ref() else {
        return true;
    };

    if documented.is_none_or(|d| d.is_empty()) && is_empty_body(&response.body) {
        return true;
    }
    if response.content_type.as_deref().is_some_and(|ct| {
        CONTENT_TYPES_NOT_MATCHING_SCHEMA
            .iter()
            .any(|skip| are_content_types_equivalent(skip, ct))
    }) {
        return true;
    }
    if NOT_NECESSARILY_DOCUMENTED.contains(&code.as_str()) {
        return true;
    }
    if matches!(json, JsonValue::Array(items) if items.is_empty()) {
        return true;
    }

    match documented {
        Some(properties) => {
            matches_element(properties, json)
                && (is_fuzzed_field_in_body(response) || !is_4xx(response.response_code))
        }
        None => false,
    }
}

fn is_empty_body(body: &str) -> bool {
    matches!(body.trim(), "" | "[]" | "{}")
}

fn matches_element(properties: &[String], element: &JsonValue) -> bool {
    if properties.is_empty() {
        return true;
    }
    match element {
        JsonValue::Array(items) => match items.first() {
            Some(first) => matches_element(properties, first),
            None => true,
        },
        JsonValue::Object(map) => map
            .iter()
            .all(|(name, value)| matches_property(properties, name, value)),
        _ => false,
    }
}

fn matches_property(properties: &[String], name: &str, value: &JsonValue) -> bool {
    match value {
        JsonValue::Object(map) => map
            .iter()
            .all(|(child_name, child)| matches_property(properties, child_name, child)),
        _ => properties.iter().any(|p| p.eq_ignore_ascii_case(name)),
    }
}

fn is_fuzzed_field_in_body(response: &HttpResponse) -> bool {
    let Some(field) = response.fuzzed_field.as_deref() else {
        return true;
    };
    let normalize = |s: &str| {
        s.chars()
            .filter(|c| !matches!(c, '-' | '_' | '#') && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase()
    };
    normalize(&response.body).contains(&normalize(field))
}
