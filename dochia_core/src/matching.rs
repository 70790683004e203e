use crate::config::{IgnoreSettings, MatchSettings, ReportingSettings};
use crate::error::ConfigError;
use crate::http::HttpResponse;
use crate::response_code::match_as_code_or_range;
use crate::strategy::as_text;
use regex::Regex;
use serde_json::Value as JsonValue;

const BLACKBOX_FILTERED_CODES: [&str; 3] = ["2xx", "4xx", "501"];

fn compile_full_match(pattern: &str, dot_matches_newline: bool) -> Result<Regex, ConfigError> {
    let anchored = if dot_matches_newline {
        format!("(?s)^(?:{pattern})$")
    } else {
        format!("^(?:{pattern})$")
    };
    Regex::new(&anchored).map_err(|e| ConfigError::InvalidRegex {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// The `--m*` arguments: responses that should be reported when seen.
#[derive(Debug, Clone, Default)]
pub struct Matchers {
    codes: Vec<String>,
    sizes: Vec<u64>,
    words: Vec<u64>,
    lines: Vec<u64>,
    regex: Option<Regex>,
    input: bool,
}

impl Matchers {
    pub fn from_settings(settings: &MatchSettings) -> Result<Self, ConfigError> {
        let regex = settings
            .regex
            .as_deref()
            .map(|pattern| compile_full_match(pattern, true))
            .transpose()?;
        Ok(Self {
            codes: settings.codes.clone(),
            sizes: settings.sizes.clone(),
            words: settings.words.clone(),
            lines: settings.lines.clone(),
            regex,
            input: settings.input,
        })
    }

    /// Match mode is active as soon as one matcher is configured.
    pub fn is_any_supplied(&self) -> bool {
        !self.codes.is_empty()
            || !self.sizes.is_empty()
            || !self.words.is_empty()
            || !self.lines.is_empty()
            || self.regex.is_some()
            || self.input
    }

    pub fn is_match_response(&self, response: &HttpResponse) -> bool {
        let code = response.code_as_string();
        self.codes
            .iter()
            .any(|expected| match_as_code_or_range(expected, &code))
            || self.sizes.contains(&response.content_length_in_bytes)
            || self.words.contains(&response.number_of_words)
            || self.lines.contains(&response.number_of_lines)
            || self.matches_regex(&response.body)
    }

    fn matches_regex(&self, body: &str) -> bool {
        match &self.regex {
            Some(regex) if !body.trim().is_empty() => regex.is_match(body),
            _ => false,
        }
    }

    /// True when `--mi` is enabled and the fuzzed value is echoed back in the body.
    pub fn is_input_reflected(&self, response: &HttpResponse, input: &JsonValue) -> bool {
        if !self.input {
            return false;
        }
        let text = as_text(input);
        !text.is_empty() && response.body.contains(&text)
    }

    /// Human readable summary of the configured matchers.
    pub fn match_string(&self) -> String {
        let mut parts = Vec::new();
        if !self.codes.is_empty() {
            parts.push(format!("response codes {:?}", self.codes));
        }
        if !self.sizes.is_empty() {
            parts.push(format!("sizes {:?}", self.sizes));
        }
        if !self.words.is_empty() {
            parts.push(format!("words {:?}", self.words));
        }
        if !self.lines.is_empty() {
            parts.push(format!("lines {:?}", self.lines));
        }
        if let Some(regex) = &self.regex {
            parts.push(format!("regex [{}]", regex.as_str()));
        }
        if self.input {
            parts.push("reflected input".to_string());
        }
        format!(" {}", parts.join(", "))
    }
}

/// The `--ignore-*`, `--filter-*` and `--hide-*` arguments.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    codes: Vec<String>,
    sizes: Vec<u64>,
    words: Vec<u64>,
    lines: Vec<u64>,
    regex: Option<Regex>,
    pub skip_reporting_for_ignored: bool,
    pub ignore_undocumented: bool,
    pub ignore_body_validation: bool,
    pub ignore_content_type: bool,
    pub hide_success: bool,
    pub hide_warnings: bool,
}

impl IgnoreRules {
    pub fn from_settings(
        ignore: &IgnoreSettings,
        reporting: &ReportingSettings,
    ) -> Result<Self, ConfigError> {
        let mut codes = ignore.codes.clone();
        codes.extend(ignore.filter_codes.iter().cloned());
        if ignore.blackbox {
            codes.extend(BLACKBOX_FILTERED_CODES.iter().map(|c| c.to_string()));
        }
        let mut sizes = ignore.sizes.clone();
        sizes.extend(ignore.filter_sizes.iter().copied());
        let mut words = ignore.words.clone();
        words.extend(ignore.filter_words.iter().copied());
        let mut lines = ignore.lines.clone();
        lines.extend(ignore.filter_lines.iter().copied());

        let pattern = ignore.filter_regex.as_deref().or(ignore.regex.as_deref());
        let regex = pattern
            .map(|p| compile_full_match(p, false))
            .transpose()?;

        let skip_reporting_for_ignored = ignore.blackbox
            || !ignore.filter_codes.is_empty()
            || !ignore.filter_sizes.is_empty()
            || !ignore.filter_words.is_empty()
            || !ignore.filter_lines.is_empty()
            || ignore.filter_regex.is_some();

        Ok(Self {
            codes,
            sizes,
            words,
            lines,
            regex,
            skip_reporting_for_ignored,
            ignore_undocumented: ignore.ignore_undocumented,
            ignore_body_validation: ignore.ignore_body_validation,
            ignore_content_type: ignore.ignore_content_type,
            hide_success: reporting.hide_success,
            hide_warnings: reporting.hide_warnings,
        })
    }

    pub fn is_ignored_response(&self, response: &HttpResponse) -> bool {
        let code = response.code_as_string();
        self.codes
            .iter()
            .any(|ignored| match_as_code_or_range(ignored, &code))
            || self.sizes.contains(&response.content_length_in_bytes)
            || self.words.contains(&response.number_of_words)
            || self.lines.contains(&response.number_of_lines)
            || self
                .regex
                .as_ref()
                .is_some_and(|regex| regex.is_match(&response.body))
    }

    pub fn is_any_supplied(&self) -> bool {
        !self.codes.is_empty()
            || !self.sizes.is_empty()
            || !self.words.is_empty()
            || !self.lines.is_empty()
            || self.regex.is_some()
    }
}
