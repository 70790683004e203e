use crate::model::FIELD_SEPARATOR;
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyMode {
    Noop,
    Replace,
    Insert,
    Prefix,
    Trail,
    Trim,
    Skip,
}

impl StrategyMode {
    pub fn name(&self) -> &'static str {
        match self {
            StrategyMode::Noop => "NOOP",
            StrategyMode::Replace => "REPLACE",
            StrategyMode::Insert => "INSERT",
            StrategyMode::Prefix => "PREFIX",
            StrategyMode::Trail => "TRAIL",
            StrategyMode::Trim => "TRIM",
            StrategyMode::Skip => "SKIP",
        }
    }
}

/// One mutation to apply to a field or header value.
///
/// Strategies are plain values: executors clone them per use and attach the
/// concrete data with [`FuzzingStrategy::with_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzingStrategy {
    pub mode: StrategyMode,
    pub data: JsonValue,
}

impl FuzzingStrategy {
    pub fn noop() -> Self {
        Self::of(StrategyMode::Noop)
    }

    pub fn replace() -> Self {
        Self::of(StrategyMode::Replace)
    }

    pub fn insert() -> Self {
        Self::of(StrategyMode::Insert)
    }

    pub fn prefix() -> Self {
        Self::of(StrategyMode::Prefix)
    }

    pub fn trail() -> Self {
        Self::of(StrategyMode::Trail)
    }

    pub fn trim() -> Self {
        Self::of(StrategyMode::Trim)
    }

    pub fn skip() -> Self {
        Self::of(StrategyMode::Skip)
    }

    fn of(mode: StrategyMode) -> Self {
        Self {
            mode,
            data: JsonValue::Null,
        }
    }

    pub fn with_data(mut self, data: impl Into<JsonValue>) -> Self {
        self.data = data.into();
        self
    }

    pub fn name(&self) -> &'static str {
        self.mode.name()
    }

    pub fn is_skip(&self) -> bool {
        self.mode == StrategyMode::Skip
    }

    /// Applies the mutation to `original` and returns the new value.
    pub fn process(&self, original: &JsonValue) -> JsonValue {
        match self.mode {
            StrategyMode::Noop | StrategyMode::Skip => original.clone(),
            StrategyMode::Replace => self.data.clone(),
            StrategyMode::Prefix => {
                JsonValue::String(format!("{}{}", as_text(&self.data), as_text(original)))
            }
            StrategyMode::Trail => {
                JsonValue::String(format!("{}{}", as_text(original), as_text(&self.data)))
            }
            StrategyMode::Insert => JsonValue::String(insert_in_the_middle(
                &as_text(original),
                &as_text(&self.data),
            )),
            StrategyMode::Trim => JsonValue::String(as_text(original).trim().to_string()),
        }
    }

    /// String form of [`FuzzingStrategy::process`], used for header values.
    pub fn process_str(&self, original: &str) -> String {
        as_text(&self.process(&JsonValue::String(original.to_string())))
    }
}

impl fmt::Display for FuzzingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = as_text(&self.data);
        let shown: String = data.chars().take(30).collect();
        if data.chars().count() > 30 {
            write!(f, "{} [{}...]", self.name(), shown.escape_debug())
        } else {
            write!(f, "{} [{}]", self.name(), shown.escape_debug())
        }
    }
}

/// Text form of a JSON value: strings unquoted, everything else serialized.
pub fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn insert_in_the_middle(value: &str, insert: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    let middle = chars.len() / 2;
    let mut out: String = chars[..middle].iter().collect();
    out.push_str(insert);
    out.extend(chars[middle..].iter());
    out
}

/// Outcome of mutating one field of a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FuzzingResult {
    pub json: String,
    pub fuzzed_value: JsonValue,
}

/// Applies `strategy` to the field at `field_path` (segments joined by `#`).
///
/// Arrays on the path are traversed element by element. When the field is
/// absent, or the payload is not JSON, the payload is returned unchanged.
pub fn replace_field(payload: &str, field_path: &str, strategy: &FuzzingStrategy) -> FuzzingResult {
    let Ok(mut root) = serde_json::from_str::<JsonValue>(payload) else {
        return FuzzingResult {
            json: payload.to_string(),
            fuzzed_value: strategy.data.clone(),
        };
    };
    let segments: Vec<&str> = field_path.split(FIELD_SEPARATOR).collect();
    let mut fuzzed_value = None;
    update_at(&mut root, &segments, &mut |value: &mut JsonValue| {
        let mutated = strategy.process(value);
        fuzzed_value.get_or_insert_with(|| mutated.clone());
        *value = mutated;
    });

    match fuzzed_value {
        Some(fuzzed_value) => FuzzingResult {
            json: root.to_string(),
            fuzzed_value,
        },
        None => FuzzingResult {
            json: payload.to_string(),
            fuzzed_value: strategy.data.clone(),
        },
    }
}

/// Removes the field at `field_path`; the payload is unchanged when absent.
pub fn remove_field(payload: &str, field_path: &str) -> String {
    let Ok(mut root) = serde_json::from_str::<JsonValue>(payload) else {
        return payload.to_string();
    };
    let segments: Vec<&str> = field_path.split(FIELD_SEPARATOR).collect();
    if let Some((last, parents)) = segments.split_last() {
        remove_at(&mut root, parents, last);
    }
    root.to_string()
}

/// The first value found at `field_path`.
pub fn field_value(payload: &str, field_path: &str) -> Option<JsonValue> {
    let root = serde_json::from_str::<JsonValue>(payload).ok()?;
    let segments: Vec<&str> = field_path.split(FIELD_SEPARATOR).collect();
    find_at(&root, &segments).cloned()
}

pub fn is_field_in_json(payload: &str, field_path: &str) -> bool {
    field_value(payload, field_path).is_some()
}

fn update_at(value: &mut JsonValue, segments: &[&str], apply: &mut dyn FnMut(&mut JsonValue)) {
    match value {
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                update_at(item, segments, apply);
            }
        }
        JsonValue::Object(map) => {
            let Some((first, rest)) = segments.split_first() else {
                return;
            };
            if let Some(child) = map.get_mut(*first) {
                if rest.is_empty() {
                    apply(child);
                } else {
                    update_at(child, rest, apply);
                }
            }
        }
        _ => {}
    }
}

fn remove_at(value: &mut JsonValue, parents: &[&str], last: &str) {
    match value {
        JsonValue::Array(items) => {
            for item in items.iter_mut() {
                remove_at(item, parents, last);
            }
        }
        JsonValue::Object(map) => match parents.split_first() {
            None => {
                map.shift_remove(last);
            }
            Some((first, rest)) => {
                if let Some(child) = map.get_mut(*first) {
                    remove_at(child, rest, last);
                }
            }
        },
        _ => {}
    }
}

fn find_at<'a>(value: &'a JsonValue, segments: &[&str]) -> Option<&'a JsonValue> {
    let Some((first, rest)) = segments.split_first() else {
        return Some(value);
    };
    match value {
        JsonValue::Array(items) => items.iter().find_map(|item| find_at(item, segments)),
        JsonValue::Object(map) => map.get(*first).and_then(|child| find_at(child, rest)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strategies_transform_string_values() {
        let original = json!("abcd");
        assert_eq!(FuzzingStrategy::prefix().with_data(" ").process(&original), json!(" abcd"));
        assert_eq!(FuzzingStrategy::trail().with_data("\t").process(&original), json!("abcd\t"));
        assert_eq!(FuzzingStrategy::insert().with_data("X").process(&original), json!("abXcd"));
        assert_eq!(FuzzingStrategy::replace().with_data(json!(null)).process(&original), json!(null));
        assert_eq!(FuzzingStrategy::noop().process(&original), original);
        assert_eq!(FuzzingStrategy::trim().process(&json!("  a ")), json!("a"));
    }

    #[test]
    fn replace_field_mutates_nested_and_array_fields() {
        let payload = r#"{"name":"rex","owner":{"id":"1"},"tags":[{"v":"a"},{"v":"b"}]}"#;
        let result = replace_field(payload, "owner#id", &FuzzingStrategy::replace().with_data(""));
        assert_eq!(result.json, r#"{"name":"rex","owner":{"id":""},"tags":[{"v":"a"},{"v":"b"}]}"#);
        assert_eq!(result.fuzzed_value, json!(""));

        let result = replace_field(payload, "tags#v", &FuzzingStrategy::prefix().with_data(" "));
        assert_eq!(result.json, r#"{"name":"rex","owner":{"id":"1"},"tags":[{"v":" a"},{"v":" b"}]}"#);
    }

    #[test]
    fn replace_field_leaves_payload_when_field_is_absent() {
        let payload = r#"{"name":"rex"}"#;
        let result = replace_field(payload, "age", &FuzzingStrategy::replace().with_data(1));
        assert_eq!(result.json, payload);
        assert_eq!(result.fuzzed_value, json!(1));
    }

    #[test]
    fn remove_and_lookup_follow_field_paths() {
        let payload = r#"{"a":{"b":1,"c":2}}"#;
        assert_eq!(remove_field(payload, "a#b"), r#"{"a":{"c":2}}"#);
        assert_eq!(field_value(payload, "a#c"), Some(json!(2)));
        assert!(!is_field_in_json(payload, "a#d"));
    }

    #[test]
    fn display_truncates_long_data() {
        let strategy = FuzzingStrategy::replace().with_data("x".repeat(40));
        assert_eq!(strategy.to_string(), format!("REPLACE [{}...]", "x".repeat(30)));
    }
}
