use crate::http::DochiaHeader;
use crate::strategy::{FuzzingStrategy, remove_field, replace_field};
use rand::Rng;
use serde_json::{Number as JsonNumber, Value as JsonValue};

/// Defines a probability for a nested field to change during JSON value mutation.
const DEFAULT_JSON_FIELD_CHANGE_PROBABILITY: f64 = 0.5;
/// Defines a probability for a specific mutation type (e.g., string char change, number delta) to occur.
const DEFAULT_JSON_VALUE_MUTATION_PROBABILITY: f64 = 0.5;
/// Defines the default maximum recursion depth for `JsonValueMutator`.
const DEFAULT_JSON_MAX_MUTATION_DEPTH: usize = 10;

const RANDOM_STRING_BOUND: usize = 100;
const CONTROL_CHARS_BOUND: usize = 10;
const WHITESPACE_CHARS_BOUND: usize = 15;

const INVALID_JSONS: [&str; 10] = [
    "{",
    "[",
    "{\"field\":",
    "nul",
    "{}}",
    "\"unterminated",
    "[1,2",
    "{\"key\" \"value\"}",
    "{'single':'quotes'}",
    "{\"a\":1,}",
];

const UNSUPPORTED_MEDIA_TYPES: [&str; 12] = [
    "application/java-archive",
    "application/javascript",
    "application/octet-stream",
    "application/ogg",
    "application/pdf",
    "application/xhtml+xml",
    "application/x-shockwave-flash",
    "application/zip",
    "image/gif",
    "image/jpeg",
    "text/css",
    "text/csv",
];

const WHITESPACE_CHARS: [char; 17] = [
    ' ', '\t', '\n', '\u{000B}', '\u{000C}', '\r', '\u{0085}', '\u{00A0}', '\u{1680}', '\u{2000}',
    '\u{2002}', '\u{2005}', '\u{2009}', '\u{200A}', '\u{2028}', '\u{2029}', '\u{3000}',
];

/// A `Mutator` derives a new request from a valid one for the random playbook.
///
/// Body mutators rewrite the payload around a selected field; header
/// mutators rewrite the header set. Either way the inputs are left untouched
/// and the mutated copy is returned.
///
/// # Type Parameters
/// * `R`: The type of random number generator used for mutation decisions.
pub trait Mutator<R: Rng + ?Sized> {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Returns the payload with `field` mutated.
    fn mutate_payload(&self, payload: &str, field: &str, rng: &mut R) -> String;

    /// Returns the headers to send with the mutated payload.
    fn mutate_headers(&self, headers: &[DochiaHeader], rng: &mut R) -> Vec<DochiaHeader>;
}

fn just_replace(payload: &str, field: &str, value: JsonValue) -> String {
    replace_field(payload, field, &FuzzingStrategy::replace().with_data(value)).json
}

fn random_chars<R: Rng + ?Sized>(rng: &mut R, len: usize, pick: impl Fn(&mut R) -> char) -> String {
    (0..len).map(|_| pick(rng)).collect()
}

/// A structure-aware mutator that walks the selected field's JSON value and
/// nudges what it finds: characters in strings, numbers by a small delta,
/// booleans flipped. Nested objects and arrays are visited with
/// `field_recurse_probability` up to `max_mutation_depth`.
#[derive(Debug, Clone)]
pub struct JsonValueMutator {
    max_mutation_depth: usize,
    field_recurse_probability: f64,
}

impl Default for JsonValueMutator {
    fn default() -> Self {
        Self::new(DEFAULT_JSON_MAX_MUTATION_DEPTH, DEFAULT_JSON_FIELD_CHANGE_PROBABILITY)
    }
}

impl JsonValueMutator {
    pub fn new(max_mutation_depth: usize, field_recurse_probability: f64) -> Self {
        Self {
            max_mutation_depth: if max_mutation_depth == 0 {
                DEFAULT_JSON_MAX_MUTATION_DEPTH
            } else {
                max_mutation_depth
            },
            field_recurse_probability: if field_recurse_probability <= 0.0
                || field_recurse_probability > 1.0
            {
                DEFAULT_JSON_FIELD_CHANGE_PROBABILITY
            } else {
                field_recurse_probability
            },
        }
    }

    fn mutate_json_value<R: Rng + ?Sized>(&self, value: &mut JsonValue, rng: &mut R, current_depth: usize) {
        if current_depth >= self.max_mutation_depth {
            return;
        }

        match value {
            JsonValue::Object(map) => {
                for (_key, val) in map.iter_mut() {
                    if rng.random_bool(self.field_recurse_probability) {
                        self.mutate_json_value(val, rng, current_depth + 1);
                    }
                }
            }
            JsonValue::Array(arr) => {
                for val in arr.iter_mut() {
                    if rng.random_bool(self.field_recurse_probability) {
                        self.mutate_json_value(val, rng, current_depth + 1);
                    }
                }
            }
            JsonValue::String(s) => {
                if !s.is_empty() && rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    let mut chars: Vec<char> = s.chars().collect();
                    let idx = rng.random_range(0..chars.len());

                    // change case or pick a random printable ASCII char
                    if chars[idx].is_ascii_alphabetic() && rng.random_bool(0.5) {
                        if chars[idx].is_ascii_lowercase() {
                            chars[idx] = chars[idx].to_ascii_uppercase();
                        } else {
                            chars[idx] = chars[idx].to_ascii_lowercase();
                        }
                    } else {
                        chars[idx] = rng.random_range(32u8..127u8) as char;
                    }
                    *s = chars.into_iter().collect();
                }
            }
            JsonValue::Number(n) => {
                if rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    if let Some(val_i64) = n.as_i64() {
                        let delta = rng.random_range(-5i64..=5i64);
                        *n = JsonNumber::from(val_i64.saturating_add(delta));
                    } else if let Some(val_u64) = n.as_u64() {
                        let delta = rng.random_range(0u64..=5u64);
                        *n = JsonNumber::from(val_u64.saturating_add(delta));
                    } else if let Some(val_f64) = n.as_f64() {
                        let delta: f64 = rng.random_range(-1.0..1.0);
                        let new_val = val_f64 + delta;
                        *n = JsonNumber::from_f64(new_val).unwrap_or_else(|| JsonNumber::from(0));
                    }
                }
            }
            JsonValue::Bool(b) => {
                if rng.random_bool(DEFAULT_JSON_VALUE_MUTATION_PROBABILITY) {
                    *b = !*b;
                }
            }
            JsonValue::Null => {}
        }
    }
}

impl<R: Rng + ?Sized> Mutator<R> for JsonValueMutator {
    fn name(&self) -> &'static str {
        "JsonValueMutator"
    }

    fn description(&self) -> &'static str {
        "nudge the field's value: change characters, shift numbers, flip booleans"
    }

    fn mutate_payload(&self, payload: &str, field: &str, rng: &mut R) -> String {
        let Some(mut value) = crate::strategy::field_value(payload, field) else {
            return payload.to_string();
        };
        self.mutate_json_value(&mut value, rng, 0);
        just_replace(payload, field, value)
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullStringMutator;

impl<R: Rng + ?Sized> Mutator<R> for NullStringMutator {
    fn name(&self) -> &'static str {
        "NullStringMutator"
    }

    fn description(&self) -> &'static str {
        "replace field with null"
    }

    fn mutate_payload(&self, payload: &str, field: &str, _rng: &mut R) -> String {
        just_replace(payload, field, JsonValue::Null)
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomStringMutator;

impl<R: Rng + ?Sized> Mutator<R> for RandomStringMutator {
    fn name(&self) -> &'static str {
        "RandomStringMutator"
    }

    fn description(&self) -> &'static str {
        "replace field with random unicode strings"
    }

    fn mutate_payload(&self, payload: &str, field: &str, rng: &mut R) -> String {
        let len = rng.random_range(0..RANDOM_STRING_BOUND);
        let value = random_chars(rng, len, |rng| {
            char::from_u32(rng.random_range(0x20u32..0xD7FF)).unwrap_or('?')
        });
        just_replace(payload, field, JsonValue::String(value))
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNumberMutator;

impl<R: Rng + ?Sized> Mutator<R> for RandomNumberMutator {
    fn name(&self) -> &'static str {
        "RandomNumberMutator"
    }

    fn description(&self) -> &'static str {
        "replace field with random long numbers"
    }

    fn mutate_payload(&self, payload: &str, field: &str, rng: &mut R) -> String {
        let len = rng.random_range(1..RANDOM_STRING_BOUND);
        let digits = random_chars(rng, len, |rng| char::from(b'0' + rng.random_range(0u8..10)));
        just_replace(payload, field, JsonValue::String(digits))
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RemoveFieldMutator;

impl<R: Rng + ?Sized> Mutator<R> for RemoveFieldMutator {
    fn name(&self) -> &'static str {
        "RemoveFieldMutator"
    }

    fn description(&self) -> &'static str {
        "remove field from the body"
    }

    fn mutate_payload(&self, payload: &str, field: &str, _rng: &mut R) -> String {
        remove_field(payload, field)
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomControlCharsMutator;

impl<R: Rng + ?Sized> Mutator<R> for RandomControlCharsMutator {
    fn name(&self) -> &'static str {
        "RandomControlCharsMutator"
    }

    fn description(&self) -> &'static str {
        "replace field with random control chars"
    }

    fn mutate_payload(&self, payload: &str, field: &str, rng: &mut R) -> String {
        let value = random_chars(rng, CONTROL_CHARS_BOUND, |rng| {
            let code = if rng.random_bool(0.5) {
                rng.random_range(0u32..0x20)
            } else {
                rng.random_range(0x7Fu32..0xA0)
            };
            char::from_u32(code).unwrap_or('\u{0}')
        });
        just_replace(payload, field, JsonValue::String(value))
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomWhitespaceCharsMutator;

impl<R: Rng + ?Sized> Mutator<R> for RandomWhitespaceCharsMutator {
    fn name(&self) -> &'static str {
        "RandomWhitespaceCharsMutator"
    }

    fn description(&self) -> &'static str {
        "replace field with random whitespace chars"
    }

    fn mutate_payload(&self, payload: &str, field: &str, rng: &mut R) -> String {
        let value = random_chars(rng, WHITESPACE_CHARS_BOUND, |rng| {
            WHITESPACE_CHARS[rng.random_range(0..WHITESPACE_CHARS.len())]
        });
        just_replace(payload, field, JsonValue::String(value))
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomJsonMutator;

impl<R: Rng + ?Sized> Mutator<R> for RandomJsonMutator {
    fn name(&self) -> &'static str {
        "RandomJsonMutator"
    }

    fn description(&self) -> &'static str {
        "replace body with random invalid jsons"
    }

    fn mutate_payload(&self, _payload: &str, _field: &str, rng: &mut R) -> String {
        INVALID_JSONS[rng.random_range(0..INVALID_JSONS.len())].to_string()
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], _rng: &mut R) -> Vec<DochiaHeader> {
        headers.to_vec()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RandomContentTypeHeaderMutator;

impl<R: Rng + ?Sized> Mutator<R> for RandomContentTypeHeaderMutator {
    fn name(&self) -> &'static str {
        "RandomContentTypeHeaderMutator"
    }

    fn description(&self) -> &'static str {
        "replace the content type header with random unsupported media types"
    }

    fn mutate_payload(&self, payload: &str, _field: &str, _rng: &mut R) -> String {
        payload.to_string()
    }

    fn mutate_headers(&self, headers: &[DochiaHeader], rng: &mut R) -> Vec<DochiaHeader> {
        let media_type = UNSUPPORTED_MEDIA_TYPES[rng.random_range(0..UNSUPPORTED_MEDIA_TYPES.len())];
        let mut mutated: Vec<DochiaHeader> = headers
            .iter()
            .filter(|h| !h.name.eq_ignore_ascii_case("content-type"))
            .cloned()
            .collect();
        mutated.push(DochiaHeader::new("Content-Type", media_type, false));
        mutated
    }
}

/// Every built-in mutator.
pub fn builtin_mutators<R: Rng + ?Sized>() -> Vec<Box<dyn Mutator<R>>> {
    vec![
        Box::new(JsonValueMutator::default()),
        Box::new(NullStringMutator),
        Box::new(RandomStringMutator),
        Box::new(RandomNumberMutator),
        Box::new(RemoveFieldMutator),
        Box::new(RandomControlCharsMutator),
        Box::new(RandomWhitespaceCharsMutator),
        Box::new(RandomJsonMutator),
        Box::new(RandomContentTypeHeaderMutator),
    ]
}
