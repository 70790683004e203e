use crate::http::{DochiaHeader, HttpMethod};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// Reference-data marker for fields that must never be fuzzed.
pub const DOCHIA_REMOVE_FIELD: &str = "dochia_remove_field";

/// Separator used in nested field paths, e.g. `address#street`.
pub const FIELD_SEPARATOR: char = '#';

pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RequestField {
    pub name: String,
    #[serde(default = "default_field_type", rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub max_length: Option<usize>,
}

fn default_field_type() -> String {
    "string".to_string()
}

impl RequestField {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            format: None,
            required: false,
            max_length: None,
        }
    }

    pub fn is_string(&self) -> bool {
        self.field_type.eq_ignore_ascii_case("string")
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self.field_type.as_str(), "object" | "array")
    }
}

/// The resolved request template for one (path, HTTP method) pair.
///
/// Built once per operation when the operations file is loaded and read-only
/// afterwards; playbooks and executors derive new requests from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PlaybookData {
    pub path: String,
    #[serde(default)]
    pub contract_path: String,
    pub method: HttpMethod,
    #[serde(default = "default_payload")]
    pub payload: String,
    #[serde(default)]
    pub headers: Vec<DochiaHeader>,
    #[serde(default)]
    pub query_params: Vec<String>,
    #[serde(default = "default_payload")]
    pub path_params_payload: String,
    #[serde(default)]
    pub fields: Vec<RequestField>,
    /// Documented response codes, e.g. `200`, `404`, `4XX`.
    #[serde(default)]
    pub response_codes: Vec<String>,
    /// Documented response property names keyed by response code.
    #[serde(default)]
    pub responses: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub response_headers: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub response_content_types: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub request_content_types: Vec<String>,
    #[serde(default)]
    pub ref_data: BTreeMap<String, String>,
    /// Every HTTP method documented for `contract_path`, this one included.
    #[serde(default)]
    pub path_methods: Vec<HttpMethod>,
}

fn default_payload() -> String {
    "{}".to_string()
}

impl PlaybookData {
    pub fn new(path: impl Into<String>, method: HttpMethod) -> Self {
        let path = path.into();
        Self {
            contract_path: path.clone(),
            path,
            method,
            payload: default_payload(),
            headers: Vec::new(),
            query_params: Vec::new(),
            path_params_payload: default_payload(),
            fields: Vec::new(),
            response_codes: Vec::new(),
            responses: BTreeMap::new(),
            response_headers: BTreeMap::new(),
            response_content_types: BTreeMap::new(),
            request_content_types: Vec::new(),
            ref_data: BTreeMap::new(),
            path_methods: vec![method],
        }
    }

    /// Declared fields in insertion order, or the flattened payload keys when
    /// the operation declares none.
    pub fn all_fields(&self) -> Vec<String> {
        if !self.fields.is_empty() {
            return self.fields.iter().map(|f| f.name.clone()).collect();
        }
        match serde_json::from_str::<JsonValue>(&self.payload) {
            Ok(JsonValue::Object(map)) => {
                let mut out = Vec::new();
                flatten_keys(&map, "", &mut out);
                out
            }
            _ => Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&RequestField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields flagged in reference data with [`DOCHIA_REMOVE_FIELD`].
    pub fn fields_marked_for_removal(&self) -> Vec<&str> {
        self.ref_data
            .iter()
            .filter(|(_, value)| value.eq_ignore_ascii_case(DOCHIA_REMOVE_FIELD))
            .map(|(key, _)| key.as_str())
            .collect()
    }

    pub fn is_method_documented(&self, method: HttpMethod) -> bool {
        self.method == method || self.path_methods.contains(&method)
    }

    pub fn first_request_content_type(&self) -> String {
        self.request_content_types
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string())
    }

    pub fn required_headers(&self) -> impl Iterator<Item = &DochiaHeader> {
        self.headers.iter().filter(|h| h.required)
    }

    /// Content types documented for the given response code, falling back to
    /// the range form (`4XX`) and then to `default`.
    pub fn content_types_for(&self, code: &str) -> Option<&Vec<String>> {
        let range = code_range(code);
        self.response_content_types
            .get(code)
            .or_else(|| self.response_content_types.get(&range))
            .or_else(|| self.response_content_types.get("default"))
    }

    pub fn response_properties_for(&self, code: &str) -> Option<&Vec<String>> {
        let range = code_range(code);
        self.responses
            .get(code)
            .or_else(|| self.responses.get(&range))
            .or_else(|| self.responses.get("default"))
    }

    pub fn is_code_documented(&self, code: &str) -> bool {
        let range = code_range(code);
        self.response_codes
            .iter()
            .any(|c| c == code || c.eq_ignore_ascii_case(&range))
    }
}

fn code_range(code: &str) -> String {
    match code.chars().next() {
        Some(first) => format!("{first}XX"),
        None => String::new(),
    }
}

fn flatten_keys(map: &Map<String, JsonValue>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let name = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}{FIELD_SEPARATOR}{key}")
        };
        out.push(name.clone());
        match value {
            JsonValue::Object(child) => flatten_keys(child, &name, out),
            JsonValue::Array(items) => {
                if let Some(JsonValue::Object(child)) = items.first() {
                    flatten_keys(child, &name, out);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_fields_flattens_payload_in_insertion_order() {
        let mut data = PlaybookData::new("/pets", HttpMethod::Post);
        data.payload =
            r#"{"name":"rex","owner":{"id":1,"tags":[{"v":"a"}]},"age":3}"#.to_string();
        assert_eq!(
            data.all_fields(),
            vec!["name", "owner", "owner#id", "owner#tags", "owner#tags#v", "age"]
        );
    }

    #[test]
    fn declared_fields_take_precedence_over_payload() {
        let mut data = PlaybookData::new("/pets", HttpMethod::Post);
        data.payload = r#"{"x":1}"#.to_string();
        data.fields = vec![RequestField::new("b", "string"), RequestField::new("a", "integer")];
        assert_eq!(data.all_fields(), vec!["b", "a"]);
    }

    #[test]
    fn remove_marker_is_case_insensitive() {
        let mut data = PlaybookData::new("/pets", HttpMethod::Post);
        data.ref_data.insert("id".into(), "DOCHIA_REMOVE_FIELD".into());
        data.ref_data.insert("name".into(), "rex".into());
        assert_eq!(data.fields_marked_for_removal(), vec!["id"]);
    }

    #[test]
    fn documented_codes_fall_back_to_ranges() {
        let mut data = PlaybookData::new("/pets", HttpMethod::Get);
        data.response_codes = vec!["200".into(), "4XX".into()];
        assert!(data.is_code_documented("200"));
        assert!(data.is_code_documented("422"));
        assert!(!data.is_code_documented("500"));
        assert_eq!(data.first_request_content_type(), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn playbook_data_deserializes_with_defaults() {
        let data: PlaybookData =
            serde_json::from_str(r#"{"path":"/pets/{id}","method":"GET"}"#).unwrap();
        assert_eq!(data.payload, "{}");
        assert!(data.headers.is_empty());
        assert_eq!(data.method, HttpMethod::Get);
    }
}
