use crate::error::{ConfigError, TransportError};
use crate::model::PlaybookData;
use crate::strategy::as_text;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;

/// Header name fragments that identify authentication headers.
const AUTH_HEADERS: [&str; 14] = [
    "authorization",
    "jwt",
    "api-key",
    "api_key",
    "apikey",
    "secret",
    "secret-key",
    "secret_key",
    "api-secret",
    "api_secret",
    "apisecret",
    "api-token",
    "api_token",
    "apitoken",
];

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Trace,
}

impl HttpMethod {
    pub fn rest_methods() -> Vec<HttpMethod> {
        vec![
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Get,
            HttpMethod::Patch,
            HttpMethod::Delete,
            HttpMethod::Head,
            HttpMethod::Trace,
        ]
    }

    pub fn requires_body(&self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Trace => "TRACE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "TRACE" => Ok(HttpMethod::Trace),
            _ => Err(ConfigError::InvalidHttpMethod(s.to_string())),
        }
    }
}

/// A request header as documented in the contract.
///
/// Headers are treated as values: fuzzing builds a new header with
/// [`DochiaHeader::with_value`] instead of mutating the documented one.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, Hash)]
pub struct DochiaHeader {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub required: bool,
}

impl DochiaHeader {
    pub fn new(name: impl Into<String>, value: impl Into<String>, required: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            required,
        }
    }

    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            value: value.into(),
            required: self.required,
        }
    }
}

impl PartialEq for DochiaHeader {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.value == other.value
    }
}

impl fmt::Display for DochiaHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

/// Returns true when the header name looks like it carries credentials.
pub fn is_authentication_header(name: &str) -> bool {
    let lowered = name.to_ascii_lowercase();
    AUTH_HEADERS.iter().any(|auth| lowered.contains(auth))
}

/// One response received from the service under test.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub response_code: u16,
    pub body: String,
    pub json_body: Option<JsonValue>,
    pub headers: Vec<(String, String)>,
    pub content_type: Option<String>,
    pub content_length_in_bytes: u64,
    pub number_of_words: u64,
    pub number_of_lines: u64,
    pub http_method: HttpMethod,
    pub path: String,
    pub response_time_ms: u64,
    pub fuzzed_field: Option<String>,
}

impl HttpResponse {
    /// Builds a response and computes its size, word and line counts once.
    pub fn from_exchange(
        response_code: u16,
        body: impl Into<String>,
        headers: Vec<(String, String)>,
        http_method: HttpMethod,
        path: impl Into<String>,
    ) -> Self {
        let body = body.into();
        let json_body = serde_json::from_str::<JsonValue>(&body).ok();
        let content_type = headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            .map(|(_, value)| value.clone());

        Self {
            response_code,
            content_length_in_bytes: body.len() as u64,
            number_of_words: body.split_whitespace().count() as u64,
            number_of_lines: count_lines(&body),
            json_body,
            body,
            headers,
            content_type,
            http_method,
            path: path.into(),
            response_time_ms: 0,
            fuzzed_field: None,
        }
    }

    pub fn with_response_time(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = response_time_ms;
        self
    }

    pub fn code_as_string(&self) -> String {
        self.response_code.to_string()
    }

    /// The range form of the response code, e.g. `4XX` for 404.
    pub fn code_as_range(&self) -> String {
        format!("{}XX", self.response_code / 100)
    }

    pub fn exceeds_response_time(&self, max_response_time_ms: u64) -> bool {
        max_response_time_ms > 0 && self.response_time_ms > max_response_time_ms
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn count_lines(body: &str) -> u64 {
    if body.is_empty() {
        return 0;
    }
    body.split(['\r', '\n']).count() as u64
}

/// Everything the transport needs to issue one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceData {
    pub relative_path: String,
    pub contract_path: String,
    pub headers: Vec<DochiaHeader>,
    pub payload: String,
    pub query_params: Vec<String>,
    pub http_method: HttpMethod,
    pub content_type: String,
    pub path_params_payload: String,
    pub replace_ref_data: bool,
    pub skipped_headers: Vec<String>,
    pub add_user_headers: bool,
    pub replace_url_params: bool,
    pub valid_json: bool,
    pub fuzzed_headers: Vec<String>,
    pub tested_fields: Vec<String>,
}

impl ServiceData {
    /// The unmodified request described by `data`.
    pub fn for_playbook_data(data: &PlaybookData) -> Self {
        Self {
            relative_path: data.path.clone(),
            contract_path: data.contract_path.clone(),
            headers: data.headers.clone(),
            payload: data.payload.clone(),
            query_params: data.query_params.clone(),
            http_method: data.method,
            content_type: data.first_request_content_type(),
            path_params_payload: data.path_params_payload.clone(),
            replace_ref_data: true,
            skipped_headers: Vec::new(),
            add_user_headers: true,
            replace_url_params: true,
            valid_json: true,
            fuzzed_headers: Vec::new(),
            tested_fields: Vec::new(),
        }
    }

    pub fn is_json_content_type(&self) -> bool {
        let lowered = self.content_type.to_ascii_lowercase();
        lowered.starts_with("application/") && lowered.contains("json")
    }

    /// The relative path with `{name}` placeholders filled from the path
    /// parameters payload, or the raw path when replacement is off.
    pub fn resolved_path(&self) -> String {
        if !self.replace_url_params {
            return self.relative_path.clone();
        }
        let Ok(JsonValue::Object(params)) = serde_json::from_str::<JsonValue>(&self.path_params_payload) else {
            return self.relative_path.clone();
        };
        params.iter().fold(self.relative_path.clone(), |path, (name, value)| {
            path.replace(&format!("{{{name}}}"), &as_text(value))
        })
    }
}

/// The capability to call the service under test.
///
/// Implementations block until a response or a transport failure is available.
pub trait ServiceCaller {
    fn call(&mut self, data: &ServiceData) -> Result<HttpResponse, TransportError>;

    fn is_authentication_header(&self, name: &str) -> bool {
        is_authentication_header(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolved_path_fills_placeholders_unless_disabled() {
        let mut data = PlaybookData::new("/owners/{owner}/pets/{id}", HttpMethod::Get);
        data.path_params_payload = r#"{"owner":"ann","id":7,"unused":true}"#.to_string();
        let mut service_data = ServiceData::for_playbook_data(&data);
        assert_eq!(service_data.resolved_path(), "/owners/ann/pets/7");

        service_data.replace_url_params = false;
        assert_eq!(service_data.resolved_path(), "/owners/{owner}/pets/{id}");
    }

    #[test]
    fn header_equality_ignores_required_flag() {
        let required = DochiaHeader::new("X-Id", "1", true);
        let optional = DochiaHeader::new("X-Id", "1", false);
        assert_eq!(required, optional);
        assert_ne!(required, required.with_value("2"));
        assert!(required.with_value("2").required);
    }

    #[test]
    fn response_counts_are_computed_once() {
        let response = HttpResponse::from_exchange(
            400,
            "{\"error\": \"bad\nrequest\"}",
            vec![("Content-Type".into(), "application/json".into())],
            HttpMethod::Post,
            "/pets",
        );
        assert_eq!(response.number_of_words, 3);
        assert_eq!(response.number_of_lines, 2);
        assert_eq!(response.content_length_in_bytes, 24);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.code_as_range(), "4XX");
        assert!(response.json_body.is_none());
    }

    #[test]
    fn empty_body_has_no_lines() {
        let response =
            HttpResponse::from_exchange(204, "", Vec::new(), HttpMethod::Delete, "/pets/1");
        assert_eq!(response.number_of_lines, 0);
        assert_eq!(response.number_of_words, 0);
    }

    #[test]
    fn authentication_headers_are_detected_by_name() {
        assert!(is_authentication_header("Authorization"));
        assert!(is_authentication_header("X-Api-Key"));
        assert!(is_authentication_header("X-Api-Token"));
        assert!(is_authentication_header("jwt"));
        assert!(!is_authentication_header("X-Request-Id"));
    }

    #[test]
    fn http_methods_parse_case_insensitively() {
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("FETCH".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::Put.requires_body());
        assert!(!HttpMethod::Head.requires_body());
    }
}
