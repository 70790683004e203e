use dochia_core::error::TransportError;
use dochia_core::http::{HttpMethod, HttpResponse, ServiceCaller, ServiceData, is_authentication_header};
use dochia_core::model::DOCHIA_REMOVE_FIELD;
use dochia_core::strategy::{FuzzingStrategy, as_text, is_field_in_json, remove_field, replace_field};
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Blocking HTTP transport for the service under test.
pub struct HttpServiceCaller {
    client: Client,
    server: String,
    timeout_ms: u64,
    user_headers: Vec<(String, String)>,
    ref_data: BTreeMap<String, BTreeMap<String, String>>,
}

impl HttpServiceCaller {
    pub fn new(server: &str, timeout_ms: u64) -> Result<Self, anyhow::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self {
            client,
            server: server.trim_end_matches('/').to_string(),
            timeout_ms,
            user_headers: Vec::new(),
            ref_data: BTreeMap::new(),
        })
    }

    /// Headers supplied with `-H` or `[files] headers`.
    pub fn with_user_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.user_headers = headers.into_iter().collect();
        self
    }

    /// Reference data keyed by contract path, then by field name.
    pub fn with_ref_data(mut self, ref_data: BTreeMap<String, BTreeMap<String, String>>) -> Self {
        self.ref_data = ref_data;
        self
    }

    fn url(&self, data: &ServiceData) -> Result<String, TransportError> {
        let mut url = format!("{}{}", self.server, data.resolved_path());
        if !data.http_method.requires_body() {
            let query = query_string(&data.payload, &data.query_params);
            if !query.is_empty() {
                url.push('?');
                url.push_str(&query);
            }
        }
        reqwest::Url::parse(&url)
            .map(|u| u.to_string())
            .map_err(|_| TransportError::InvalidUrl(url))
    }

    fn payload(&self, data: &ServiceData) -> String {
        if !data.replace_ref_data || !data.valid_json {
            return data.payload.clone();
        }
        let Some(ref_data) = self.ref_data.get(&data.contract_path) else {
            return data.payload.clone();
        };
        let mut payload = data.payload.clone();
        for (field, value) in ref_data {
            if !is_field_in_json(&payload, field) {
                continue;
            }
            payload = if value.eq_ignore_ascii_case(DOCHIA_REMOVE_FIELD) {
                remove_field(&payload, field)
            } else {
                replace_field(&payload, field, &FuzzingStrategy::replace().with_data(value.as_str())).json
            };
        }
        payload
    }

    fn headers(&self, data: &ServiceData) -> Result<HeaderMap, TransportError> {
        let mut pairs: Vec<(String, String)> = data
            .headers
            .iter()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect();

        for (name, value) in &self.user_headers {
            let fuzzed = data.fuzzed_headers.iter().any(|f| f.eq_ignore_ascii_case(name));
            let wanted = data.add_user_headers || is_authentication_header(name);
            if wanted && !fuzzed {
                pairs.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
                pairs.push((name.clone(), value.clone()));
            }
        }
        pairs.retain(|(name, _)| !data.skipped_headers.iter().any(|s| s.eq_ignore_ascii_case(name)));

        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Other(format!("Invalid header name [{name}]: {e}")))?;
            let header_value = HeaderValue::from_bytes(value.as_bytes())
                .map_err(|e| TransportError::Other(format!("Invalid value for header [{name}]: {e}")))?;
            headers.append(header_name, header_value);
        }
        if data.http_method.requires_body() {
            if !headers.contains_key(CONTENT_TYPE) {
                let content_type = HeaderValue::from_str(&data.content_type)
                    .map_err(|e| TransportError::Other(format!("Invalid content type: {e}")))?;
                headers.insert(CONTENT_TYPE, content_type);
            }
        } else {
            headers.remove(CONTENT_TYPE);
        }
        Ok(headers)
    }

    fn map_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout_ms)
        } else if err.is_connect() {
            TransportError::Connection(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidUrl(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

impl ServiceCaller for HttpServiceCaller {
    fn call(&mut self, data: &ServiceData) -> Result<HttpResponse, TransportError> {
        let url = self.url(data)?;
        let headers = self.headers(data)?;
        let method = reqwest::Method::from_bytes(data.http_method.as_str().as_bytes())
            .map_err(|e| TransportError::Other(e.to_string()))?;
        debug!(method = %data.http_method, url = %url, "Calling service");

        let mut request = self.client.request(method, &url).headers(headers);
        if data.http_method.requires_body() {
            request = request.body(self.payload(data));
        }

        let started = Instant::now();
        let response = request.send().map_err(|e| self.map_error(e))?;
        let code = response.status().as_u16();
        let response_headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| (name.to_string(), String::from_utf8_lossy(value.as_bytes()).into_owned()))
            .collect();
        let body = response.text().unwrap_or_else(|e| {
            warn!(url = %url, error = %e, "Could not read response body");
            String::new()
        });
        let elapsed = started.elapsed().as_millis() as u64;

        Ok(HttpResponse::from_exchange(code, body, response_headers, data.http_method, &data.relative_path)
            .with_response_time(elapsed))
    }
}

/// Query string for body-less methods: top-level payload fields, restricted
/// to `query_params` when the operation declares them.
fn query_string(payload: &str, query_params: &[String]) -> String {
    let Ok(JsonValue::Object(fields)) = serde_json::from_str::<JsonValue>(payload) else {
        return String::new();
    };
    let Ok(mut url) = reqwest::Url::parse("http://localhost") else {
        return String::new();
    };
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in &fields {
            if query_params.is_empty() || query_params.contains(name) {
                pairs.append_pair(name, &as_text(value));
            }
        }
    }
    url.query().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dochia_core::http::DochiaHeader;
    use dochia_core::model::PlaybookData;

    fn caller() -> HttpServiceCaller {
        HttpServiceCaller::new("http://localhost:8080/", 1000)
            .unwrap()
            .with_user_headers([
                ("Authorization".to_string(), "Bearer t".to_string()),
                ("X-Tenant".to_string(), "acme".to_string()),
            ])
    }

    fn get_pet() -> ServiceData {
        let mut data = PlaybookData::new("/pets/{id}", HttpMethod::Get);
        data.path_params_payload = r#"{"id":7}"#.to_string();
        data.payload = r#"{"verbose":true,"limit":5}"#.to_string();
        data.headers = vec![DochiaHeader::new("Content-Type", "application/json", false)];
        ServiceData::for_playbook_data(&data)
    }

    #[test]
    fn path_params_and_query_are_filled_for_gets() {
        let url = caller().url(&get_pet()).unwrap();
        assert_eq!(url, "http://localhost:8080/pets/7?verbose=true&limit=5");

        let mut declared = get_pet();
        declared.query_params = vec!["limit".to_string()];
        assert_eq!(caller().url(&declared).unwrap(), "http://localhost:8080/pets/7?limit=5");

        let mut raw = get_pet();
        raw.replace_url_params = false;
        raw.payload = "{}".to_string();
        assert!(caller().url(&raw).unwrap().contains("/pets/%7Bid%7D"));
    }

    #[test]
    fn content_type_is_dropped_for_bodyless_methods() {
        let headers = caller().headers(&get_pet()).unwrap();
        assert!(headers.get(CONTENT_TYPE).is_none());
        assert_eq!(headers.get("x-tenant").unwrap(), "acme");
    }

    #[test]
    fn auth_user_headers_survive_opt_out_unless_fuzzed() {
        let mut data = get_pet();
        data.add_user_headers = false;
        let headers = caller().headers(&data).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer t");
        assert!(headers.get("x-tenant").is_none());

        data.headers.push(DochiaHeader::new("Authorization", "", false));
        data.fuzzed_headers = vec!["Authorization".to_string()];
        let headers = caller().headers(&data).unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "");
    }

    #[test]
    fn skipped_headers_are_removed() {
        let mut data = get_pet();
        data.skipped_headers = vec!["x-tenant".to_string()];
        assert!(caller().headers(&data).unwrap().get("x-tenant").is_none());
    }

    #[test]
    fn ref_data_replaces_or_removes_payload_fields() {
        let mut data = PlaybookData::new("/pets", HttpMethod::Post);
        data.payload = r#"{"name":"rex","owner":"ann","age":3}"#.to_string();
        let service_data = ServiceData::for_playbook_data(&data);
        let ref_data = BTreeMap::from([(
            "/pets".to_string(),
            BTreeMap::from([
                ("owner".to_string(), "bob".to_string()),
                ("age".to_string(), DOCHIA_REMOVE_FIELD.to_string()),
                ("missing".to_string(), "x".to_string()),
            ]),
        )]);
        let caller = caller().with_ref_data(ref_data);
        assert_eq!(caller.payload(&service_data), r#"{"name":"rex","owner":"bob"}"#);

        let mut untouched = service_data.clone();
        untouched.replace_ref_data = false;
        assert_eq!(caller.payload(&untouched), data.payload);
    }

    #[test]
    fn unreachable_services_are_transport_errors() {
        let mut caller = HttpServiceCaller::new("http://127.0.0.1:9", 500).unwrap();
        let err = caller.call(&get_pet()).unwrap_err();
        assert!(err.is_io());
    }
}
