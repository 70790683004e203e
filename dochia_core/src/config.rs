use crate::http::HttpMethod;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeSpacesStrategy {
    #[default]
    TrimAndValidate,
    ValidateAndTrim,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SanitizationStrategy {
    #[default]
    SanitizeAndValidate,
    ValidateAndSanitize,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FilterSettings {
    #[serde(default)]
    pub playbooks: Vec<String>,
    #[serde(default)]
    pub skip_playbooks: Vec<String>,
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub skip_paths: Vec<String>,
    #[serde(default = "default_http_methods")]
    pub http_methods: Vec<HttpMethod>,
    #[serde(default)]
    pub skip_http_methods: Vec<HttpMethod>,
    #[serde(default)]
    pub check_headers: bool,
    #[serde(default)]
    pub check_fields: bool,
    #[serde(default)]
    pub check_body: bool,
    #[serde(default = "default_true")]
    pub include_emojis: bool,
    #[serde(default)]
    pub skip_headers: Vec<String>,
}

fn default_http_methods() -> Vec<HttpMethod> {
    HttpMethod::rest_methods()
}

fn default_true() -> bool {
    true
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            playbooks: Vec::new(),
            skip_playbooks: Vec::new(),
            paths: Vec::new(),
            skip_paths: Vec::new(),
            http_methods: default_http_methods(),
            skip_http_methods: Vec::new(),
            check_headers: false,
            check_fields: false,
            check_body: false,
            include_emojis: true,
            skip_headers: Vec::new(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ProcessingSettings {
    #[serde(default)]
    pub edge_spaces_strategy: EdgeSpacesStrategy,
    #[serde(default)]
    pub sanitization_strategy: SanitizationStrategy,
    #[serde(default = "default_large_strings_size")]
    pub large_strings_size: usize,
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Upper bound on mutations sent by the random playbook for one operation.
    #[serde(default = "default_stop_after_mutations")]
    pub stop_after_mutations: u64,
    /// Stops the random playbook after this many errors; 0 disables the check.
    #[serde(default)]
    pub stop_after_errors: u64,
}

pub fn default_large_strings_size() -> usize {
    40_000
}

pub fn default_stop_after_mutations() -> u64 {
    100
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            edge_spaces_strategy: EdgeSpacesStrategy::default(),
            sanitization_strategy: SanitizationStrategy::default(),
            large_strings_size: default_large_strings_size(),
            random_seed: None,
            stop_after_mutations: default_stop_after_mutations(),
            stop_after_errors: 0,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MatchSettings {
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<u64>,
    #[serde(default)]
    pub words: Vec<u64>,
    #[serde(default)]
    pub lines: Vec<u64>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub input: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct IgnoreSettings {
    #[serde(default)]
    pub codes: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<u64>,
    #[serde(default)]
    pub words: Vec<u64>,
    #[serde(default)]
    pub lines: Vec<u64>,
    #[serde(default)]
    pub regex: Option<String>,
    #[serde(default)]
    pub filter_codes: Vec<String>,
    #[serde(default)]
    pub filter_sizes: Vec<u64>,
    #[serde(default)]
    pub filter_words: Vec<u64>,
    #[serde(default)]
    pub filter_lines: Vec<u64>,
    #[serde(default)]
    pub filter_regex: Option<String>,
    /// Filters 2XX, 4XX and 501 responses, leaving only server errors reported.
    #[serde(default)]
    pub blackbox: bool,
    #[serde(default)]
    pub ignore_undocumented: bool,
    #[serde(default)]
    pub ignore_body_validation: bool,
    #[serde(default)]
    pub ignore_content_type: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ReportingSettings {
    #[serde(default)]
    pub hide_success: bool,
    #[serde(default)]
    pub hide_warnings: bool,
    /// Responses slower than this are reported as errors; 0 disables the check.
    #[serde(default)]
    pub max_response_time_ms: u64,
    #[serde(default)]
    pub check_update: bool,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct FilesSettings {
    pub contract: Option<PathBuf>,
    pub paths_order: Option<PathBuf>,
    /// Per-playbook expected codes, e.g. `EmptyStringsInFields = "400,422"`.
    #[serde(default)]
    pub expected_response_codes: BTreeMap<String, String>,
    /// Headers added to every request unless a playbook opts out.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Reference data keyed by path, then by field name.
    #[serde(default)]
    pub ref_data: BTreeMap<String, BTreeMap<String, String>>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ApiSettings {
    pub server: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            server: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// Complete run configuration. Immutable once the run starts.
#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub filter: FilterSettings,
    #[serde(default)]
    pub processing: ProcessingSettings,
    #[serde(default)]
    pub matching: MatchSettings,
    #[serde(default)]
    pub ignore: IgnoreSettings,
    #[serde(default)]
    pub reporting: ReportingSettings,
    #[serde(default)]
    pub files: FilesSettings,
}

impl RunConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: RunConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }

    /// HTTP methods to run: the configured ones minus the skipped ones.
    pub fn effective_http_methods(&self) -> Vec<HttpMethod> {
        self.filter
            .http_methods
            .iter()
            .copied()
            .filter(|m| !self.filter.skip_http_methods.contains(m))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn empty_file_yields_defaults() {
        let file = NamedTempFile::new().unwrap();
        let config = RunConfig::load_from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config, RunConfig::default());
        assert!(config.filter.include_emojis);
        assert_eq!(config.filter.http_methods.len(), 7);
        assert_eq!(config.processing.edge_spaces_strategy, EdgeSpacesStrategy::TrimAndValidate);
    }

    #[test]
    fn sections_are_parsed_in_kebab_case() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
server = "http://localhost:8080"

[filter]
playbooks = ["Headers"]
skip-http-methods = ["DELETE"]
check-headers = true

[processing]
edge-spaces-strategy = "validate-and-trim"
random-seed = 7

[ignore]
filter-codes = ["4xx"]

[files]
expected-response-codes = {{ EmptyStringsInFields = "400,422" }}
headers = {{ Authorization = "Bearer x" }}
"#
        )
        .unwrap();

        let config = RunConfig::load_from_file(&file.path().to_path_buf()).unwrap();
        assert_eq!(config.api.server.as_deref(), Some("http://localhost:8080"));
        assert!(config.filter.check_headers);
        assert_eq!(config.processing.edge_spaces_strategy, EdgeSpacesStrategy::ValidateAndTrim);
        assert_eq!(config.processing.random_seed, Some(7));
        assert_eq!(config.ignore.filter_codes, vec!["4xx"]);
        assert_eq!(
            config.files.expected_response_codes.get("EmptyStringsInFields").map(String::as_str),
            Some("400,422")
        );
        assert!(!config.effective_http_methods().contains(&HttpMethod::Delete));
        assert_eq!(config.effective_http_methods().len(), 6);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[filter]\nplaybookz = [\"x\"]").unwrap();
        let err = RunConfig::load_from_file(&file.path().to_path_buf()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML"));
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let path = PathBuf::from("/definitely/not/here.toml");
        let err = RunConfig::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
