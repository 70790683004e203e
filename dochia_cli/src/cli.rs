use clap::Parser;
use dochia_core::config::{EdgeSpacesStrategy, RunConfig, SanitizationStrategy};
use dochia_core::http::HttpMethod;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Negative and boundary testing for HTTP APIs", long_about = None)]
pub struct Cli {
    /// TOML configuration file; `dochia.toml` is used when present.
    #[clap(short, long, value_parser)]
    pub config_file: Option<PathBuf>,
    /// Operations file compiled from the API contract.
    #[clap(long, value_parser)]
    pub contract: Option<PathBuf>,
    #[clap(short, long)]
    pub server: Option<String>,
    /// Request timeout in milliseconds.
    #[clap(long)]
    pub timeout: Option<u64>,
    #[clap(long)]
    pub log_level: Option<String>,
    #[clap(long)]
    pub list_playbooks: bool,

    #[clap(long, value_delimiter = ',')]
    pub playbooks: Vec<String>,
    #[clap(long, value_delimiter = ',')]
    pub skip_playbooks: Vec<String>,
    #[clap(long, value_delimiter = ',')]
    pub paths: Vec<String>,
    #[clap(long, value_delimiter = ',')]
    pub skip_paths: Vec<String>,
    #[clap(long, value_delimiter = ',')]
    pub http_methods: Vec<HttpMethod>,
    #[clap(long, value_delimiter = ',')]
    pub skip_http_methods: Vec<HttpMethod>,
    #[clap(long)]
    pub check_headers: bool,
    #[clap(long)]
    pub check_fields: bool,
    #[clap(long)]
    pub check_body: bool,
    #[clap(long)]
    pub include_emojis: Option<bool>,
    #[clap(long, value_delimiter = ',')]
    pub skip_headers: Vec<String>,

    #[clap(long, value_parser = parse_edge_spaces_strategy)]
    pub edge_spaces_strategy: Option<EdgeSpacesStrategy>,
    #[clap(long, value_parser = parse_sanitization_strategy)]
    pub sanitization_strategy: Option<SanitizationStrategy>,
    #[clap(long)]
    pub seed: Option<u64>,
    #[clap(long)]
    pub stop_after_mutations: Option<u64>,
    #[clap(long)]
    pub stop_after_errors: Option<u64>,

    /// Match response codes, e.g. `500,4xx`.
    #[clap(long = "mc", value_delimiter = ',')]
    pub match_codes: Vec<String>,
    #[clap(long = "ms", value_delimiter = ',')]
    pub match_sizes: Vec<u64>,
    #[clap(long = "mw", value_delimiter = ',')]
    pub match_words: Vec<u64>,
    #[clap(long = "ml", value_delimiter = ',')]
    pub match_lines: Vec<u64>,
    #[clap(long = "mr")]
    pub match_regex: Option<String>,
    /// Match responses reflecting the fuzzed input.
    #[clap(long = "mi")]
    pub match_input: bool,

    #[clap(long, value_delimiter = ',')]
    pub ignore_codes: Vec<String>,
    #[clap(long, value_delimiter = ',')]
    pub filter_codes: Vec<String>,
    #[clap(long)]
    pub blackbox: bool,
    #[clap(long, value_delimiter = ',')]
    pub ignore_size: Vec<u64>,
    #[clap(long, value_delimiter = ',')]
    pub filter_size: Vec<u64>,
    #[clap(long, value_delimiter = ',')]
    pub ignore_words: Vec<u64>,
    #[clap(long, value_delimiter = ',')]
    pub filter_words: Vec<u64>,
    #[clap(long, value_delimiter = ',')]
    pub ignore_lines: Vec<u64>,
    #[clap(long, value_delimiter = ',')]
    pub filter_lines: Vec<u64>,
    #[clap(long)]
    pub ignore_regex: Option<String>,
    #[clap(long)]
    pub filter_regex: Option<String>,

    #[clap(long)]
    pub hide_success: bool,
    #[clap(long)]
    pub hide_warnings: bool,
    #[clap(long)]
    pub max_response_time: Option<u64>,
    #[clap(long)]
    pub check_update: bool,
    /// Endpoint answering `{"version": ".."}` or `{"tag_name": ".."}`.
    #[clap(long)]
    pub release_url: Option<String>,
    /// File listing contract paths in the order they should run.
    #[clap(long, value_parser)]
    pub paths_order: Option<PathBuf>,
    /// Extra request header, `name=value`. Repeatable.
    #[clap(short = 'H', long = "header", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,
}

fn parse_edge_spaces_strategy(value: &str) -> Result<EdgeSpacesStrategy, String> {
    match value.to_ascii_lowercase().replace('_', "-").as_str() {
        "trim-and-validate" => Ok(EdgeSpacesStrategy::TrimAndValidate),
        "validate-and-trim" => Ok(EdgeSpacesStrategy::ValidateAndTrim),
        other => Err(format!("unknown edge spaces strategy [{other}]")),
    }
}

fn parse_sanitization_strategy(value: &str) -> Result<SanitizationStrategy, String> {
    match value.to_ascii_lowercase().replace('_', "-").as_str() {
        "sanitize-and-validate" => Ok(SanitizationStrategy::SanitizeAndValidate),
        "validate-and-sanitize" => Ok(SanitizationStrategy::ValidateAndSanitize),
        other => Err(format!("unknown sanitization strategy [{other}]")),
    }
}

fn parse_header(value: &str) -> Result<(String, String), String> {
    let (name, header_value) = value
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got [{value}]"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("header name missing in [{value}]"));
    }
    Ok((name.to_string(), header_value.trim().to_string()))
}

fn override_list<T: Clone>(target: &mut Vec<T>, supplied: &[T]) {
    if !supplied.is_empty() {
        *target = supplied.to_vec();
    }
}

impl Cli {
    /// Layers the command line over `config`. Lists replace the file values
    /// when supplied; switches only ever turn things on.
    pub fn apply_to(&self, config: &mut RunConfig) {
        if let Some(server) = &self.server {
            config.api.server = Some(server.clone());
        }
        if let Some(timeout) = self.timeout {
            config.api.timeout_ms = timeout;
        }

        let filter = &mut config.filter;
        override_list(&mut filter.playbooks, &self.playbooks);
        override_list(&mut filter.skip_playbooks, &self.skip_playbooks);
        override_list(&mut filter.paths, &self.paths);
        override_list(&mut filter.skip_paths, &self.skip_paths);
        override_list(&mut filter.http_methods, &self.http_methods);
        override_list(&mut filter.skip_http_methods, &self.skip_http_methods);
        override_list(&mut filter.skip_headers, &self.skip_headers);
        filter.check_headers |= self.check_headers;
        filter.check_fields |= self.check_fields;
        filter.check_body |= self.check_body;
        if let Some(include_emojis) = self.include_emojis {
            filter.include_emojis = include_emojis;
        }

        let processing = &mut config.processing;
        if let Some(strategy) = self.edge_spaces_strategy {
            processing.edge_spaces_strategy = strategy;
        }
        if let Some(strategy) = self.sanitization_strategy {
            processing.sanitization_strategy = strategy;
        }
        if self.seed.is_some() {
            processing.random_seed = self.seed;
        }
        if let Some(mutations) = self.stop_after_mutations {
            processing.stop_after_mutations = mutations;
        }
        if let Some(errors) = self.stop_after_errors {
            processing.stop_after_errors = errors;
        }

        let matching = &mut config.matching;
        override_list(&mut matching.codes, &self.match_codes);
        override_list(&mut matching.sizes, &self.match_sizes);
        override_list(&mut matching.words, &self.match_words);
        override_list(&mut matching.lines, &self.match_lines);
        if self.match_regex.is_some() {
            matching.regex = self.match_regex.clone();
        }
        matching.input |= self.match_input;

        let ignore = &mut config.ignore;
        override_list(&mut ignore.codes, &self.ignore_codes);
        override_list(&mut ignore.filter_codes, &self.filter_codes);
        override_list(&mut ignore.sizes, &self.ignore_size);
        override_list(&mut ignore.filter_sizes, &self.filter_size);
        override_list(&mut ignore.words, &self.ignore_words);
        override_list(&mut ignore.filter_words, &self.filter_words);
        override_list(&mut ignore.lines, &self.ignore_lines);
        override_list(&mut ignore.filter_lines, &self.filter_lines);
        if self.ignore_regex.is_some() {
            ignore.regex = self.ignore_regex.clone();
        }
        if self.filter_regex.is_some() {
            ignore.filter_regex = self.filter_regex.clone();
        }
        ignore.blackbox |= self.blackbox;

        let reporting = &mut config.reporting;
        reporting.hide_success |= self.hide_success;
        reporting.hide_warnings |= self.hide_warnings;
        if let Some(max) = self.max_response_time {
            reporting.max_response_time_ms = max;
        }
        reporting.check_update |= self.check_update;

        let files = &mut config.files;
        if self.contract.is_some() {
            files.contract = self.contract.clone();
        }
        if self.paths_order.is_some() {
            files.paths_order = self.paths_order.clone();
        }
        for (name, value) in &self.headers {
            files.headers.insert(name.clone(), value.clone());
        }
    }
}
