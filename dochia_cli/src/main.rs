mod cli;
mod http_caller;
mod version;

use dochia_core::config::RunConfig;
use dochia_core::contract::{Contract, parse_paths_order};
use dochia_core::error::ConfigError;
use dochia_core::matching::IgnoreRules;
use dochia_core::orchestrator::{EXIT_FATAL_ERROR, EXIT_USAGE_ERROR, Orchestrator, exit_code_for_errors};
use dochia_core::playbook::PlaybookRegistry;
use dochia_core::report::TestCaseListener;
use dochia_core::response_code::ResponseCodeFamily;
use dochia_core::selector::Selector;

use crate::cli::Cli;
use crate::http_caller::HttpServiceCaller;
use crate::version::VersionCheck;
use clap::Parser;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "dochia.toml";
const VERSION_CHECK_WAIT: Duration = Duration::from_secs(2);

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => return ExitCode::from(parse_failure_exit_code(&err)),
    };
    init_logging(cli.log_level.as_deref());

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(EXIT_FATAL_ERROR)
        }
    }
}

/// Prints clap's message and picks the exit code: help and version output
/// succeed, anything else (or a failed write) is a usage error.
fn parse_failure_exit_code(err: &clap::Error) -> u8 {
    match err.print() {
        Ok(()) if !err.use_stderr() => 0,
        _ => EXIT_USAGE_ERROR,
    }
}

fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(cli: &Cli) -> Result<RunConfig, anyhow::Error> {
    let config = match &cli.config_file {
        Some(config_path) => {
            info!(path = ?config_path, "Loading configuration");
            RunConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                info!(path = ?default_config_path, "No config file specified, loading default");
                RunConfig::load_from_file(&default_config_path)?
            } else {
                debug!("No config file specified and no default found, using built-in defaults");
                RunConfig::default()
            }
        }
    };
    Ok(config)
}

fn load_contract(path: &Path) -> Result<Contract, anyhow::Error> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read contract file at {:?}: {}", path, e))?;
    Contract::from_json(&content).map_err(|e| anyhow::anyhow!("Failed to load contract {:?}: {}", path, e))
}

fn load_paths_order(path: Option<&PathBuf>) -> Result<Vec<String>, anyhow::Error> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read paths order file at {:?}: {}", path, e))?;
    Ok(parse_paths_order(&content))
}

fn expected_overrides(config: &RunConfig) -> Result<BTreeMap<String, ResponseCodeFamily>, ConfigError> {
    config
        .files
        .expected_response_codes
        .iter()
        .map(|(playbook, codes)| Ok((playbook.clone(), ResponseCodeFamily::from_code_list(codes)?)))
        .collect()
}

/// Reference data as merged into the contract, keyed by contract path.
fn ref_data_by_path(contract: &Contract) -> BTreeMap<String, BTreeMap<String, String>> {
    contract
        .contract_paths()
        .into_iter()
        .filter_map(|path| {
            let ref_data = contract.operations(&path).first()?.ref_data.clone();
            (!ref_data.is_empty()).then_some((path, ref_data))
        })
        .collect()
}

fn list_playbooks(selector: &Selector) {
    println!("{} registered playbooks:", selector.total_playbooks());
    for playbook in selector.registry().all() {
        let tags: Vec<&str> = playbook.tags.iter().map(|t| t.name()).collect();
        println!("  {:<40} [{}] {}", playbook.name, tags.join(", "), playbook.description);
    }
}

fn run(cli: &Cli) -> Result<u8, anyhow::Error> {
    let mut config = load_config(cli)?;
    cli.apply_to(&mut config);
    debug!(config = ?config, "Effective configuration");

    let selector = Selector::new(PlaybookRegistry::builtin(), &config);
    if cli.list_playbooks {
        list_playbooks(&selector);
        return Ok(0);
    }

    let version_check = match (&cli.release_url, config.reporting.check_update) {
        (Some(url), true) => Some(VersionCheck::spawn(
            env!("CARGO_PKG_VERSION"),
            url.clone(),
            VERSION_CHECK_WAIT,
        )),
        (None, true) => {
            warn!("check-update is enabled but no --release-url was supplied");
            None
        }
        _ => None,
    };

    let server = config
        .api
        .server
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No server supplied: use --server or [api] server"))?;
    let contract_file = config
        .files
        .contract
        .clone()
        .ok_or_else(|| anyhow::anyhow!("No contract supplied: use --contract or [files] contract"))?;
    let mut contract = load_contract(&contract_file)?;
    contract.merge_ref_data(&config.files.ref_data);
    let paths_order = load_paths_order(config.files.paths_order.as_ref())?;
    info!(operations = contract.len(), contract = ?contract_file, "Contract loaded");

    let ignore = IgnoreRules::from_settings(&config.ignore, &config.reporting)?;
    let mut listener = TestCaseListener::new(
        ignore,
        config.reporting.max_response_time_ms,
        expected_overrides(&config)?,
    );
    let mut caller = HttpServiceCaller::new(&server, config.api.timeout_ms)?
        .with_user_headers(config.files.headers.clone())
        .with_ref_data(ref_data_by_path(&contract));

    let orchestrator = Orchestrator::new(&selector, &config, paths_order)?;
    orchestrator.run(&contract, &mut caller, &mut listener);
    listener.log_summary();

    if let Some(check) = version_check {
        match check.collect(VERSION_CHECK_WAIT) {
            Some(result) if result.newer => {
                info!(latest = %result.latest, current = env!("CARGO_PKG_VERSION"), "A newer version is available")
            }
            Some(_) => debug!("Running the latest version"),
            None => debug!("Version check did not complete"),
        }
    }

    Ok(exit_code_for_errors(listener.statistics().total_errors()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn contract_files_load_with_ref_data() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"/pets": [{{"path": "/pets", "method": "POST", "payload": "{{\"name\":\"rex\"}}"}}]}}"#
        )
        .unwrap();
        let mut contract = load_contract(file.path()).unwrap();
        let mut config = RunConfig::default();
        config
            .files
            .ref_data
            .insert("all".to_string(), BTreeMap::from([("tenant".to_string(), "t1".to_string())]));
        contract.merge_ref_data(&config.files.ref_data);

        let by_path = ref_data_by_path(&contract);
        assert_eq!(by_path["/pets"].get("tenant").map(String::as_str), Some("t1"));
    }

    #[test]
    fn missing_and_empty_contracts_are_fatal() {
        let err = load_contract(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read contract file"));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{}}").unwrap();
        let err = load_contract(file.path()).unwrap_err();
        assert!(err.to_string().contains("no operations found"));
    }

    #[test]
    fn expected_code_overrides_are_validated() {
        let mut config = RunConfig::default();
        config
            .files
            .expected_response_codes
            .insert("EmptyStringsInFields".to_string(), "400,422".to_string());
        let overrides = expected_overrides(&config).unwrap();
        assert_eq!(overrides["EmptyStringsInFields"].allowed_codes(), vec!["400", "422"]);

        config
            .files
            .expected_response_codes
            .insert("NullBody".to_string(), "4x, 50".to_string());
        assert!(expected_overrides(&config).is_err());
    }

    #[test]
    fn argument_errors_exit_with_the_usage_code() {
        let err = Cli::try_parse_from(["dochia_cli", "--no-such-flag"]).unwrap_err();
        assert_eq!(parse_failure_exit_code(&err), EXIT_USAGE_ERROR);

        let err = Cli::try_parse_from(["dochia_cli", "--version"]).unwrap_err();
        assert_eq!(parse_failure_exit_code(&err), 0);
    }

    #[test]
    fn paths_order_is_optional() {
        assert!(load_paths_order(None).unwrap().is_empty());
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "/pets/{{id}}\n/pets").unwrap();
        let path = file.path().to_path_buf();
        assert_eq!(load_paths_order(Some(&path)).unwrap(), vec!["/pets/{id}", "/pets"]);
    }
}
