use serde::Deserialize;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use tracing::debug;

#[derive(Deserialize, Debug)]
struct Release {
    #[serde(alias = "tag_name")]
    version: String,
}

/// Outcome of a finished version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    pub latest: String,
    pub newer: bool,
}

/// A version check running on its own thread. The run never waits on it;
/// the result is collected once at the end with a bounded wait.
pub struct VersionCheck {
    receiver: Receiver<Option<CheckResult>>,
}

impl VersionCheck {
    pub fn spawn(current: &'static str, release_url: String, timeout: Duration) -> Self {
        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let result = fetch_latest(&release_url, timeout).map(|latest| CheckResult {
                newer: is_newer(current, &latest),
                latest,
            });
            let _ = sender.send(result);
        });
        Self { receiver }
    }

    /// The check result, or `None` when it failed or is still running after `wait`.
    pub fn collect(self, wait: Duration) -> Option<CheckResult> {
        self.receiver.recv_timeout(wait).ok().flatten()
    }
}

fn fetch_latest(release_url: &str, timeout: Duration) -> Option<String> {
    let client = reqwest::blocking::Client::builder().timeout(timeout).build().ok()?;
    let response = client
        .get(release_url)
        .header(reqwest::header::USER_AGENT, "dochia_cli")
        .send()
        .map_err(|e| debug!(error = %e, "Version check failed"))
        .ok()?;
    let release: Release = response
        .json()
        .map_err(|e| debug!(error = %e, "Unexpected version check response"))
        .ok()?;
    Some(release.version.trim_start_matches('v').to_string())
}

fn parse_version(version: &str) -> Vec<u64> {
    version
        .trim_start_matches('v')
        .split(['.', '-'])
        .map_while(|part| part.parse().ok())
        .collect()
}

/// Numeric comparison of dotted versions; pre-release suffixes are ignored.
pub fn is_newer(current: &str, latest: &str) -> bool {
    parse_version(latest) > parse_version(current)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_compare_numerically() {
        assert!(is_newer("0.1.0", "0.2.0"));
        assert!(is_newer("0.9.0", "v0.10.0"));
        assert!(!is_newer("1.2.3", "1.2.3"));
        assert!(!is_newer("1.3.0", "1.2.9"));
        assert!(!is_newer("1.0.0", "garbage"));
    }

    #[test]
    fn failed_checks_yield_nothing() {
        let check = VersionCheck::spawn("0.1.0", "http://127.0.0.1:9/releases".to_string(), Duration::from_millis(200));
        assert_eq!(check.collect(Duration::from_secs(5)), None);
    }
}
