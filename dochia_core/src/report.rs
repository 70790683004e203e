use crate::classifier::{ResponseChecks, Verdict, VerdictLevel, classify};
use crate::error::TransportError;
use crate::http::{HttpResponse, ServiceData};
use crate::matching::IgnoreRules;
use crate::model::PlaybookData;
use crate::response_code::ResponseCodeFamily;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Receives the lifecycle and outcome of every test case.
///
/// Executors call these in order: `start_test_case`, scenario and expected
/// result, request and response, exactly one verdict, then `end_test_case`.
pub trait ResultSink {
    fn start_test_case(&mut self, playbook: &str, data: &PlaybookData);
    fn add_scenario(&mut self, scenario: String);
    fn add_expected_result(&mut self, expected: String);
    fn record_request(&mut self, request: &ServiceData);
    fn record_response(&mut self, response: &HttpResponse);
    /// Terminal verdict for the current test case.
    fn report(&mut self, verdict: Verdict);
    /// Records an error that is not tied to a verdict, e.g. a contract inconsistency.
    fn record_error(&mut self, message: String);
    fn end_test_case(&mut self);

    /// Classifies the response against the playbook's expectation and reports it.
    fn report_result(
        &mut self,
        data: &PlaybookData,
        response: &HttpResponse,
        expected: &ResponseCodeFamily,
        checks: ResponseChecks,
    );

    /// Reports a transport failure. These always stay errors.
    fn report_transport_error(&mut self, playbook: &str, err: &TransportError);

    fn report_info(&mut self, reason: &str, message: String) {
        self.report(Verdict::new(VerdictLevel::Info, reason, message));
    }

    fn report_warn(&mut self, reason: &str, message: String) {
        self.report(Verdict::new(VerdictLevel::Warn, reason, message));
    }

    fn report_error(&mut self, reason: &str, message: String) {
        self.report(Verdict::new(VerdictLevel::Error, reason, message));
    }

    fn skip_test(&mut self, reason: &str) {
        self.add_expected_result(reason.to_string());
        self.report(Verdict::new(VerdictLevel::Skip, "Skipped", reason.to_string()));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathStatistics {
    pub success: u64,
    pub warnings: u64,
    pub errors: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStatistics {
    pub per_path: BTreeMap<String, PathStatistics>,
    pub auth_errors: u64,
    pub io_errors: u64,
}

impl ExecutionStatistics {
    fn record(&mut self, contract_path: &str, level: VerdictLevel) {
        let stats = self.per_path.entry(contract_path.to_string()).or_default();
        match level {
            VerdictLevel::Info => stats.success += 1,
            VerdictLevel::Warn => stats.warnings += 1,
            VerdictLevel::Error => stats.errors += 1,
            VerdictLevel::Skip => stats.skipped += 1,
        }
    }

    pub fn total_success(&self) -> u64 {
        self.per_path.values().map(|s| s.success).sum()
    }

    pub fn total_warnings(&self) -> u64 {
        self.per_path.values().map(|s| s.warnings).sum()
    }

    pub fn total_errors(&self) -> u64 {
        self.per_path.values().map(|s| s.errors).sum()
    }

    pub fn total_skipped(&self) -> u64 {
        self.per_path.values().map(|s| s.skipped).sum()
    }
}

/// One executed test case with its terminal verdict.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub id: String,
    pub playbook: String,
    pub contract_path: String,
    pub path: String,
    pub method: String,
    pub scenario: String,
    pub expected_result: String,
    pub request: Option<ServiceData>,
    pub response: Option<HttpResponse>,
    pub transport_failure: bool,
    pub verdict: Option<Verdict>,
    /// Ignore rules turned this verdict level into an info.
    pub ignored_level: Option<VerdictLevel>,
}

impl TestCase {
    /// MD5 of method, path and payload; identical requests share a fingerprint.
    pub fn fingerprint(&self) -> String {
        let payload = self
            .request
            .as_ref()
            .map(|r| r.payload.as_str())
            .unwrap_or_default();
        let digest = md5::compute(format!("{}|{}|{}", self.method, self.path, payload));
        format!("{:x}", digest)
    }
}

/// The default [`ResultSink`]: keeps every test case in memory, applies the
/// ignore/filter/hide rules and logs verdicts through `tracing`.
#[derive(Debug, Default)]
pub struct TestCaseListener {
    ignore: IgnoreRules,
    max_response_time_ms: u64,
    expected_overrides: BTreeMap<String, ResponseCodeFamily>,
    test_cases: Vec<TestCase>,
    current: Option<TestCase>,
    statistics: ExecutionStatistics,
    recorded_errors: Vec<String>,
    counter: u64,
}

impl TestCaseListener {
    pub fn new(
        ignore: IgnoreRules,
        max_response_time_ms: u64,
        expected_overrides: BTreeMap<String, ResponseCodeFamily>,
    ) -> Self {
        Self {
            ignore,
            max_response_time_ms,
            expected_overrides,
            ..Self::default()
        }
    }

    pub fn test_cases(&self) -> &[TestCase] {
        &self.test_cases
    }

    pub fn statistics(&self) -> &ExecutionStatistics {
        &self.statistics
    }

    pub fn recorded_errors(&self) -> &[String] {
        &self.recorded_errors
    }

    pub fn current_test_number(&self) -> u64 {
        self.counter
    }

    /// Logs per-path counts followed by the run totals.
    pub fn log_summary(&self) {
        for (path, stats) in &self.statistics.per_path {
            info!(
                path = %path,
                success = stats.success,
                warnings = stats.warnings,
                errors = stats.errors,
                skipped = stats.skipped,
                "Path summary"
            );
        }
        info!(
            tests = self.counter,
            success = self.statistics.total_success(),
            warnings = self.statistics.total_warnings(),
            errors = self.statistics.total_errors(),
            skipped = self.statistics.total_skipped(),
            auth_errors = self.statistics.auth_errors,
            io_errors = self.statistics.io_errors,
            "Run summary"
        );
        for message in &self.recorded_errors {
            warn!(error = %message, "Recorded error");
        }
    }

    /// The family configured for `playbook`, falling back to `default`.
    pub fn expected_response_code_for(
        &self,
        playbook: &str,
        default: &ResponseCodeFamily,
    ) -> ResponseCodeFamily {
        match self.expected_overrides.get(playbook) {
            Some(configured) => {
                debug!(playbook, expected = %configured, "Using configured expected response codes");
                configured.clone()
            }
            None => default.clone(),
        }
    }

    fn is_ignored(&self, response: Option<&HttpResponse>) -> bool {
        response.is_some_and(|r| self.ignore.is_ignored_response(r))
    }

    fn exceeds_response_time(&self, response: Option<&HttpResponse>) -> bool {
        response.is_some_and(|r| r.exceeds_response_time(self.max_response_time_ms))
    }

    /// Applies ignore, filter, hide and response-time rules to a raw verdict.
    fn resolve(&self, test_case: &TestCase, verdict: Verdict) -> (Verdict, Option<VerdictLevel>) {
        let response = test_case.response.as_ref();
        let ignored = self.is_ignored(response);
        let filtered = Verdict::new(
            VerdictLevel::Skip,
            "Filtered",
            "Some response elements were filtered using filter arguments.",
        );

        match verdict.level {
            VerdictLevel::Error => {
                if test_case.transport_failure
                    || !ignored
                    || self.exceeds_response_time(response)
                {
                    (verdict, None)
                } else if self.ignore.skip_reporting_for_ignored {
                    (filtered, None)
                } else {
                    let downgraded = Verdict {
                        level: VerdictLevel::Info,
                        ..verdict
                    };
                    (downgraded, Some(VerdictLevel::Error))
                }
            }
            VerdictLevel::Warn => {
                if self.ignore.hide_warnings {
                    let hidden = Verdict::new(
                        VerdictLevel::Skip,
                        verdict.reason,
                        "Skip reporting as hide-warnings is enabled",
                    );
                    (hidden, None)
                } else if !ignored {
                    (verdict, None)
                } else if self.ignore.skip_reporting_for_ignored {
                    (filtered, None)
                } else {
                    let downgraded = Verdict {
                        level: VerdictLevel::Info,
                        ..verdict
                    };
                    (downgraded, Some(VerdictLevel::Warn))
                }
            }
            VerdictLevel::Info => {
                if self.ignore.hide_success {
                    let hidden = Verdict::new(
                        VerdictLevel::Skip,
                        verdict.reason,
                        "Skip reporting as hide-success is enabled",
                    );
                    (hidden, None)
                } else if ignored && self.ignore.skip_reporting_for_ignored {
                    (filtered, None)
                } else if let Some(slow) = response.filter(|r| {
                    r.exceeds_response_time(self.max_response_time_ms)
                }) {
                    (
                        Verdict::response_time_exceeds_max(
                            slow.response_time_ms,
                            self.max_response_time_ms,
                        ),
                        None,
                    )
                } else {
                    (verdict, None)
                }
            }
            VerdictLevel::Skip => (verdict, None),
        }
    }
}

impl ResultSink for TestCaseListener {
    fn start_test_case(&mut self, playbook: &str, data: &PlaybookData) {
        self.counter += 1;
        self.current = Some(TestCase {
            id: format!("Test {}", self.counter),
            playbook: playbook.to_string(),
            contract_path: data.contract_path.clone(),
            path: data.path.clone(),
            method: data.method.to_string(),
            scenario: String::new(),
            expected_result: String::new(),
            request: None,
            response: None,
            transport_failure: false,
            verdict: None,
            ignored_level: None,
        });
        debug!(test = self.counter, playbook, path = %data.path, method = %data.method, "Starting test case");
    }

    fn add_scenario(&mut self, scenario: String) {
        info!("Scenario: {}", scenario);
        if let Some(current) = self.current.as_mut() {
            current.scenario = scenario;
        }
    }

    fn add_expected_result(&mut self, expected: String) {
        info!("Expected result: {}", expected);
        if let Some(current) = self.current.as_mut() {
            current.expected_result = expected;
        }
    }

    fn record_request(&mut self, request: &ServiceData) {
        if let Some(current) = self.current.as_mut() {
            current.path = request.relative_path.clone();
            current.method = request.http_method.to_string();
            current.request = Some(request.clone());
        }
    }

    fn record_response(&mut self, response: &HttpResponse) {
        debug!(code = response.response_code, time_ms = response.response_time_ms, "Received response");
        if let Some(current) = self.current.as_mut() {
            current.response = Some(response.clone());
        }
    }

    fn report(&mut self, verdict: Verdict) {
        let Some(current) = self.current.take() else {
            warn!(reason = %verdict.reason, "Verdict reported outside of a test case");
            return;
        };
        if let Some(existing) = current.verdict.as_ref() {
            warn!(test = %current.id, first = %existing.reason, second = %verdict.reason, "Test case already has a verdict, ignoring");
            self.current = Some(current);
            return;
        }

        let (resolved, ignored_level) = self.resolve(&current, verdict);
        self.statistics.record(&current.contract_path, resolved.level);
        if let Some(code) = current.response.as_ref().map(|r| r.response_code) {
            if resolved.level == VerdictLevel::Error && (code == 401 || code == 403) {
                self.statistics.auth_errors += 1;
            }
        }

        match resolved.level {
            VerdictLevel::Info => info!(test = %current.id, playbook = %current.playbook, "{}", resolved.message),
            VerdictLevel::Warn => warn!(test = %current.id, playbook = %current.playbook, "{}", resolved.message),
            VerdictLevel::Error => error!(test = %current.id, playbook = %current.playbook, "{}", resolved.message),
            VerdictLevel::Skip => info!(test = %current.id, playbook = %current.playbook, "Skipped due to: {}", resolved.message),
        }

        self.current = Some(TestCase {
            verdict: Some(resolved),
            ignored_level,
            ..current
        });
    }

    fn record_error(&mut self, message: String) {
        error!("{}", message);
        self.recorded_errors.push(message);
    }

    fn end_test_case(&mut self) {
        let Some(mut current) = self.current.take() else {
            return;
        };
        if current.verdict.is_none() {
            self.current = Some(current);
            self.report(Verdict::new(
                VerdictLevel::Skip,
                "No result",
                "Test case finished without reporting a result",
            ));
            match self.current.take() {
                Some(reported) => current = reported,
                None => return,
            }
        }
        debug!(test = %current.id, fingerprint = %current.fingerprint(), result = ?current.verdict.as_ref().map(|v| v.level), "Test case finished");
        self.test_cases.push(current);
    }

    fn report_result(
        &mut self,
        data: &PlaybookData,
        response: &HttpResponse,
        expected: &ResponseCodeFamily,
        checks: ResponseChecks,
    ) {
        let playbook = self
            .current
            .as_ref()
            .map(|c| c.playbook.clone())
            .unwrap_or_default();
        let expected = self.expected_response_code_for(&playbook, expected);
        let verdict = classify(data, response, &expected, checks, &self.ignore);
        self.report(verdict);
    }

    fn report_transport_error(&mut self, playbook: &str, err: &TransportError) {
        if err.is_io() {
            self.statistics.io_errors += 1;
        }
        if let Some(current) = self.current.as_mut() {
            current.transport_failure = true;
        }
        self.report(Verdict::unexpected_exception(playbook, &err.to_string()));
    }
}
