use crate::classifier::{ResponseChecks, Verdict};
use crate::config::RunConfig;
use crate::http::{DochiaHeader, HttpMethod, HttpResponse, ServiceCaller, ServiceData};
use crate::matching::Matchers;
use crate::model::PlaybookData;
use crate::report::ResultSink;
use crate::response_code::{ResponseCodeFamily, is_2xx};
use std::collections::BTreeSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;
use tracing::{debug, warn};

/// Bookkeeping that outlives a single playbook: what earlier calls did to
/// the service, and which run-once playbooks already ran for a path.
#[derive(Debug, Default)]
pub struct RunState {
    /// Concrete paths of deleted resources, placeholders already filled.
    successful_deletes: Vec<String>,
    executed_once: BTreeSet<(String, &'static str)>,
}

impl RunState {
    pub fn record_successful_delete(&mut self, path: &str) {
        if !self.successful_deletes.iter().any(|p| p == path) {
            self.successful_deletes.push(path.to_string());
        }
    }

    pub fn successful_deletes(&self) -> &[String] {
        &self.successful_deletes
    }

    /// Hands over every remembered delete, leaving none behind.
    pub fn take_successful_deletes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.successful_deletes)
    }

    /// Marks `playbook` as executed for `path`. Returns false when it already was.
    pub fn mark_executed_once(&mut self, path: &str, playbook: &'static str) -> bool {
        self.executed_once.insert((path.to_string(), playbook))
    }
}

/// Everything a playbook needs while it runs: the transport, the result
/// sink, the match arguments and the run configuration.
pub struct ExecutionContext<'a> {
    caller: &'a mut dyn ServiceCaller,
    sink: &'a mut dyn ResultSink,
    matchers: &'a Matchers,
    config: &'a RunConfig,
    state: &'a mut RunState,
    playbook: &'static str,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        caller: &'a mut dyn ServiceCaller,
        sink: &'a mut dyn ResultSink,
        matchers: &'a Matchers,
        config: &'a RunConfig,
        state: &'a mut RunState,
    ) -> Self {
        Self {
            caller,
            sink,
            matchers,
            config,
            state,
            playbook: "",
        }
    }

    pub fn set_playbook(&mut self, playbook: &'static str) {
        self.playbook = playbook;
    }

    pub fn playbook(&self) -> &'static str {
        self.playbook
    }

    pub fn config(&self) -> &'a RunConfig {
        self.config
    }

    pub fn matchers(&self) -> &'a Matchers {
        self.matchers
    }

    pub fn sink(&mut self) -> &mut dyn ResultSink {
        &mut *self.sink
    }

    pub fn state(&self) -> &RunState {
        self.state
    }

    pub fn state_mut(&mut self) -> &mut RunState {
        &mut *self.state
    }

    pub fn is_authentication_header(&self, name: &str) -> bool {
        self.caller.is_authentication_header(name)
    }

    /// Runs one test case: opens it in the sink, runs `body`, and closes it.
    ///
    /// A panic inside `body` is caught and reported as an unexpected exception
    /// so the rest of the run continues.
    pub fn create_and_execute_test(&mut self, data: &PlaybookData, body: impl FnOnce(&mut Self)) {
        let playbook = self.playbook;
        self.sink.start_test_case(playbook, data);

        let result = catch_unwind(AssertUnwindSafe(|| body(&mut *self)));

        if let Err(panic_payload) = result {
            let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic type".to_string()
            };
            warn!(playbook, error = %msg, "Test case panicked");
            self.sink.report(Verdict::unexpected_exception(playbook, &msg));
        }
        self.sink.end_test_case();
    }

    /// Calls the service and records the exchange with the sink.
    ///
    /// Transport failures are reported as the test case's verdict and yield `None`.
    pub fn call_service(&mut self, service_data: &ServiceData) -> Option<HttpResponse> {
        self.sink.record_request(service_data);
        let started = Instant::now();
        match self.caller.call(service_data) {
            Ok(response) => {
                let response = if response.response_time_ms == 0 {
                    let elapsed = started.elapsed().as_millis() as u64;
                    response.with_response_time(elapsed)
                } else {
                    response
                };
                self.sink.record_response(&response);
                if service_data.http_method == HttpMethod::Delete && is_2xx(response.response_code) {
                    let deleted = service_data.resolved_path();
                    debug!(path = %deleted, "Remembering successful delete");
                    self.state.record_successful_delete(&deleted);
                }
                Some(response)
            }
            Err(err) => {
                warn!(playbook = self.playbook, path = %service_data.relative_path, error = %err, "Service call failed");
                self.sink.report_transport_error(self.playbook, &err);
                None
            }
        }
    }

    /// Reports a response against the match arguments when the playbook has
    /// no expected family: error when it matches (or nothing is configured),
    /// skip otherwise.
    pub(crate) fn report_match_result(&mut self, matched: bool) {
        if matched || !self.matchers.is_any_supplied() {
            let message = format!("Response matches{}", self.matchers.match_string());
            self.sink.report_error("Response matches arguments", message);
        } else {
            self.sink
                .skip_test("Skipping test as response does not match given matchers!");
        }
    }

    pub(crate) fn expected_result_text(&self, expected: Option<&ResponseCodeFamily>) -> String {
        match expected {
            Some(family) => format!("Should return [{}]", family.as_str()),
            None => format!(
                "Should return [a response that doesn't match{}]",
                self.matchers.match_string()
            ),
        }
    }
}

/// Custom handling of the response, replacing the default classification.
pub type ResponseProcessor<'p> = Box<dyn FnOnce(&mut ExecutionContext<'_>, &HttpResponse, &PlaybookData) + 'p>;

enum Expectation<'p> {
    Family(ResponseCodeFamily),
    Processor(ResponseProcessor<'p>),
}

/// One request derived from a playbook's data, checked against either an
/// expected response code family or a custom processor.
pub struct SimpleExecutorContext<'d> {
    data: &'d PlaybookData,
    scenario: String,
    expectation: Expectation<'d>,
    expected_specific_response_code: Option<String>,
    path: Option<String>,
    http_method: Option<HttpMethod>,
    payload: Option<String>,
    headers: Option<Vec<DochiaHeader>>,
    skipped_headers: Vec<String>,
    checks: ResponseChecks,
    add_user_headers: bool,
    replace_url_params: bool,
    replace_ref_data: bool,
    valid_json: bool,
}

impl<'d> SimpleExecutorContext<'d> {
    pub fn expecting(data: &'d PlaybookData, scenario: impl Into<String>, expected: ResponseCodeFamily) -> Self {
        Self::new(data, scenario.into(), Expectation::Family(expected))
    }

    pub fn processed_by(
        data: &'d PlaybookData,
        scenario: impl Into<String>,
        processor: ResponseProcessor<'d>,
    ) -> Self {
        Self::new(data, scenario.into(), Expectation::Processor(processor))
    }

    fn new(data: &'d PlaybookData, scenario: String, expectation: Expectation<'d>) -> Self {
        Self {
            data,
            scenario,
            expectation,
            expected_specific_response_code: None,
            path: None,
            http_method: None,
            payload: None,
            headers: None,
            skipped_headers: Vec::new(),
            checks: ResponseChecks::default(),
            add_user_headers: true,
            replace_url_params: true,
            replace_ref_data: true,
            valid_json: true,
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_http_method(mut self, method: HttpMethod) -> Self {
        self.http_method = Some(method);
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_headers(mut self, headers: Vec<DochiaHeader>) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_skipped_headers(mut self, skipped: Vec<String>) -> Self {
        self.skipped_headers = skipped;
        self
    }

    pub fn with_checks(mut self, checks: ResponseChecks) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_expected_specific_response_code(mut self, expected: impl Into<String>) -> Self {
        self.expected_specific_response_code = Some(expected.into());
        self
    }

    pub fn without_user_headers(mut self) -> Self {
        self.add_user_headers = false;
        self
    }

    pub fn without_url_params_replacement(mut self) -> Self {
        self.replace_url_params = false;
        self
    }

    pub fn without_ref_data_replacement(mut self) -> Self {
        self.replace_ref_data = false;
        self
    }

    pub fn with_invalid_json(mut self) -> Self {
        self.valid_json = false;
        self
    }

    fn service_data(&self) -> ServiceData {
        let data = self.data;
        let headers = self.headers.clone().unwrap_or_else(|| data.headers.clone());
        let headers = headers
            .into_iter()
            .filter(|h| !self.skipped_headers.iter().any(|s| s.eq_ignore_ascii_case(&h.name)))
            .collect();

        ServiceData {
            relative_path: self.path.clone().unwrap_or_else(|| data.path.clone()),
            http_method: self.http_method.unwrap_or(data.method),
            payload: self.payload.clone().unwrap_or_else(|| data.payload.clone()),
            headers,
            skipped_headers: self.skipped_headers.clone(),
            replace_ref_data: self.replace_ref_data,
            add_user_headers: self.add_user_headers,
            replace_url_params: self.replace_url_params,
            valid_json: self.valid_json,
            ..ServiceData::for_playbook_data(data)
        }
    }
}

/// Executes exactly one test case for `simple`.
pub fn execute_simple(ctx: &mut ExecutionContext<'_>, simple: SimpleExecutorContext<'_>) {
    let data = simple.data;
    ctx.create_and_execute_test(data, move |ctx| {
        let service_data = simple.service_data();
        let SimpleExecutorContext {
            scenario,
            expectation,
            expected_specific_response_code,
            checks,
            ..
        } = simple;

        ctx.sink().add_scenario(scenario);
        let expected_text = match (&expectation, expected_specific_response_code) {
            (_, Some(specific)) => format!("Should return {specific}"),
            (Expectation::Family(family), None) => ctx.expected_result_text(Some(family)),
            (Expectation::Processor(_), None) => ctx.expected_result_text(None),
        };
        ctx.sink().add_expected_result(expected_text);

        let Some(response) = ctx.call_service(&service_data) else {
            return;
        };
        match expectation {
            Expectation::Family(family) => ctx.sink().report_result(data, &response, &family, checks),
            Expectation::Processor(processor) => processor(ctx, &response, data),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::VerdictLevel;
    use crate::error::TransportError;
    use crate::test_support::{Harness, ScriptedCaller, pets_data};

    #[test]
    fn simple_executor_reports_exactly_one_result() {
        let mut harness = Harness::new(ScriptedCaller::always(200, r#"{"id":1,"name":"rex"}"#));
        let data = pets_data();
        harness.run("HappyPath", |ctx| {
            execute_simple(
                ctx,
                SimpleExecutorContext::expecting(&data, "Send a happy flow request", ResponseCodeFamily::TWO_XX),
            );
        });

        let cases = harness.listener.test_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].verdict.as_ref().map(|v| v.level), Some(VerdictLevel::Info));
        assert_eq!(cases[0].scenario, "Send a happy flow request");
        assert_eq!(cases[0].expected_result, "Should return [2XX]");
    }

    #[test]
    fn overrides_replace_the_playbook_request() {
        let mut harness = Harness::new(ScriptedCaller::always(404, "{}"));
        let data = pets_data();
        harness.run("Custom", |ctx| {
            execute_simple(
                ctx,
                SimpleExecutorContext::expecting(&data, "Replay", ResponseCodeFamily::FOUR_XX)
                    .with_path("/pets/99")
                    .with_http_method(HttpMethod::Get)
                    .with_payload("")
                    .with_skipped_headers(vec!["authorization".into()])
                    .without_user_headers(),
            );
        });

        let request = &harness.caller.requests()[0];
        assert_eq!(request.relative_path, "/pets/99");
        assert_eq!(request.http_method, HttpMethod::Get);
        assert_eq!(request.payload, "");
        assert!(request.headers.iter().all(|h| h.name != "Authorization"));
        assert!(!request.add_user_headers);
        assert_eq!(request.contract_path, data.contract_path);
    }

    #[test]
    fn response_processor_takes_full_control() {
        let mut harness = Harness::new(ScriptedCaller::always(500, "boom"));
        let data = pets_data();
        harness.run("Processed", |ctx| {
            let processor: ResponseProcessor<'_> = Box::new(|ctx, response, _| {
                let message = format!("Got {}", response.response_code);
                ctx.sink().report_warn("Custom", message);
            });
            execute_simple(ctx, SimpleExecutorContext::processed_by(&data, "Processed", processor));
        });

        let verdict = harness.listener.test_cases()[0].verdict.clone();
        assert_eq!(verdict.map(|v| (v.level, v.message)), Some((VerdictLevel::Warn, "Got 500".to_string())));
    }

    #[test]
    fn transport_failures_become_error_verdicts() {
        let mut harness = Harness::new(ScriptedCaller::failing(TransportError::Timeout(10)));
        let data = pets_data();
        harness.run("HappyPath", |ctx| {
            execute_simple(ctx, SimpleExecutorContext::expecting(&data, "s", ResponseCodeFamily::TWO_XX));
        });

        let cases = harness.listener.test_cases();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].verdict.as_ref().map(|v| v.level), Some(VerdictLevel::Error));
        assert_eq!(harness.listener.statistics().io_errors, 1);
    }

    #[test]
    fn panics_are_isolated_to_their_test_case() {
        let mut harness = Harness::new(ScriptedCaller::always(200, "{}"));
        let data = pets_data();
        harness.run("Exploding", |ctx| {
            ctx.create_and_execute_test(&data, |_| panic!("Boom!"));
            ctx.create_and_execute_test(&data, |ctx| ctx.sink().report_info("Fine", "ok".into()));
        });

        let cases = harness.listener.test_cases();
        assert_eq!(cases.len(), 2);
        let first = cases[0].verdict.as_ref().map(|v| (v.level, v.message.clone()));
        match first {
            Some((VerdictLevel::Error, message)) => assert!(message.contains("Boom!")),
            other => panic!("Expected an error verdict, got {other:?}"),
        }
        assert_eq!(cases[1].verdict.as_ref().map(|v| v.level), Some(VerdictLevel::Info));
    }

    #[test]
    fn successful_deletes_are_remembered() {
        let mut harness = Harness::new(ScriptedCaller::always(204, ""));
        let mut data = pets_data();
        data.method = HttpMethod::Delete;
        harness.run("HappyPath", |ctx| {
            execute_simple(ctx, SimpleExecutorContext::expecting(&data, "s", ResponseCodeFamily::TWO_XX));
        });
        assert_eq!(harness.state.successful_deletes(), [data.path.clone()]);
    }

    #[test]
    fn run_once_marks_are_per_path() {
        let mut state = RunState::default();
        assert!(state.mark_executed_once("/pets", "HttpMethods"));
        assert!(!state.mark_executed_once("/pets", "HttpMethods"));
        assert!(state.mark_executed_once("/owners", "HttpMethods"));
    }
}
