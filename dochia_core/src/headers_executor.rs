use crate::classifier::ResponseChecks;
use crate::executor::ExecutionContext;
use crate::http::{DochiaHeader, ServiceData};
use crate::model::PlaybookData;
use crate::response_code::ResponseCodeFamily;
use crate::strategy::FuzzingStrategy;
use tracing::{debug, info};

/// Drives one test case per (header, strategy) pair of a playbook.
pub struct HeadersExecutorContext<'d> {
    pub data: &'d PlaybookData,
    pub scenario: String,
    pub strategies: Vec<FuzzingStrategy>,
    /// When both families are `None` the response is checked against the
    /// match arguments instead.
    pub expected_for_required: Option<ResponseCodeFamily>,
    pub expected_for_optional: Option<ResponseCodeFamily>,
    pub skip_auth_headers: bool,
    pub checks: ResponseChecks,
}

impl<'d> HeadersExecutorContext<'d> {
    pub fn new(
        data: &'d PlaybookData,
        scenario: impl Into<String>,
        strategies: Vec<FuzzingStrategy>,
        expected_for_required: ResponseCodeFamily,
        expected_for_optional: ResponseCodeFamily,
    ) -> Self {
        Self {
            data,
            scenario: scenario.into(),
            strategies,
            expected_for_required: Some(expected_for_required),
            expected_for_optional: Some(expected_for_optional),
            skip_auth_headers: true,
            checks: ResponseChecks::default(),
        }
    }
}

pub fn execute_headers(ctx: &mut ExecutionContext<'_>, headers: HeadersExecutorContext<'_>) {
    let data = headers.data;
    let candidates: Vec<DochiaHeader> = if headers.skip_auth_headers {
        let without_auth: Vec<DochiaHeader> = data
            .headers
            .iter()
            .filter(|h| !ctx.is_authentication_header(&h.name))
            .cloned()
            .collect();
        debug!(headers = ?without_auth, "All headers excluding auth headers");
        without_auth
    } else {
        data.headers.clone()
    };
    if candidates.is_empty() {
        info!(playbook = ctx.playbook(), "Skipped due to: No headers to fuzz");
        return;
    }

    let skip_headers = &ctx.config().filter.skip_headers;
    for header in &candidates {
        if skip_headers.iter().any(|s| s.eq_ignore_ascii_case(&header.name)) {
            debug!(header = %header.name, "Header is configured to be skipped");
            continue;
        }
        for strategy in &headers.strategies {
            debug!(strategy = strategy.name(), header = %header, "Fuzzing header");
            let fuzzed = header.with_value(strategy.process_str(&header.value));
            let request_headers: Vec<DochiaHeader> = candidates
                .iter()
                .map(|h| if h.name == header.name { fuzzed.clone() } else { h.clone() })
                .collect();
            let expected = if header.required {
                headers.expected_for_required.as_ref()
            } else {
                headers.expected_for_optional.as_ref()
            };

            ctx.create_and_execute_test(data, |ctx| {
                ctx.sink().add_scenario(format!(
                    "{}  Current header [{}] [{}]",
                    headers.scenario, header.name, strategy
                ));
                let expected_text = ctx.expected_result_text(expected);
                ctx.sink().add_expected_result(expected_text);

                let service_data = ServiceData {
                    headers: request_headers,
                    fuzzed_headers: vec![header.name.clone()],
                    ..ServiceData::for_playbook_data(data)
                };
                let Some(response) = ctx.call_service(&service_data) else {
                    return;
                };
                match expected {
                    Some(expected) => ctx.sink().report_result(data, &response, expected, headers.checks),
                    None => {
                        let matched = ctx.matchers().is_match_response(&response);
                        ctx.report_match_result(matched);
                    }
                }
            });
        }
    }
}
