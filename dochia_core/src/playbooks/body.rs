use super::is_empty_payload;
use crate::executor::{ExecutionContext, ResponseProcessor, SimpleExecutorContext, execute_simple};
use crate::http::{HttpMethod, HttpResponse};
use crate::model::PlaybookData;
use crate::playbook::{PlaybookDescriptor, PlaybookTag};
use crate::response_code::{ResponseCodeFamily, is_2xx};
use tracing::debug;

const BODY: &[PlaybookTag] = &[PlaybookTag::Body];

const BODYLESS_METHODS: &[HttpMethod] = &[
    HttpMethod::Get,
    HttpMethod::Head,
    HttpMethod::Delete,
    HttpMethod::Trace,
];

/// Methods probed by `HttpMethods`, in the order they are sent. HEAD is
/// handled apart since a documented GET covers it.
const PROBED_METHODS: [HttpMethod; 6] = [
    HttpMethod::Post,
    HttpMethod::Put,
    HttpMethod::Get,
    HttpMethod::Patch,
    HttpMethod::Delete,
    HttpMethod::Trace,
];

pub(super) fn playbooks() -> Vec<PlaybookDescriptor> {
    vec![
        PlaybookDescriptor {
            name: "HappyPath",
            description: "Send request with all fields and headers properly populated",
            tags: BODY,
            skip_for_methods: &[],
            run_once_per_path: false,
            run: happy_path,
        },
        PlaybookDescriptor {
            name: "HttpMethods",
            description: "Iterate through each undocumented HTTP method and send empty request",
            tags: BODY,
            skip_for_methods: &[],
            run_once_per_path: true,
            run: http_methods,
        },
        PlaybookDescriptor {
            name: "EmptyJsonBody",
            description: "Send request with empty JSON object body",
            tags: BODY,
            skip_for_methods: BODYLESS_METHODS,
            run_once_per_path: false,
            run: empty_json_body,
        },
        PlaybookDescriptor {
            name: "MalformedJson",
            description: "Send malformed JSON request with trailing 'bla' string",
            tags: BODY,
            skip_for_methods: BODYLESS_METHODS,
            run_once_per_path: false,
            run: malformed_json,
        },
        PlaybookDescriptor {
            name: "NullBody",
            description: "Send request with null body",
            tags: BODY,
            skip_for_methods: BODYLESS_METHODS,
            run_once_per_path: false,
            run: null_body,
        },
    ]
}

fn happy_path(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    execute_simple(
        ctx,
        SimpleExecutorContext::expecting(
            data,
            "Send a 'happy' flow request with all fields and all headers",
            ResponseCodeFamily::TWO_XX,
        ),
    );
}

fn http_methods(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    for method in PROBED_METHODS {
        if !data.is_method_documented(method) {
            send_undocumented_method(data, ctx, method);
        }
    }
    if !data.is_method_documented(HttpMethod::Get) && !data.is_method_documented(HttpMethod::Head) {
        send_undocumented_method(data, ctx, HttpMethod::Head);
    }
}

fn send_undocumented_method(data: &PlaybookData, ctx: &mut ExecutionContext<'_>, method: HttpMethod) {
    let payload = if method.requires_body() { data.payload.clone() } else { String::new() };
    let processor: ResponseProcessor<'_> = Box::new(check_method_not_allowed);
    execute_simple(
        ctx,
        SimpleExecutorContext::processed_by(
            data,
            format!("Send a happy flow request with undocumented HTTP method: {method}"),
            processor,
        )
        .with_http_method(method)
        .with_payload(payload)
        .with_expected_specific_response_code("405"),
    );
}

fn check_method_not_allowed(ctx: &mut ExecutionContext<'_>, response: &HttpResponse, _: &PlaybookData) {
    let code = response.response_code;
    let method = response.http_method;
    if code == 405 {
        ctx.sink().report_info(
            "Method not allowed",
            format!("Request failed as expected for http method [{method}] with response code [{code}]"),
        );
    } else if is_2xx(code) {
        ctx.sink().report_error(
            &format!("Unexpected response code: {code}"),
            format!("Request succeeded unexpectedly for http method [{method}]: expected [405], actual [{code}]"),
        );
    } else {
        ctx.sink().report_warn(
            &format!("Unexpected response code: {code}"),
            format!("Unexpected response code for http method [{method}]: expected [405], actual [{code}]"),
        );
    }
}

/// Sends `payload` instead of the documented body and expects a 4XX.
fn send_invalid_body(data: &PlaybookData, ctx: &mut ExecutionContext<'_>, scenario: &str, payload: String) {
    if is_empty_payload(&data.payload) {
        debug!(playbook = ctx.playbook(), path = %data.path, "Skipping playbook as payload is empty");
        return;
    }
    execute_simple(
        ctx,
        SimpleExecutorContext::expecting(data, scenario, ResponseCodeFamily::FOUR_XX)
            .with_payload(payload)
            .without_ref_data_replacement()
            .with_invalid_json(),
    );
}

fn empty_json_body(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_invalid_body(data, ctx, "Send a request with an empty json body", "{}".to_string());
}

fn malformed_json(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_invalid_body(
        data,
        ctx,
        "Send a malformed JSON which has the string 'bla' at the end",
        format!("{}bla", data.payload),
    );
}

fn null_body(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_invalid_body(data, ctx, "Send a request with a NULL body", "null".to_string());
}
