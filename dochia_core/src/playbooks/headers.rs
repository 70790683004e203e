use super::{HEADER_SPACES, SINGLE_CODE_POINT_EMOJIS, ZALGO_TEXT, large_string};
use crate::classifier::ResponseChecks;
use crate::executor::{ExecutionContext, SimpleExecutorContext, execute_simple};
use crate::headers_executor::{HeadersExecutorContext, execute_headers};
use crate::http::DochiaHeader;
use crate::model::PlaybookData;
use crate::playbook::{PlaybookDescriptor, PlaybookTag};
use crate::response_code::ResponseCodeFamily;
use crate::strategy::FuzzingStrategy;
use tracing::info;

pub(crate) const DOCHIA_FUZZY_HEADER: &str = "Dochia-Fuzzy-Header";

/// Largest header set `RemoveHeaders` will combine.
const MAX_REMOVE_HEADERS: usize = 30;

const HEADER: &[PlaybookTag] = &[PlaybookTag::Header];

pub(super) fn playbooks() -> Vec<PlaybookDescriptor> {
    vec![
        header_playbook(
            "EmptyStringsInHeaders",
            "Iterate through each header and send empty values",
            HEADER,
            empty_strings,
        ),
        header_playbook(
            "LeadingSpacesInHeaders",
            "Iterate through each header and send values prefixed with spaces",
            &[PlaybookTag::Header, PlaybookTag::TrimAndValidate],
            leading_spaces_trim_validate,
        ),
        header_playbook(
            "LeadingSpacesInHeadersValidateTrim",
            "Iterate through each header and send values prefixed with spaces",
            &[PlaybookTag::Header, PlaybookTag::ValidateAndTrim],
            leading_spaces_validate_trim,
        ),
        header_playbook(
            "TrailingSpacesInHeaders",
            "Iterate through each header and send values suffixed with spaces",
            HEADER,
            trailing_spaces,
        ),
        header_playbook(
            "OnlySpacesInHeaders",
            "Iterate through each header and send values replaced by spaces",
            HEADER,
            only_spaces,
        ),
        header_playbook(
            "VeryLargeStringsInHeaders",
            "Iterate through each header and send large values",
            HEADER,
            very_large_strings,
        ),
        header_playbook(
            "ZalgoTextInHeaders",
            "Iterate through each header and send zalgo text",
            HEADER,
            zalgo_text,
        ),
        header_playbook(
            "LeadingSingleCodePointEmojisInHeaders",
            "Iterate through each header and send values prefixed with single code point emojis",
            &[PlaybookTag::Header, PlaybookTag::Emoji],
            leading_emojis,
        ),
        header_playbook(
            "RemoveHeaders",
            "Iterate through each header and remove different combinations",
            HEADER,
            remove_headers,
        ),
        header_playbook(
            "ExtraHeaders",
            "Send happy path request and add extra header 'Dochia-Fuzzy-Header'",
            HEADER,
            extra_headers,
        ),
    ]
}

fn header_playbook(
    name: &'static str,
    description: &'static str,
    tags: &'static [PlaybookTag],
    run: fn(&PlaybookData, &mut ExecutionContext<'_>),
) -> PlaybookDescriptor {
    PlaybookDescriptor {
        name,
        description,
        tags,
        skip_for_methods: &[],
        run_once_per_path: false,
        run,
    }
}

/// Shared body of the header value playbooks.
///
/// Authentication headers stay in the candidate set: the transport only
/// restores user credentials on headers that were not fuzzed.
fn send_in_headers(
    data: &PlaybookData,
    ctx: &mut ExecutionContext<'_>,
    type_of_data: &str,
    strategies: Vec<FuzzingStrategy>,
    expected_for_required: ResponseCodeFamily,
    expected_for_optional: ResponseCodeFamily,
    checks: ResponseChecks,
) {
    let mut headers = HeadersExecutorContext::new(
        data,
        format!("Send [{type_of_data}] in headers."),
        strategies,
        expected_for_required,
        expected_for_optional,
    );
    headers.skip_auth_headers = false;
    headers.checks = checks;
    execute_headers(ctx, headers);
}

fn each(strategy: fn() -> FuzzingStrategy, values: &[&str]) -> Vec<FuzzingStrategy> {
    values.iter().map(|v| strategy().with_data(*v)).collect()
}

fn without_schema_check() -> ResponseChecks {
    ResponseChecks {
        match_schema: false,
        ..ResponseChecks::default()
    }
}

fn empty_strings(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_in_headers(
        data,
        ctx,
        "empty values",
        vec![FuzzingStrategy::replace().with_data("")],
        ResponseCodeFamily::FOUR_XX,
        ResponseCodeFamily::TWO_XX,
        ResponseChecks::default(),
    );
}

fn leading_spaces_trim_validate(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_in_headers(
        data,
        ctx,
        "values prefixed with spaces",
        each(FuzzingStrategy::prefix, &HEADER_SPACES),
        ResponseCodeFamily::TWO_XX,
        ResponseCodeFamily::TWO_XX,
        ResponseChecks::default(),
    );
}

fn leading_spaces_validate_trim(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_in_headers(
        data,
        ctx,
        "values prefixed with spaces",
        each(FuzzingStrategy::prefix, &HEADER_SPACES),
        ResponseCodeFamily::FOUR_XX,
        ResponseCodeFamily::FOUR_XX,
        ResponseChecks::default(),
    );
}

fn trailing_spaces(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_in_headers(
        data,
        ctx,
        "values suffixed with spaces",
        each(FuzzingStrategy::trail, &HEADER_SPACES),
        ResponseCodeFamily::TWO_XX,
        ResponseCodeFamily::TWO_XX,
        ResponseChecks::default(),
    );
}

fn only_spaces(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_in_headers(
        data,
        ctx,
        "values replaced by spaces",
        each(FuzzingStrategy::replace, &HEADER_SPACES),
        ResponseCodeFamily::FOUR_XX,
        ResponseCodeFamily::TWO_XX,
        ResponseChecks::default(),
    );
}

fn very_large_strings(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    let size = ctx.config().processing.large_strings_size / 4;
    send_in_headers(
        data,
        ctx,
        "large values",
        vec![FuzzingStrategy::replace().with_data(large_string(size))],
        ResponseCodeFamily::FOUR_XX,
        ResponseCodeFamily::FOUR_XX,
        ResponseChecks {
            match_schema: false,
            match_content_type: false,
        },
    );
}

fn zalgo_text(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_in_headers(
        data,
        ctx,
        "zalgo text",
        vec![FuzzingStrategy::replace().with_data(ZALGO_TEXT)],
        ResponseCodeFamily::FOUR_XX,
        ResponseCodeFamily::FOUR_XX,
        without_schema_check(),
    );
}

fn leading_emojis(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    send_in_headers(
        data,
        ctx,
        "values prefixed with single code point emojis",
        each(FuzzingStrategy::prefix, &SINGLE_CODE_POINT_EMOJIS),
        ResponseCodeFamily::FOUR_XX,
        ResponseCodeFamily::FOUR_XX,
        without_schema_check(),
    );
}

fn remove_headers(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    if data.headers.is_empty() {
        info!(playbook = ctx.playbook(), "Skipped due to: No headers to fuzz");
        return;
    }

    let Some(subsets) = power_set(&data.headers) else {
        info!(
            playbook = ctx.playbook(),
            headers = data.headers.len(),
            max = MAX_REMOVE_HEADERS,
            "Skipped due to: Too many headers to combine"
        );
        return;
    };

    for subset in subsets {
        let required_removed = data.required_headers().any(|h| !subset.contains(h));
        let expected = ResponseCodeFamily::for_required_removed(required_removed);
        let names: Vec<&str> = subset.iter().map(|h| h.name.as_str()).collect();
        let scenario = format!(
            "Send only the following headers: {names:?} plus any authentication headers."
        );
        let expected_text = format!(
            "[{}] as mandatory headers [{}] removed",
            expected.as_str(),
            if required_removed { "were" } else { "were not" }
        );

        execute_simple(
            ctx,
            SimpleExecutorContext::expecting(data, scenario, expected)
                .with_headers(subset)
                .with_expected_specific_response_code(expected_text)
                .without_user_headers(),
        );
    }
}

/// Every subset of `headers`, from the empty one to the full set. Subsets
/// keep the documented header order. `None` above [`MAX_REMOVE_HEADERS`].
fn power_set(headers: &[DochiaHeader]) -> Option<Vec<Vec<DochiaHeader>>> {
    if headers.len() > MAX_REMOVE_HEADERS {
        return None;
    }
    let count = 1usize.checked_shl(u32::try_from(headers.len()).ok()?)?;
    let subsets = (0..count)
        .map(|mask| {
            headers
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, h)| h.clone())
                .collect()
        })
        .collect();
    Some(subsets)
}

fn extra_headers(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    let mut headers = data.headers.clone();
    headers.push(DochiaHeader::new(DOCHIA_FUZZY_HEADER, DOCHIA_FUZZY_HEADER, false));
    let scenario = format!(
        "Add an extra header inside the request: name [{DOCHIA_FUZZY_HEADER}], value [{DOCHIA_FUZZY_HEADER}]. "
    );

    execute_simple(
        ctx,
        SimpleExecutorContext::expecting(data, scenario, ResponseCodeFamily::TWO_XX).with_headers(headers),
    );
}
