use super::{FIELD_SPACES, SINGLE_CODE_POINT_EMOJIS, ZALGO_TEXT, large_string};
use crate::classifier::ResponseChecks;
use crate::executor::ExecutionContext;
use crate::fields_executor::{FieldsExecutorContext, execute_fields};
use crate::model::PlaybookData;
use crate::playbook::{PlaybookDescriptor, PlaybookTag};
use crate::response_code::ResponseCodeFamily;
use crate::strategy::{FuzzingStrategy, field_value};
use serde_json::Value as JsonValue;

const FIELD: &[PlaybookTag] = &[PlaybookTag::Field];

pub(super) fn playbooks() -> Vec<PlaybookDescriptor> {
    vec![
        field_playbook(
            "EmptyStringsInFields",
            "Iterate through each field and send empty string values",
            FIELD,
            empty_strings,
        ),
        field_playbook(
            "NullValuesInFields",
            "Iterate through each field and send null values",
            FIELD,
            null_values,
        ),
        field_playbook(
            "VeryLargeStringsInFields",
            "Iterate through each string field and send very large values",
            FIELD,
            very_large_strings,
        ),
        field_playbook(
            "LeadingSpacesInFieldsTrimValidate",
            "Iterate through each string field and send values prefixed with spaces",
            &[PlaybookTag::Field, PlaybookTag::TrimAndValidate],
            leading_spaces_trim_validate,
        ),
        field_playbook(
            "LeadingSpacesInFieldsValidateTrim",
            "Iterate through each string field and send values prefixed with spaces",
            &[PlaybookTag::Field, PlaybookTag::ValidateAndTrim],
            leading_spaces_validate_trim,
        ),
        field_playbook(
            "ZalgoTextInFieldsSanitizeValidate",
            "Iterate through each string field and send values containing zalgo text",
            &[PlaybookTag::Field, PlaybookTag::SanitizeAndValidate],
            zalgo_text_sanitize_validate,
        ),
        field_playbook(
            "ZalgoTextInFieldsValidateSanitize",
            "Iterate through each string field and send values containing zalgo text",
            &[PlaybookTag::Field, PlaybookTag::ValidateAndSanitize],
            zalgo_text_validate_sanitize,
        ),
        field_playbook(
            "OnlySingleCodePointEmojisInFields",
            "Iterate through each string field and send values made only of single code point emojis",
            &[PlaybookTag::Field, PlaybookTag::Emoji],
            only_emojis,
        ),
    ]
}

fn field_playbook(
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

/// Declared type when the field is documented, else the type of its value in the payload.
fn is_string_field(data: &PlaybookData, field: &str) -> bool {
    match data.field(field) {
        Some(schema) => schema.is_string(),
        None => field_value(&data.payload, field).is_some_and(|v| v.is_string()),
    }
}

fn is_primitive_field(data: &PlaybookData, field: &str) -> bool {
    match data.field(field) {
        Some(schema) => schema.is_primitive(),
        None => field_value(&data.payload, field)
            .is_some_and(|v| !matches!(v, JsonValue::Object(_) | JsonValue::Array(_))),
    }
}

fn values(values: &[&str]) -> Vec<JsonValue> {
    values.iter().map(|v| JsonValue::from(*v)).collect()
}

fn empty_strings(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    let fields = FieldsExecutorContext::new(
        data,
        "Send [empty strings] in request fields.",
        FuzzingStrategy::replace(),
        |_, _| vec![JsonValue::from("")],
    )
    .expecting_by_requiredness(ResponseCodeFamily::FOUR_XX, ResponseCodeFamily::TWO_XX)
    .with_field_filter(|field| is_primitive_field(data, field), "Field is not a primitive.");
    execute_fields(ctx, fields);
}

fn null_values(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    let fields = FieldsExecutorContext::new(
        data,
        "Send [null values] in request fields.",
        FuzzingStrategy::replace(),
        |_, _| vec![JsonValue::Null],
    )
    .expecting_by_requiredness(ResponseCodeFamily::FOUR_XX, ResponseCodeFamily::TWO_XX);
    let fields = FieldsExecutorContext {
        simple_replace_field: true,
        ..fields
    };
    execute_fields(ctx, fields);
}

fn very_large_strings(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    let size = ctx.config().processing.large_strings_size / 4;
    let with_body = data.method.requires_body();
    let fields = FieldsExecutorContext::new(
        data,
        "Send [very large string values] in request fields.",
        FuzzingStrategy::replace(),
        move |_, _| vec![JsonValue::from(large_string(size))],
    )
    .expecting(ResponseCodeFamily::FOUR_XX)
    .with_field_filter(|field| is_string_field(data, field), "Field is not a string.")
    .with_checks(ResponseChecks {
        match_schema: with_body,
        match_content_type: with_body,
    });
    execute_fields(ctx, fields);
}

fn prefixed_strings(
    data: &PlaybookData,
    ctx: &mut ExecutionContext<'_>,
    type_of_data: &str,
    prefixes: &'static [&'static str],
    expected: ResponseCodeFamily,
) {
    let fields = FieldsExecutorContext::new(
        data,
        format!("Send [{type_of_data}] in request fields."),
        FuzzingStrategy::prefix(),
        move |_, _| values(prefixes),
    )
    .expecting(expected)
    .with_field_filter(|field| is_string_field(data, field), "Field is not a string.");
    execute_fields(ctx, fields);
}

fn leading_spaces_trim_validate(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    prefixed_strings(data, ctx, "values prefixed with spaces", &FIELD_SPACES, ResponseCodeFamily::TWO_XX);
}

fn leading_spaces_validate_trim(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    prefixed_strings(data, ctx, "values prefixed with spaces", &FIELD_SPACES, ResponseCodeFamily::FOUR_XX);
}

fn zalgo_text_sanitize_validate(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    prefixed_strings(data, ctx, "values containing zalgo text", &[ZALGO_TEXT], ResponseCodeFamily::TWO_XX);
}

fn zalgo_text_validate_sanitize(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    prefixed_strings(data, ctx, "values containing zalgo text", &[ZALGO_TEXT], ResponseCodeFamily::FOUR_XX);
}

fn only_emojis(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    let fields = FieldsExecutorContext::new(
        data,
        "Send [values made only of single code point emojis] in request fields.",
        FuzzingStrategy::replace(),
        |_, _| values(&SINGLE_CODE_POINT_EMOJIS),
    )
    .expecting(ResponseCodeFamily::FOUR_XX)
    .with_field_filter(|field| is_string_field(data, field), "Field is not a string.")
    .with_checks(ResponseChecks {
        match_schema: false,
        ..ResponseChecks::default()
    });
    execute_fields(ctx, fields);
}
