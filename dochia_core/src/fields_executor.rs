use crate::classifier::ResponseChecks;
use crate::error::DochiaError;
use crate::executor::ExecutionContext;
use crate::http::ServiceData;
use crate::model::{DOCHIA_REMOVE_FIELD, PlaybookData, RequestField};
use crate::response_code::ResponseCodeFamily;
use crate::strategy::{FuzzingStrategy, replace_field};
use serde_json::Value as JsonValue;
use tracing::debug;

pub type ValueProducer<'d> = Box<dyn Fn(Option<&RequestField>, &str) -> Vec<JsonValue> + 'd>;
pub type SchemaFilter<'d> = Box<dyn Fn(Option<&RequestField>) -> bool + 'd>;
pub type FieldFilter<'d> = Box<dyn Fn(&str) -> bool + 'd>;

/// Drives one test case per (field, value) pair of a playbook.
pub struct FieldsExecutorContext<'d> {
    pub data: &'d PlaybookData,
    pub scenario: String,
    /// Mutation template; each produced value becomes its data.
    pub strategy: FuzzingStrategy,
    pub value_producer: ValueProducer<'d>,
    pub schema_filter: SchemaFilter<'d>,
    pub field_filter: FieldFilter<'d>,
    pub skip_message: String,
    /// When `None` the response is checked against the match arguments instead.
    pub expected: Option<ResponseCodeFamily>,
    /// Overrides `expected` for fields declared as required.
    pub expected_for_required: Option<ResponseCodeFamily>,
    pub checks: ResponseChecks,
    pub replace_ref_data: bool,
    /// Replace the value as is, without applying the strategy.
    pub simple_replace_field: bool,
}

impl<'d> FieldsExecutorContext<'d> {
    pub fn new(
        data: &'d PlaybookData,
        scenario: impl Into<String>,
        strategy: FuzzingStrategy,
        value_producer: impl Fn(Option<&RequestField>, &str) -> Vec<JsonValue> + 'd,
    ) -> Self {
        Self {
            data,
            scenario: scenario.into(),
            strategy,
            value_producer: Box::new(value_producer),
            schema_filter: Box::new(|_: Option<&RequestField>| true),
            field_filter: Box::new(|_: &str| true),
            skip_message: String::new(),
            expected: None,
            expected_for_required: None,
            checks: ResponseChecks::default(),
            replace_ref_data: true,
            simple_replace_field: false,
        }
    }

    pub fn expecting(mut self, expected: ResponseCodeFamily) -> Self {
        self.expected = Some(expected);
        self
    }

    pub fn with_schema_filter(mut self, filter: impl Fn(Option<&RequestField>) -> bool + 'd) -> Self {
        self.schema_filter = Box::new(filter);
        self
    }

    /// Fields rejected by `filter` are skipped and logged with `skip_message`.
    pub fn with_field_filter(
        mut self,
        filter: impl Fn(&str) -> bool + 'd,
        skip_message: impl Into<String>,
    ) -> Self {
        self.field_filter = Box::new(filter);
        self.skip_message = skip_message.into();
        self
    }

    pub fn with_checks(mut self, checks: ResponseChecks) -> Self {
        self.checks = checks;
        self
    }

    /// Expects `required` when the fuzzed field is required and `optional` otherwise.
    pub fn expecting_by_requiredness(mut self, required: ResponseCodeFamily, optional: ResponseCodeFamily) -> Self {
        self.expected_for_required = Some(required);
        self.expected = Some(optional);
        self
    }

    fn expected_for(&self, field: &str) -> Option<&ResponseCodeFamily> {
        let required = self.data.field(field).is_some_and(|f| f.required);
        match (&self.expected_for_required, required) {
            (Some(family), true) => Some(family),
            _ => self.expected.as_ref(),
        }
    }
}

pub fn execute_fields(ctx: &mut ExecutionContext<'_>, fields: FieldsExecutorContext<'_>) {
    let data = fields.data;
    if !fields.simple_replace_field && serde_json::from_str::<JsonValue>(&data.payload).is_err() {
        let err = DochiaError::ContractInconsistency(format!(
            "payload for {} {} is not valid JSON",
            data.method, data.path
        ));
        ctx.sink().record_error(err.to_string());
        return;
    }

    let removed = data.fields_marked_for_removal();
    let all_fields = data.all_fields();
    debug!(fields = ?all_fields, "All fields");
    if !removed.is_empty() {
        debug!(fields = ?removed, "Fields marked as [{}] in refData will not be fuzzed", DOCHIA_REMOVE_FIELD);
    }

    for field in all_fields.iter().filter(|f| !removed.contains(&f.as_str())) {
        let schema = data.field(field);
        if !(fields.schema_filter)(schema) || !(fields.field_filter)(field) {
            debug!(field = %field, "Skipping [{}]. {}", field, fields.skip_message);
            continue;
        }
        for value in (fields.value_producer)(schema, field) {
            ctx.create_and_execute_test(data, |ctx| execute_test_case(ctx, &fields, field, value));
        }
    }
}

fn execute_test_case(
    ctx: &mut ExecutionContext<'_>,
    fields: &FieldsExecutorContext<'_>,
    field: &str,
    value: JsonValue,
) {
    let data = fields.data;
    let strategy = fields.strategy.clone().with_data(value.clone());
    debug!(field, strategy = %strategy, "Applying strategy");

    ctx.sink()
        .add_scenario(format!("{} Current field [{}] [{}]", fields.scenario, field, strategy));
    let expected = fields.expected_for(field);
    let expected_text = ctx.expected_result_text(expected);
    ctx.sink().add_expected_result(expected_text);

    let fuzzing_result = if fields.simple_replace_field {
        replace_field(&data.payload, field, &FuzzingStrategy::replace().with_data(value.clone()))
    } else {
        replace_field(&data.payload, field, &strategy)
    };

    let service_data = ServiceData {
        payload: fuzzing_result.json,
        replace_ref_data: fields.replace_ref_data,
        tested_fields: vec![field.to_string()],
        ..ServiceData::for_playbook_data(data)
    };
    let Some(mut response) = ctx.call_service(&service_data) else {
        return;
    };
    response.fuzzed_field = Some(field.to_string());

    match expected {
        Some(expected) => ctx.sink().report_result(data, &response, expected, fields.checks),
        None => {
            let matchers = ctx.matchers();
            let matched = matchers.is_match_response(&response)
                || matchers.is_input_reflected(&response, &value);
            ctx.report_match_result(matched);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::VerdictLevel;
    use crate::config::RunConfig;
    use crate::test_support::{Harness, ScriptedCaller, json_response, pets_data};
    use serde_json::json;

    fn three_values(_: Option<&RequestField>, _: &str) -> Vec<JsonValue> {
        vec![json!(""), json!(" "), json!("x")]
    }

    #[test]
    fn one_test_case_per_field_and_value() {
        let mut harness = Harness::new(ScriptedCaller::always(400, r#"{"error":"name"}"#));
        let mut data = pets_data();
        data.payload = r#"{"a":"one","b":"two"}"#.to_string();
        harness.run("EmptyStringsInFields", |ctx| {
            execute_fields(
                ctx,
                FieldsExecutorContext::new(&data, "Send values", FuzzingStrategy::replace(), three_values)
                    .expecting(ResponseCodeFamily::FOUR_XX),
            );
        });

        let cases = harness.listener.test_cases();
        assert_eq!(cases.len(), 6);
        assert!(cases.iter().all(|c| c.verdict.is_some()));
        let payloads: Vec<String> = harness.caller.requests().iter().map(|r| r.payload.clone()).collect();
        assert_eq!(payloads[0], r#"{"a":"","b":"two"}"#);
        assert_eq!(payloads[5], r#"{"a":"one","b":"x"}"#);
        assert!(cases[0].scenario.contains("Current field [a]"));
    }

    #[test]
    fn fields_marked_for_removal_and_filtered_fields_are_skipped() {
        let mut harness = Harness::new(ScriptedCaller::always(400, "{}"));
        let mut data = pets_data();
        data.payload = r#"{"a":"one","b":"two","c":3}"#.to_string();
        data.ref_data.insert("a".into(), DOCHIA_REMOVE_FIELD.into());
        harness.run("Test", |ctx| {
            let fields = FieldsExecutorContext::new(&data, "s", FuzzingStrategy::replace(), three_values)
                .expecting(ResponseCodeFamily::FOUR_XX)
                .with_field_filter(|f| f != "c", "Not c");
            execute_fields(ctx, fields);
        });

        let tested: Vec<String> = harness
            .caller
            .requests()
            .iter()
            .flat_map(|r| r.tested_fields.clone())
            .collect();
        assert_eq!(tested, vec!["b", "b", "b"]);
    }

    #[test]
    fn without_family_only_matching_responses_are_errors() {
        let mut config = RunConfig::default();
        config.matching.codes = vec!["500".into()];
        let caller = ScriptedCaller::responding(|data| {
            let code = if data.payload.contains("boom") { 500 } else { 400 };
            Ok(json_response(code, "{}", data))
        });
        let mut harness = Harness::with_config(caller, config);
        let data = pets_data();
        harness.run("Random", |ctx| {
            let producer = |_: Option<&RequestField>, field: &str| {
                if field == "name" { vec![json!("boom")] } else { vec![json!(1)] }
            };
            execute_fields(ctx, FieldsExecutorContext::new(&data, "s", FuzzingStrategy::replace(), producer));
        });

        let levels: Vec<Option<VerdictLevel>> = harness
            .listener
            .test_cases()
            .iter()
            .map(|c| c.verdict.as_ref().map(|v| v.level))
            .collect();
        assert_eq!(levels, vec![Some(VerdictLevel::Error), Some(VerdictLevel::Skip)]);
    }

    #[test]
    fn required_fields_use_their_own_family() {
        let mut harness = Harness::new(ScriptedCaller::always(400, r#"{"error":"name"}"#));
        let mut data = pets_data();
        let mut name = RequestField::new("name", "string");
        name.required = true;
        data.fields = vec![name, RequestField::new("age", "integer")];
        harness.run("EmptyStringsInFields", |ctx| {
            execute_fields(
                ctx,
                FieldsExecutorContext::new(&data, "s", FuzzingStrategy::replace(), |_, _| vec![json!("")])
                    .expecting_by_requiredness(ResponseCodeFamily::FOUR_XX, ResponseCodeFamily::TWO_XX),
            );
        });

        let outcomes: Vec<(String, Option<VerdictLevel>)> = harness
            .listener
            .test_cases()
            .iter()
            .map(|c| (c.expected_result.clone(), c.verdict.as_ref().map(|v| v.level)))
            .collect();
        assert_eq!(
            outcomes,
            vec![
                ("Should return [4XX]".to_string(), Some(VerdictLevel::Info)),
                ("Should return [2XX]".to_string(), Some(VerdictLevel::Error)),
            ]
        );
    }

    #[test]
    fn invalid_payload_is_recorded_as_contract_inconsistency() {
        let mut harness = Harness::new(ScriptedCaller::always(400, "{}"));
        let mut data = pets_data();
        data.payload = "{not json".to_string();
        harness.run("Test", |ctx| {
            execute_fields(ctx, FieldsExecutorContext::new(&data, "s", FuzzingStrategy::replace(), three_values));
        });
        assert!(harness.caller.requests().is_empty());
        assert_eq!(harness.listener.recorded_errors().len(), 1);
    }
}
