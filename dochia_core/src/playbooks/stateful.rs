use crate::executor::{ExecutionContext, ResponseProcessor, SimpleExecutorContext, execute_simple};
use crate::http::{HttpMethod, HttpResponse};
use crate::model::PlaybookData;
use crate::playbook::{PlaybookDescriptor, PlaybookTag};
use tracing::info;

pub(super) fn playbooks() -> Vec<PlaybookDescriptor> {
    vec![PlaybookDescriptor {
        name: "DeletedResourcesNotAvailable",
        description: "checks that resources are not available after successful deletes",
        tags: &[PlaybookTag::Body, PlaybookTag::Stateful],
        skip_for_methods: &[
            HttpMethod::Head,
            HttpMethod::Patch,
            HttpMethod::Post,
            HttpMethod::Put,
            HttpMethod::Delete,
            HttpMethod::Trace,
        ],
        run_once_per_path: false,
        run: deleted_resources_not_available,
    }]
}

/// Replays every successful DELETE seen so far as a GET on the exact path
/// that was deleted. The deletes are consumed, so each is checked once.
fn deleted_resources_not_available(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    if data.method != HttpMethod::Get {
        return;
    }

    let deletes = ctx.state_mut().take_successful_deletes();
    info!(count = deletes.len(), "Stored successful DELETE requests");
    for deleted_path in deletes {
        let processor: ResponseProcessor<'_> = Box::new(check_gone);
        execute_simple(
            ctx,
            SimpleExecutorContext::processed_by(
                data,
                "Check that previously deleted resource is not available",
                processor,
            )
            .with_path(deleted_path)
            .without_url_params_replacement()
            .with_payload("{}")
            .with_expected_specific_response_code("[404, 410]"),
        );
    }
}

fn check_gone(ctx: &mut ExecutionContext<'_>, response: &HttpResponse, data: &PlaybookData) {
    let code = response.response_code;
    if code == 404 || code == 410 {
        ctx.sink().report_info(
            "Resource not available",
            format!(
                "Request failed as expected for http method [{}] with response code [{code}]",
                response.http_method
            ),
        );
    } else {
        ctx.sink().report_error(
            &format!("Unexpected response code: {code}"),
            format!(
                "Request succeeded unexpectedly for http method [{}]: expected [404, 410], actual [{code}]",
                data.method
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::VerdictLevel;
    use crate::response_code::ResponseCodeFamily;
    use crate::test_support::{Harness, ScriptedCaller, json_response, pets_data};

    fn playbook() -> PlaybookDescriptor {
        playbooks()[0]
    }

    fn get_pet() -> PlaybookData {
        let mut data = pets_data();
        data.path = "/pets/{id}".to_string();
        data.contract_path = data.path.clone();
        data.method = HttpMethod::Get;
        data
    }

    #[test]
    fn deleted_resources_are_replayed_once_as_gets() {
        let caller = ScriptedCaller::responding(|request| {
            let code = if request.relative_path == "/pets/1" { 404 } else { 200 };
            Ok(json_response(code, "{}", request))
        });
        let mut harness = Harness::new(caller);
        harness.state.record_successful_delete("/pets/1");
        harness.state.record_successful_delete("/pets/2");
        let data = get_pet();

        harness.run_descriptor(&playbook(), &data);
        harness.run_descriptor(&playbook(), &data);

        let requests = harness.caller.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.http_method == HttpMethod::Get && r.payload == "{}"));
        let levels: Vec<Option<VerdictLevel>> = harness
            .listener
            .test_cases()
            .iter()
            .map(|c| c.verdict.as_ref().map(|v| v.level))
            .collect();
        assert_eq!(levels, vec![Some(VerdictLevel::Info), Some(VerdictLevel::Error)]);
        assert!(harness.state.successful_deletes().is_empty());
    }

    #[test]
    fn replay_targets_the_deleted_resource_not_the_get_parameters() {
        let caller = ScriptedCaller::responding(|request| {
            let code = match (request.http_method, request.resolved_path().as_str()) {
                (HttpMethod::Delete, _) => 204,
                (HttpMethod::Get, "/pets/7") => 404,
                _ => 200,
            };
            Ok(json_response(code, "{}", request))
        });
        let mut harness = Harness::new(caller);

        let mut delete_pet = get_pet();
        delete_pet.method = HttpMethod::Delete;
        delete_pet.path_params_payload = r#"{"id":7}"#.to_string();
        let mut get_other_pet = get_pet();
        get_other_pet.path_params_payload = r#"{"id":1}"#.to_string();

        harness.run("HappyPath", |ctx| {
            execute_simple(
                ctx,
                SimpleExecutorContext::expecting(&delete_pet, "delete", ResponseCodeFamily::TWO_XX),
            )
        });
        assert_eq!(harness.state.successful_deletes(), ["/pets/7"]);

        harness.run_descriptor(&playbook(), &get_other_pet);
        let replay = &harness.caller.requests()[1];
        assert_eq!(replay.http_method, HttpMethod::Get);
        assert_eq!(replay.resolved_path(), "/pets/7");
        assert_eq!(
            harness.listener.test_cases()[1].verdict.as_ref().map(|v| v.level),
            Some(VerdictLevel::Info)
        );
    }

    #[test]
    fn only_get_operations_replay_deletes() {
        let mut harness = Harness::new(ScriptedCaller::always(404, "{}"));
        harness.state.record_successful_delete("/pets/1");
        harness.run_descriptor(&playbook(), &pets_data());
        assert!(harness.caller.requests().is_empty());
        assert_eq!(harness.state.successful_deletes().len(), 1);
        assert!(playbook().skips(HttpMethod::Post));
        assert!(!playbook().skips(HttpMethod::Get));
    }
}
