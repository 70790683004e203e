use crate::config::RunConfig;
use crate::error::TransportError;
use crate::executor::{ExecutionContext, RunState};
use crate::http::{DochiaHeader, HttpMethod, HttpResponse, ServiceCaller, ServiceData};
use crate::matching::{IgnoreRules, Matchers};
use crate::model::PlaybookData;
use crate::playbook::{PlaybookDescriptor, PlaybookRegistry, PlaybookTag};
use crate::report::TestCaseListener;
use std::collections::BTreeMap;

type Responder = Box<dyn FnMut(&ServiceData) -> Result<HttpResponse, TransportError>>;

/// A `ServiceCaller` answering from a closure and recording every request.
pub(crate) struct ScriptedCaller {
    responder: Responder,
    requests: Vec<ServiceData>,
}

impl ScriptedCaller {
    pub(crate) fn responding(
        responder: impl FnMut(&ServiceData) -> Result<HttpResponse, TransportError> + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            requests: Vec::new(),
        }
    }

    pub(crate) fn always(code: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::responding(move |data| Ok(json_response(code, &body, data)))
    }

    pub(crate) fn failing(err: TransportError) -> Self {
        Self::responding(move |_| Err(err.clone()))
    }

    pub(crate) fn requests(&self) -> &[ServiceData] {
        &self.requests
    }
}

impl ServiceCaller for ScriptedCaller {
    fn call(&mut self, data: &ServiceData) -> Result<HttpResponse, TransportError> {
        self.requests.push(data.clone());
        (self.responder)(data)
    }
}

pub(crate) fn json_response(code: u16, body: &str, data: &ServiceData) -> HttpResponse {
    HttpResponse::from_exchange(
        code,
        body,
        vec![("Content-Type".to_string(), "application/json".to_string())],
        data.http_method,
        data.relative_path.clone(),
    )
    .with_response_time(1)
}

/// Owns everything an `ExecutionContext` borrows.
pub(crate) struct Harness {
    pub(crate) caller: ScriptedCaller,
    pub(crate) listener: TestCaseListener,
    pub(crate) matchers: Matchers,
    pub(crate) config: RunConfig,
    pub(crate) state: RunState,
}

impl Harness {
    pub(crate) fn new(caller: ScriptedCaller) -> Self {
        Self::with_config(caller, RunConfig::default())
    }

    pub(crate) fn with_config(caller: ScriptedCaller, config: RunConfig) -> Self {
        let matchers = Matchers::from_settings(&config.matching).unwrap();
        let ignore = IgnoreRules::from_settings(&config.ignore, &config.reporting).unwrap();
        Self {
            caller,
            listener: TestCaseListener::new(ignore, config.reporting.max_response_time_ms, BTreeMap::new()),
            matchers,
            config,
            state: RunState::default(),
        }
    }

    pub(crate) fn run(&mut self, playbook: &'static str, body: impl FnOnce(&mut ExecutionContext<'_>)) {
        let mut ctx = ExecutionContext::new(
            &mut self.caller,
            &mut self.listener,
            &self.matchers,
            &self.config,
            &mut self.state,
        );
        ctx.set_playbook(playbook);
        body(&mut ctx);
    }

    pub(crate) fn run_descriptor(&mut self, playbook: &PlaybookDescriptor, data: &PlaybookData) {
        self.run(playbook.name, |ctx| (playbook.run)(data, ctx));
    }
}

/// `POST /pets` with a small payload, one optional header and documented 2XX/4XX answers.
pub(crate) fn pets_data() -> PlaybookData {
    let mut data = PlaybookData::new("/pets", HttpMethod::Post);
    data.payload = r#"{"name":"rex","age":3}"#.to_string();
    data.headers = vec![DochiaHeader::new("X-Request-Id", "abc", false)];
    data.response_codes = vec!["200".into(), "400".into()];
    data.responses.insert("200".into(), vec!["id".into(), "name".into()]);
    data.responses.insert("400".into(), vec!["error".into()]);
    data.response_content_types
        .insert("200".into(), vec!["application/json".into()]);
    data.response_content_types
        .insert("400".into(), vec!["application/json".into()]);
    data
}

fn noop(_: &PlaybookData, _: &mut ExecutionContext<'_>) {}

pub(crate) fn descriptor(name: &'static str, tags: &'static [PlaybookTag]) -> PlaybookDescriptor {
    descriptor_skipping(name, tags, &[])
}

pub(crate) fn descriptor_skipping(
    name: &'static str,
    tags: &'static [PlaybookTag],
    skip_for_methods: &'static [HttpMethod],
) -> PlaybookDescriptor {
    PlaybookDescriptor {
        name,
        description: "test playbook",
        tags,
        skip_for_methods,
        run_once_per_path: false,
        run: noop,
    }
}

/// A small registry covering every tag combination the selector cares about.
pub(crate) fn test_registry() -> PlaybookRegistry {
    PlaybookRegistry::new(vec![
        descriptor("EmptyStringsInHeaders", &[PlaybookTag::Header]),
        descriptor(
            "LeadingSpacesInHeaders",
            &[PlaybookTag::Header, PlaybookTag::TrimAndValidate],
        ),
        descriptor(
            "LeadingSpacesInHeadersValidateTrim",
            &[PlaybookTag::Header, PlaybookTag::ValidateAndTrim],
        ),
        descriptor("RemoveHeaders", &[PlaybookTag::Header]),
        descriptor(
            "ZalgoTextInFieldsSanitizeValidate",
            &[PlaybookTag::Field, PlaybookTag::SanitizeAndValidate],
        ),
        descriptor(
            "ZalgoTextInFieldsValidateSanitize",
            &[PlaybookTag::Field, PlaybookTag::ValidateAndSanitize],
        ),
        descriptor(
            "OnlySingleCodePointEmojisInFields",
            &[PlaybookTag::Field, PlaybookTag::Emoji],
        ),
        descriptor("HappyPath", &[PlaybookTag::Body]),
        descriptor_skipping(
            "EmptyJsonBody",
            &[PlaybookTag::Body],
            &[HttpMethod::Get, HttpMethod::Head, HttpMethod::Delete, HttpMethod::Trace],
        ),
        descriptor("DeletedResourcesNotAvailable", &[PlaybookTag::Stateful]),
        descriptor("Random", &[PlaybookTag::Special]),
    ])
}
