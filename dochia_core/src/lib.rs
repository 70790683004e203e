pub mod classifier;
pub mod config;
pub mod contract;
pub mod error;
pub mod executor;
pub mod fields_executor;
pub mod headers_executor;
pub mod http;
pub mod matching;
pub mod model;
pub mod mutator;
pub mod orchestrator;
pub mod playbook;
pub mod playbooks;
pub mod report;
pub mod response_code;
pub mod selector;
pub mod strategy;

#[cfg(test)]
mod test_support;

pub use classifier::{ResponseChecks, Verdict, VerdictLevel};
pub use config::RunConfig;
pub use contract::Contract;
pub use error::{ConfigError, DochiaError, TransportError};
pub use executor::{ExecutionContext, RunState};
pub use http::{DochiaHeader, HttpMethod, HttpResponse, ServiceCaller, ServiceData};
pub use matching::{IgnoreRules, Matchers};
pub use model::{PlaybookData, RequestField};
pub use mutator::Mutator;
pub use orchestrator::Orchestrator;
pub use playbook::{PlaybookDescriptor, PlaybookRegistry, PlaybookTag};
pub use report::{ResultSink, TestCaseListener};
pub use response_code::ResponseCodeFamily;
pub use selector::Selector;
