use crate::config::RunConfig;
use crate::contract::{Contract, order_paths};
use crate::error::DochiaError;
use crate::executor::{ExecutionContext, RunState};
use crate::http::{HttpMethod, ServiceCaller};
use crate::matching::Matchers;
use crate::model::PlaybookData;
use crate::playbook::PlaybookDescriptor;
use crate::report::ResultSink;
use crate::selector::Selector;
use std::time::Instant;
use tracing::{debug, info};

pub const EXIT_USAGE_ERROR: u8 = 191;
pub const EXIT_FATAL_ERROR: u8 = 192;
const MAX_ERRORS_EXIT_CODE: u64 = 190;

/// Process exit code for a finished run: the number of error verdicts,
/// saturated so it never collides with the usage and fatal codes.
pub fn exit_code_for_errors(errors: u64) -> u8 {
    errors.min(MAX_ERRORS_EXIT_CODE) as u8
}

/// Drives a run: walks the contract paths in order and, per path, runs the
/// phase-1 playbooks over every selected operation, then the phase-2 ones.
pub struct Orchestrator<'a> {
    selector: &'a Selector,
    config: &'a RunConfig,
    matchers: Matchers,
    paths_order: Vec<String>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(selector: &'a Selector, config: &'a RunConfig, paths_order: Vec<String>) -> Result<Self, DochiaError> {
        Ok(Self {
            selector,
            config,
            matchers: Matchers::from_settings(&config.matching)?,
            paths_order,
        })
    }

    /// The contract paths this run visits, in visiting order.
    pub fn paths_to_run(&self, contract: &Contract) -> Vec<String> {
        let contract_paths = contract.contract_paths();
        order_paths(self.selector.paths_to_run(&contract_paths), &self.paths_order)
    }

    pub fn run(&self, contract: &Contract, caller: &mut dyn ServiceCaller, sink: &mut dyn ResultSink) -> RunState {
        let started = Instant::now();
        let mut state = RunState::default();
        let paths = self.paths_to_run(contract);
        let (first_phase, second_phase) = self.selector.resolve_runnable();
        info!(
            paths = paths.len(),
            first_phase = first_phase.len(),
            second_phase = second_phase.len(),
            "Starting run"
        );

        let mut ctx = ExecutionContext::new(caller, sink, &self.matchers, self.config, &mut state);
        for path in &paths {
            let operations: Vec<&PlaybookData> = contract
                .operations(path)
                .iter()
                .filter(|data| {
                    let supplied = self.selector.is_http_method_supplied(data.method);
                    if !supplied {
                        debug!(path = %path, method = %data.method, "HTTP method not selected, skipping operation");
                    }
                    supplied
                })
                .collect();
            if operations.is_empty() {
                debug!(path = %path, "No operation left for path, skipping");
                continue;
            }

            let methods: Vec<HttpMethod> = operations.iter().map(|d| d.method).collect();
            let playbooks = self.selector.filter_for_path(&methods, path);
            info!(path = %path, methods = ?methods, playbooks = playbooks.len(), "Fuzzing path");
            run_phase(&mut ctx, path, &playbooks, &operations);
            run_phase(&mut ctx, path, second_phase, &operations);
        }
        drop(ctx);

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Run finished");
        state
    }
}

fn run_phase(
    ctx: &mut ExecutionContext<'_>,
    path: &str,
    playbooks: &[PlaybookDescriptor],
    operations: &[&PlaybookData],
) {
    for playbook in playbooks {
        ctx.set_playbook(playbook.name);
        debug!(playbook = playbook.name, path, "Starting playbook");
        for data in operations {
            if playbook.skips(data.method) {
                debug!(playbook = playbook.name, path, method = %data.method, "Playbook skips HTTP method");
                continue;
            }
            if playbook.run_once_per_path && !ctx.state_mut().mark_executed_once(path, playbook.name) {
                debug!(playbook = playbook.name, path, "Playbook already ran for path");
                continue;
            }
            (playbook.run)(data, ctx);
        }
        debug!(playbook = playbook.name, path, "Finished playbook");
    }
}
