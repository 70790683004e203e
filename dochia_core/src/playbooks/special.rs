use super::is_empty_payload;
use crate::executor::{ExecutionContext, ResponseProcessor, SimpleExecutorContext, execute_simple};
use crate::model::PlaybookData;
use crate::mutator::builtin_mutators;
use crate::playbook::{PlaybookDescriptor, PlaybookTag};
use crate::strategy::is_field_in_json;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use std::cell::Cell;
use tracing::{debug, error, info, warn};

pub(super) fn playbooks() -> Vec<PlaybookDescriptor> {
    vec![PlaybookDescriptor {
        name: "Random",
        description: "continuously fuzz random fields with random values based on registered mutators",
        tags: &[PlaybookTag::Special],
        skip_for_methods: &[],
        run_once_per_path: false,
        run: random,
    }]
}

fn random(data: &PlaybookData, ctx: &mut ExecutionContext<'_>) {
    if is_empty_payload(&data.payload) {
        error!(playbook = ctx.playbook(), path = %data.path, "Skipping playbook as payload is empty");
        return;
    }
    let fields: Vec<String> = data
        .all_fields()
        .into_iter()
        .filter(|f| is_field_in_json(&data.payload, f))
        .collect();
    if fields.is_empty() {
        warn!(path = %data.path, "No payload field can be mutated");
        return;
    }
    if !ctx.matchers().is_any_supplied() {
        warn!("No match arguments supplied; every random response will be skipped");
    }

    let processing = &ctx.config().processing;
    let seed = processing.random_seed.unwrap_or_else(rand::random);
    info!(seed, path = %data.path, method = %data.method, "Starting random fuzzing");
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mutators = builtin_mutators::<ChaCha8Rng>();

    let errors = Cell::new(0u64);
    let mut mutations = 0u64;
    while mutations < processing.stop_after_mutations
        && (processing.stop_after_errors == 0 || errors.get() < processing.stop_after_errors)
    {
        let field = &fields[rng.random_range(0..fields.len())];
        let mutator = &mutators[rng.random_range(0..mutators.len())];
        debug!(field = %field, mutator = mutator.name(), "Selected field and mutator");

        let payload = mutator.mutate_payload(&data.payload, field, &mut rng);
        let headers = mutator.mutate_headers(&data.headers, &mut rng);
        let errors = &errors;
        let processor: ResponseProcessor<'_> = Box::new(move |ctx, response, _| {
            if ctx.matchers().is_match_response(response) {
                errors.set(errors.get() + 1);
                let message = format!("Response matches{}", ctx.matchers().match_string());
                ctx.sink().report_error("Response matches arguments", message);
            } else {
                ctx.sink()
                    .skip_test("Skipping test as response does not match given matchers!");
            }
        });

        execute_simple(
            ctx,
            SimpleExecutorContext::processed_by(
                data,
                format!(
                    "Send a random payload mutating field [{field}] with [{}] mutator",
                    mutator.description()
                ),
                processor,
            )
            .with_payload(payload)
            .with_headers(headers)
            .with_expected_specific_response_code("a response that doesn't match given --matchXXX arguments"),
        );
        mutations += 1;
    }
    info!(mutations, errors = errors.get(), "Random fuzzing finished");
}
