use crate::config::{EdgeSpacesStrategy, RunConfig, SanitizationStrategy};
use crate::http::HttpMethod;
use crate::playbook::{PlaybookDescriptor, PlaybookRegistry, PlaybookTag};
use once_cell::unsync::OnceCell;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Decides which playbooks run, in which phase, on which paths.
///
/// Every list is computed lazily on first use and then kept for the rest of
/// the run; the configuration it was built from never changes. Use
/// [`Selector::reset`] to drop the cached lists.
///
/// The caches are not synchronized: share a `Selector` across threads only
/// after wrapping it, or give each worker its own.
#[derive(Debug)]
pub struct Selector {
    registry: PlaybookRegistry,
    supplied_playbooks: Vec<String>,
    skip_playbooks: Vec<String>,
    skip_path_playbooks: BTreeMap<String, Vec<String>>,
    check_fields: bool,
    check_headers: bool,
    check_body: bool,
    include_emojis: bool,
    edge_spaces_strategy: EdgeSpacesStrategy,
    sanitization_strategy: SanitizationStrategy,
    paths: Vec<String>,
    skip_paths: Vec<String>,
    http_methods: Vec<HttpMethod>,
    all_registered: OnceCell<Vec<PlaybookDescriptor>>,
    first_phase: OnceCell<Vec<PlaybookDescriptor>>,
    second_phase: OnceCell<Vec<PlaybookDescriptor>>,
    paths_to_run: OnceCell<Vec<String>>,
}

impl Selector {
    pub fn new(registry: PlaybookRegistry, config: &RunConfig) -> Self {
        let (skip_playbooks, skip_path_playbooks) = parse_skip_playbooks(&config.filter.skip_playbooks);
        for playbook in registry.all() {
            if playbook.is_special() && playbook.is_stateful() {
                warn!(playbook = playbook.name, "Playbook is both special and stateful; it only runs when selected exclusively");
            }
        }

        Self {
            registry,
            supplied_playbooks: config
                .filter
                .playbooks
                .iter()
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
            skip_playbooks,
            skip_path_playbooks,
            check_fields: config.filter.check_fields,
            check_headers: config.filter.check_headers,
            check_body: config.filter.check_body,
            include_emojis: config.filter.include_emojis,
            edge_spaces_strategy: config.processing.edge_spaces_strategy,
            sanitization_strategy: config.processing.sanitization_strategy,
            paths: config.filter.paths.clone(),
            skip_paths: config.filter.skip_paths.clone(),
            http_methods: config.effective_http_methods(),
            all_registered: OnceCell::new(),
            first_phase: OnceCell::new(),
            second_phase: OnceCell::new(),
            paths_to_run: OnceCell::new(),
        }
    }

    /// Drops every cached list; the next call recomputes them.
    pub fn reset(&mut self) {
        self.all_registered.take();
        self.first_phase.take();
        self.second_phase.take();
        self.paths_to_run.take();
    }

    pub fn registry(&self) -> &PlaybookRegistry {
        &self.registry
    }

    /// All playbooks surviving the trim and sanitize strategy choice, sorted by name.
    pub fn all_registered(&self) -> &[PlaybookDescriptor] {
        self.all_registered.get_or_init(|| {
            let mut all: Vec<PlaybookDescriptor> = self
                .registry
                .all()
                .iter()
                .filter(|p| self.survives_strategies(p))
                .copied()
                .collect();
            all.sort_by(|a, b| a.name.cmp(b.name));
            all
        })
    }

    /// The phase-1 and phase-2 lists for this run.
    pub fn resolve_runnable(&self) -> (&[PlaybookDescriptor], &[PlaybookDescriptor]) {
        (self.first_phase(), self.second_phase())
    }

    pub fn first_phase(&self) -> &[PlaybookDescriptor] {
        self.first_phase.get_or_init(|| {
            let candidates = self.candidates_from_check_arguments();
            let candidates = self.keep_supplied(candidates);
            let candidates = self.remove_skipped(candidates);
            let only_special = contains_only_special(&candidates);
            let candidates = if only_special {
                candidates
            } else {
                candidates.into_iter().filter(|p| !p.is_special()).collect()
            };
            let names: Vec<&str> = candidates
                .into_iter()
                .filter(|p| self.survives_strategies(p))
                .map(|p| p.name)
                .collect();
            let second_phase = self.second_phase();

            self.all_registered()
                .iter()
                .filter(|p| names.contains(&p.name))
                .filter(|p| only_special || !p.is_stateful())
                .filter(|p| !second_phase.contains(p))
                .copied()
                .collect()
        })
    }

    pub fn second_phase(&self) -> &[PlaybookDescriptor] {
        self.second_phase.get_or_init(|| {
            if self.supplied_only_special() {
                return Vec::new();
            }
            self.all_registered()
                .iter()
                .filter(|p| p.is_stateful() && !p.is_special())
                .filter(|p| self.enabled_by_check_arguments(p))
                .filter(|p| !self.skip_playbooks.iter().any(|skip| p.name.contains(skip.as_str())))
                .filter(|p| {
                    self.supplied_playbooks.is_empty()
                        || self.supplied_playbooks.iter().any(|s| p.name.contains(s.as_str()))
                })
                .copied()
                .collect()
        })
    }

    /// Phase-1 playbooks applicable to `path` given the HTTP methods it exposes.
    ///
    /// Drops playbooks that skip every method present, and those excluded for
    /// this path through `path=playbook1,playbook2` skip entries.
    pub fn filter_for_path(&self, methods: &[HttpMethod], path: &str) -> Vec<PlaybookDescriptor> {
        let excluded = self.skip_path_playbooks.get(path);
        self.first_phase()
            .iter()
            .filter(|p| !methods.iter().all(|m| p.skips(*m)))
            .filter(|p| {
                excluded.is_none_or(|skips| !skips.iter().any(|s| p.name.contains(s.as_str())))
            })
            .copied()
            .collect()
    }

    /// True when the run was asked for linters only.
    pub fn is_linting(&self) -> bool {
        self.supplied_playbooks
            .iter()
            .any(|p| p.eq_ignore_ascii_case("Linter"))
    }

    /// HTTP methods allowed for the run, after removing skipped ones.
    pub fn http_methods(&self) -> &[HttpMethod] {
        &self.http_methods
    }

    pub fn is_http_method_supplied(&self, method: HttpMethod) -> bool {
        self.http_methods.contains(&method)
    }

    /// Contract paths to run: the supplied ones (wildcards expanded) or every
    /// contract path, minus skipped paths. Unknown paths are dropped.
    pub fn paths_to_run(&self, contract_paths: &[String]) -> &[String] {
        self.paths_to_run.get_or_init(|| {
            let mut supplied = resolve_wildcards(&self.paths, contract_paths);
            if self.paths.is_empty() {
                supplied.extend(contract_paths.iter().cloned());
            }
            let skipped = resolve_wildcards(&self.skip_paths, contract_paths);
            debug!(paths = ?supplied, "Supplied paths before filtering");

            let resolved: Vec<String> = supplied
                .into_iter()
                .filter(|p| !skipped.contains(p))
                .filter(|p| {
                    let known = contract_paths.contains(p);
                    if !known {
                        debug!(path = %p, "Supplied path is not matching the contract, skipping");
                    }
                    known
                })
                .collect();
            debug!(paths = ?resolved, "Supplied paths after filtering");
            resolved
        })
    }

    /// Playbooks counted in listings: excludes the alternative strategy
    /// variants, special playbooks and linters.
    pub fn total_playbooks(&self) -> usize {
        self.registry
            .all()
            .iter()
            .filter(|p| {
                !p.has_tag(PlaybookTag::TrimAndValidate)
                    && !p.has_tag(PlaybookTag::SanitizeAndValidate)
                    && !p.is_special()
                    && !p.has_tag(PlaybookTag::Linter)
            })
            .count()
    }

    fn candidates_from_check_arguments(&self) -> Vec<PlaybookDescriptor> {
        let mut candidates: Vec<PlaybookDescriptor> = Vec::new();
        for (enabled, tag) in [
            (self.check_fields, PlaybookTag::Field),
            (self.check_headers, PlaybookTag::Header),
            (self.check_body, PlaybookTag::Body),
        ] {
            if enabled {
                for playbook in self.registry.with_tag(tag) {
                    if !candidates.contains(playbook) {
                        candidates.push(*playbook);
                    }
                }
            }
        }
        if candidates.is_empty() {
            candidates = self.registry.all().to_vec();
        }
        if !self.include_emojis {
            candidates.retain(|p| !p.has_tag(PlaybookTag::Emoji));
        }
        candidates
    }

    fn enabled_by_check_arguments(&self, playbook: &PlaybookDescriptor) -> bool {
        let any_check = self.check_fields || self.check_headers || self.check_body;
        !any_check
            || (self.check_fields && playbook.has_tag(PlaybookTag::Field))
            || (self.check_headers && playbook.has_tag(PlaybookTag::Header))
            || (self.check_body && playbook.has_tag(PlaybookTag::Body))
    }

    fn keep_supplied(&self, candidates: Vec<PlaybookDescriptor>) -> Vec<PlaybookDescriptor> {
        if self.supplied_playbooks.is_empty() {
            return candidates;
        }
        candidates
            .into_iter()
            .filter(|p| self.supplied_playbooks.iter().any(|s| p.name.contains(s.as_str())))
            .collect()
    }

    fn remove_skipped(&self, candidates: Vec<PlaybookDescriptor>) -> Vec<PlaybookDescriptor> {
        candidates
            .into_iter()
            .filter(|p| {
                let skipped = self.skip_playbooks.iter().any(|s| p.name.contains(s.as_str()));
                if skipped {
                    debug!(playbook = p.name, "Playbook excluded by skip-playbooks");
                }
                !skipped
            })
            .collect()
    }

    fn supplied_only_special(&self) -> bool {
        let special: Vec<&str> = self
            .registry
            .all()
            .iter()
            .filter(|p| p.is_special())
            .map(|p| p.name)
            .collect();
        !self.supplied_playbooks.is_empty()
            && self
                .supplied_playbooks
                .iter()
                .all(|s| special.iter().any(|name| name.contains(s.as_str())))
    }

    fn survives_strategies(&self, playbook: &PlaybookDescriptor) -> bool {
        let dropped_trim = match self.edge_spaces_strategy {
            EdgeSpacesStrategy::TrimAndValidate => PlaybookTag::ValidateAndTrim,
            EdgeSpacesStrategy::ValidateAndTrim => PlaybookTag::TrimAndValidate,
        };
        let dropped_sanitize = match self.sanitization_strategy {
            SanitizationStrategy::SanitizeAndValidate => PlaybookTag::ValidateAndSanitize,
            SanitizationStrategy::ValidateAndSanitize => PlaybookTag::SanitizeAndValidate,
        };
        !playbook.has_tag(dropped_trim) && !playbook.has_tag(dropped_sanitize)
    }
}

fn contains_only_special(candidates: &[PlaybookDescriptor]) -> bool {
    !candidates.is_empty() && candidates.iter().all(|p| p.is_special())
}

/// Splits skip entries into global tokens and `path=playbook1,playbook2` entries.
fn parse_skip_playbooks(entries: &[String]) -> (Vec<String>, BTreeMap<String, Vec<String>>) {
    let mut global = Vec::new();
    let mut per_path: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for entry in entries.iter().map(|e| e.trim()).filter(|e| !e.is_empty()) {
        match entry.split_once('=') {
            Some((path, playbooks)) => {
                per_path.entry(path.trim().to_string()).or_default().extend(
                    playbooks
                        .split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(str::to_string),
                );
            }
            None => global.push(entry.to_string()),
        }
    }
    (global, per_path)
}

/// Expands `*` tokens against the contract paths; other tokens pass through.
///
/// `*` becomes `.*`, braces are escaped and the whole path must match.
/// The result keeps first-seen order without duplicates.
pub fn resolve_wildcards(tokens: &[String], contract_paths: &[String]) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::new();
    for token in tokens {
        if !token.contains('*') {
            if !resolved.contains(token) {
                resolved.push(token.clone());
            }
            continue;
        }
        let pattern = format!(
            "^(?:{})$",
            token.replace('*', ".*").replace('{', "\\{").replace('}', "\\}")
        );
        let regex = match Regex::new(&pattern) {
            Ok(regex) => regex,
            Err(e) => {
                debug!(token = %token, error = %e, "Invalid wildcard path, ignoring");
                continue;
            }
        };
        for path in contract_paths.iter().filter(|p| regex.is_match(p)) {
            if !resolved.contains(path) {
                resolved.push(path.clone());
            }
        }
    }
    debug!(paths = ?resolved, "Final list of matching wildcard paths");
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{descriptor, test_registry};

    fn make_selector(configure: impl FnOnce(&mut RunConfig)) -> Selector {
        let mut config = RunConfig::default();
        configure(&mut config);
        Selector::new(test_registry(), &config)
    }

    fn names(list: &[PlaybookDescriptor]) -> Vec<&'static str> {
        list.iter().map(|p| p.name).collect()
    }

    #[test]
    fn phases_never_overlap() {
        let configurations: Vec<Box<dyn Fn(&mut RunConfig)>> = vec![
            Box::new(|_| {}),
            Box::new(|c| c.filter.playbooks = vec!["Deleted".into()]),
            Box::new(|c| c.filter.playbooks = vec!["Headers".into(), "Resources".into()]),
            Box::new(|c| c.filter.check_body = true),
            Box::new(|c| c.filter.skip_playbooks = vec!["Empty".into()]),
        ];
        for configure in configurations {
            let mut config = RunConfig::default();
            configure(&mut config);
            let selector = Selector::new(test_registry(), &config);
            let (first, second) = selector.resolve_runnable();
            for playbook in first {
                assert!(!second.contains(playbook), "{} is in both phases", playbook.name);
            }
        }
    }

    #[test]
    fn stateful_playbooks_run_in_second_phase() {
        let selector = make_selector(|_| {});
        assert_eq!(names(selector.second_phase()), vec!["DeletedResourcesNotAvailable"]);
        assert!(!names(selector.first_phase()).contains(&"DeletedResourcesNotAvailable"));
    }

    #[test]
    fn check_headers_selects_only_header_playbooks() {
        let selector = make_selector(|c| c.filter.check_headers = true);
        assert!(!selector.first_phase().is_empty());
        assert!(selector.first_phase().iter().all(|p| p.has_tag(PlaybookTag::Header)));
        assert!(selector.second_phase().is_empty());
    }

    #[test]
    fn supplied_playbooks_match_partially() {
        let selector = make_selector(|c| c.filter.playbooks = vec!["Headers".into()]);
        assert_eq!(
            names(selector.first_phase()),
            vec!["EmptyStringsInHeaders", "LeadingSpacesInHeaders", "RemoveHeaders"]
        );
    }

    #[test]
    fn skip_playbooks_remove_by_substring() {
        let selector = make_selector(|c| c.filter.skip_playbooks = vec!["Headers".into()]);
        assert!(selector.first_phase().iter().all(|p| !p.name.contains("Headers")));
    }

    #[test]
    fn special_playbooks_need_exclusive_selection() {
        let selector = make_selector(|_| {});
        assert!(!names(selector.first_phase()).contains(&"Random"));

        let selector = selector_with(vec!["Random"]);
        assert_eq!(names(selector.first_phase()), vec!["Random"]);
        assert!(selector.second_phase().is_empty());

        let selector = selector_with(vec!["Random", "HappyPath"]);
        assert_eq!(names(selector.first_phase()), vec!["HappyPath"]);
    }

    fn selector_with(playbooks: Vec<&str>) -> Selector {
        make_selector(|c| c.filter.playbooks = playbooks.into_iter().map(String::from).collect())
    }

    #[test]
    fn linter_selection_keeps_only_linters() {
        let mut registry = test_registry().all().to_vec();
        registry.push(descriptor(
            "PathTagsLinter",
            &[PlaybookTag::Special, PlaybookTag::Linter],
        ));
        let mut config = RunConfig::default();
        config.filter.playbooks = vec!["Linter".into()];
        let selector = Selector::new(PlaybookRegistry::new(registry), &config);

        assert!(selector.is_linting());
        assert_eq!(names(selector.first_phase()), vec!["PathTagsLinter"]);
        assert!(selector.first_phase().iter().all(|p| p.name.contains("Linter")));
        assert!(selector.second_phase().is_empty());
    }

    #[test]
    fn exactly_one_trim_variant_survives() {
        let selector = make_selector(|_| {});
        let first = names(selector.first_phase());
        assert!(first.contains(&"LeadingSpacesInHeaders"));
        assert!(!first.contains(&"LeadingSpacesInHeadersValidateTrim"));

        let selector = make_selector(|c| {
            c.processing.edge_spaces_strategy = EdgeSpacesStrategy::ValidateAndTrim
        });
        let first = names(selector.first_phase());
        assert!(!first.contains(&"LeadingSpacesInHeaders"));
        assert!(first.contains(&"LeadingSpacesInHeadersValidateTrim"));
    }

    #[test]
    fn exactly_one_sanitize_variant_survives() {
        let selector = make_selector(|c| {
            c.processing.sanitization_strategy = SanitizationStrategy::ValidateAndSanitize
        });
        let first = names(selector.first_phase());
        assert!(first.contains(&"ZalgoTextInFieldsValidateSanitize"));
        assert!(!first.contains(&"ZalgoTextInFieldsSanitizeValidate"));
    }

    #[test]
    fn emoji_playbooks_can_be_excluded() {
        let selector = make_selector(|c| c.filter.include_emojis = false);
        assert!(selector.first_phase().iter().all(|p| !p.has_tag(PlaybookTag::Emoji)));
        let selector = make_selector(|_| {});
        assert!(selector.first_phase().iter().any(|p| p.has_tag(PlaybookTag::Emoji)));
    }

    #[test]
    fn per_path_skips_and_method_filters_apply() {
        let selector = make_selector(|c| {
            c.filter.skip_playbooks = vec!["/pets=EmptyStrings, Remove".into()]
        });
        let for_pets = names(&selector.filter_for_path(&[HttpMethod::Post], "/pets"));
        assert!(!for_pets.contains(&"EmptyStringsInHeaders"));
        assert!(!for_pets.contains(&"RemoveHeaders"));
        let for_owners = names(&selector.filter_for_path(&[HttpMethod::Post], "/owners"));
        assert!(for_owners.contains(&"EmptyStringsInHeaders"));

        let get_only = names(&selector.filter_for_path(&[HttpMethod::Get], "/owners"));
        assert!(!get_only.contains(&"EmptyJsonBody"));
        let mixed = names(&selector.filter_for_path(&[HttpMethod::Get, HttpMethod::Post], "/owners"));
        assert!(mixed.contains(&"EmptyJsonBody"));
    }

    #[test]
    fn wildcards_resolve_against_contract_paths() {
        let contract: Vec<String> = vec!["/pets", "/pets/{id}", "/pets/{id}/toys", "/owners"]
            .into_iter()
            .map(String::from)
            .collect();
        let resolved = resolve_wildcards(&["/pets/*".to_string(), "/pets/{id}".to_string()], &contract);
        assert_eq!(resolved, vec!["/pets/{id}", "/pets/{id}/toys"]);
        let resolved = resolve_wildcards(&["*".to_string()], &contract);
        assert_eq!(resolved, contract);
        let resolved = resolve_wildcards(&["/unknown".to_string()], &contract);
        assert_eq!(resolved, vec!["/unknown"]);
    }

    #[test]
    fn paths_to_run_drop_skipped_and_unknown_paths() {
        let contract: Vec<String> = vec!["/pets", "/pets/{id}", "/owners"]
            .into_iter()
            .map(String::from)
            .collect();
        let selector = make_selector(|c| {
            c.filter.paths = vec!["/pets*".into(), "/missing".into()];
            c.filter.skip_paths = vec!["/pets/{id}".into()];
        });
        assert_eq!(selector.paths_to_run(&contract), ["/pets".to_string()]);

        let selector = make_selector(|_| {});
        assert_eq!(selector.paths_to_run(&contract).len(), 3);
    }

    #[test]
    fn caches_are_kept_until_reset() {
        let mut selector = make_selector(|_| {});
        let first = selector.first_phase().as_ptr();
        assert_eq!(first, selector.first_phase().as_ptr());
        selector.reset();
        assert!(!selector.first_phase().is_empty());
    }

    #[test]
    fn skip_http_methods_narrow_the_method_list() {
        let selector = make_selector(|c| c.filter.skip_http_methods = vec![HttpMethod::Trace]);
        assert!(!selector.is_http_method_supplied(HttpMethod::Trace));
        assert!(selector.is_http_method_supplied(HttpMethod::Get));
    }
}
