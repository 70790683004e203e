use crate::executor::ExecutionContext;
use crate::http::HttpMethod;
use crate::model::PlaybookData;
use std::fmt;

/// Category markers attached to a playbook. Selection is a filter over these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaybookTag {
    Field,
    Header,
    Body,
    /// Runs in the second phase, after every stateless playbook for the path.
    Stateful,
    /// Only runs when explicitly and exclusively selected.
    Special,
    TrimAndValidate,
    ValidateAndTrim,
    SanitizeAndValidate,
    ValidateAndSanitize,
    Emoji,
    Linter,
}

impl PlaybookTag {
    pub fn name(&self) -> &'static str {
        match self {
            PlaybookTag::Field => "field",
            PlaybookTag::Header => "header",
            PlaybookTag::Body => "body",
            PlaybookTag::Stateful => "stateful",
            PlaybookTag::Special => "special",
            PlaybookTag::TrimAndValidate => "trim-and-validate",
            PlaybookTag::ValidateAndTrim => "validate-and-trim",
            PlaybookTag::SanitizeAndValidate => "sanitize-and-validate",
            PlaybookTag::ValidateAndSanitize => "validate-and-sanitize",
            PlaybookTag::Emoji => "emoji",
            PlaybookTag::Linter => "linter",
        }
    }
}

pub type PlaybookRun = fn(&PlaybookData, &mut ExecutionContext<'_>);

/// A registered playbook: a name, its tags and the function that runs it.
#[derive(Clone, Copy)]
pub struct PlaybookDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub tags: &'static [PlaybookTag],
    pub skip_for_methods: &'static [HttpMethod],
    /// Executes at most once per contract path, whatever the number of operations.
    pub run_once_per_path: bool,
    pub run: PlaybookRun,
}

impl PlaybookDescriptor {
    pub fn has_tag(&self, tag: PlaybookTag) -> bool {
        self.tags.contains(&tag)
    }

    pub fn is_special(&self) -> bool {
        self.has_tag(PlaybookTag::Special)
    }

    pub fn is_stateful(&self) -> bool {
        self.has_tag(PlaybookTag::Stateful)
    }

    pub fn skips(&self, method: HttpMethod) -> bool {
        self.skip_for_methods.contains(&method)
    }
}

impl fmt::Debug for PlaybookDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybookDescriptor")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("skip_for_methods", &self.skip_for_methods)
            .finish()
    }
}

impl PartialEq for PlaybookDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for PlaybookDescriptor {}

impl fmt::Display for PlaybookDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The closed table of playbooks available to a run.
#[derive(Debug, Clone, Default)]
pub struct PlaybookRegistry {
    playbooks: Vec<PlaybookDescriptor>,
}

impl PlaybookRegistry {
    pub fn new(playbooks: Vec<PlaybookDescriptor>) -> Self {
        Self { playbooks }
    }

    /// Every built-in playbook.
    pub fn builtin() -> Self {
        Self::new(crate::playbooks::builtin())
    }

    pub fn all(&self) -> &[PlaybookDescriptor] {
        &self.playbooks
    }

    pub fn find(&self, name: &str) -> Option<&PlaybookDescriptor> {
        self.playbooks.iter().find(|p| p.name == name)
    }

    pub fn with_tag(&self, tag: PlaybookTag) -> impl Iterator<Item = &PlaybookDescriptor> {
        self.playbooks.iter().filter(move |p| p.has_tag(tag))
    }

    pub fn len(&self) -> usize {
        self.playbooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.playbooks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_names_are_unique() {
        let registry = PlaybookRegistry::builtin();
        let mut names: Vec<&str> = registry.all().iter().map(|p| p.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total, "Duplicate playbook names in the registry");
    }

    #[test]
    fn builtin_playbooks_are_categorized() {
        let registry = PlaybookRegistry::builtin();
        for playbook in registry.all() {
            let categorized = [
                PlaybookTag::Field,
                PlaybookTag::Header,
                PlaybookTag::Body,
                PlaybookTag::Stateful,
                PlaybookTag::Special,
            ]
            .iter()
            .any(|tag| playbook.has_tag(*tag));
            assert!(categorized, "{} has no category tag", playbook.name);
        }
    }

    #[test]
    fn no_builtin_playbook_is_both_special_and_stateful() {
        let registry = PlaybookRegistry::builtin();
        assert!(
            registry
                .all()
                .iter()
                .all(|p| !(p.is_special() && p.is_stateful()))
        );
    }
}
