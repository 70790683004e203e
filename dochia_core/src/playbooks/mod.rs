//! The built-in playbook catalog.
//!
//! Each submodule contributes descriptors for one category; [`builtin`]
//! concatenates them into the table the registry is built from.

use crate::playbook::PlaybookDescriptor;

mod body;
mod fields;
mod headers;
mod special;
mod stateful;

/// Whitespace prefixed to header values. Carriage returns are left out, the
/// transport rejects them outright.
pub(crate) const HEADER_SPACES: [&str; 5] = [" ", "\t", "\u{00A0}", "\u{2007}", "\u{202F}"];

/// Whitespace prefixed to field values.
pub(crate) const FIELD_SPACES: [&str; 7] =
    [" ", "\t", "\r", "\n", "\u{00A0}", "\u{2007}", "\u{202F}"];

pub(crate) const SINGLE_CODE_POINT_EMOJIS: [&str; 4] =
    ["\u{1F680}", "\u{1F47B}", "\u{1F4A9}", "\u{1F60A}"];

/// A short word buried under stacked combining marks.
pub(crate) const ZALGO_TEXT: &str = "d\u{0336}\u{0310}\u{0351}\u{0355}\u{0330}o\u{0337}\u{033E}\u{0346}\u{0353}\u{0347}c\u{0335}\u{0309}\u{034C}\u{031F}\u{0329}h\u{0338}\u{0302}\u{0317}\u{0333}i\u{0334}\u{0308}\u{0323}a\u{0336}\u{030B}\u{0354}";

/// Payloads with nothing to mutate.
pub(crate) fn is_empty_payload(payload: &str) -> bool {
    matches!(payload.trim(), "" | "{}" | "[]" | "null")
}

pub(crate) fn large_string(size: usize) -> String {
    "a".repeat(size)
}

pub fn builtin() -> Vec<PlaybookDescriptor> {
    let mut all = Vec::new();
    all.extend(headers::playbooks());
    all.extend(fields::playbooks());
    all.extend(body::playbooks());
    all.extend(stateful::playbooks());
    all.extend(special::playbooks());
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::PlaybookTag;

    #[test]
    fn catalog_covers_every_category() {
        let all = builtin();
        for tag in [
            PlaybookTag::Header,
            PlaybookTag::Field,
            PlaybookTag::Body,
            PlaybookTag::Stateful,
            PlaybookTag::Special,
        ] {
            assert!(all.iter().any(|p| p.has_tag(tag)), "No playbook tagged {}", tag.name());
        }
        assert!(all.iter().all(|p| !p.description.is_empty()));
    }

    #[test]
    fn zalgo_text_is_mostly_combining_marks() {
        let letters = ZALGO_TEXT.chars().filter(|c| c.is_ascii_alphabetic()).count();
        assert_eq!(letters, 6);
        assert!(ZALGO_TEXT.chars().count() > 3 * letters);
        assert_eq!(large_string(5), "aaaaa");
    }
}
