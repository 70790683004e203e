use crate::error::ConfigError;
use std::fmt;
use std::str::FromStr;

/// The predefined response code families playbooks can expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedFamily {
    TwoXx,
    FourXx,
    /// 401 or 403.
    FourXxAuth,
    /// 406 or 415.
    FourXxMediaType,
    FourXxNotFoundOrValidation,
    FourHundredOrFiveHundredOne,
    FourXxOrTwoXx,
}

impl PredefinedFamily {
    const ALL: [PredefinedFamily; 7] = [
        PredefinedFamily::TwoXx,
        PredefinedFamily::FourXx,
        PredefinedFamily::FourXxAuth,
        PredefinedFamily::FourXxMediaType,
        PredefinedFamily::FourXxNotFoundOrValidation,
        PredefinedFamily::FourHundredOrFiveHundredOne,
        PredefinedFamily::FourXxOrTwoXx,
    ];

    pub fn token(&self) -> &'static str {
        match self {
            PredefinedFamily::TwoXx => "2XX",
            PredefinedFamily::FourXx => "4XX",
            PredefinedFamily::FourXxAuth => "4XX_AA",
            PredefinedFamily::FourXxMediaType => "4XX_MT",
            PredefinedFamily::FourXxNotFoundOrValidation => "4XX_NF_AND_VALIDATION",
            PredefinedFamily::FourHundredOrFiveHundredOne => "400_501",
            PredefinedFamily::FourXxOrTwoXx => "4XX_2XX",
        }
    }

    pub fn allowed_codes(&self) -> &'static [&'static str] {
        match self {
            PredefinedFamily::TwoXx => &["2XX"],
            PredefinedFamily::FourXx => &["4XX"],
            PredefinedFamily::FourXxAuth => &["401", "403"],
            PredefinedFamily::FourXxMediaType => &["406", "415"],
            PredefinedFamily::FourXxNotFoundOrValidation => &["400", "404", "422"],
            PredefinedFamily::FourHundredOrFiveHundredOne => &["400", "501"],
            PredefinedFamily::FourXxOrTwoXx => &["4XX", "2XX"],
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|family| family.token().eq_ignore_ascii_case(token))
    }
}

/// What a playbook expects the service to answer.
///
/// Either one of the predefined families or a dynamic list of literal codes
/// and ranges, usually coming from per-playbook configuration overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResponseCodeFamily {
    Predefined(PredefinedFamily),
    Dynamic(Vec<String>),
}

impl ResponseCodeFamily {
    pub const TWO_XX: ResponseCodeFamily = ResponseCodeFamily::Predefined(PredefinedFamily::TwoXx);
    pub const FOUR_XX: ResponseCodeFamily = ResponseCodeFamily::Predefined(PredefinedFamily::FourXx);

    pub fn predefined(family: PredefinedFamily) -> Self {
        ResponseCodeFamily::Predefined(family)
    }

    /// Builds a dynamic family from a comma separated list such as `400,422`.
    ///
    /// Entries that are not three characters long are dropped.
    pub fn from_code_list(codes: &str) -> Result<Self, ConfigError> {
        let parsed: Vec<String> = codes
            .split(',')
            .map(str::trim)
            .filter(|code| code.len() == 3)
            .map(str::to_string)
            .collect();
        if parsed.is_empty() {
            return Err(ConfigError::InvalidResponseCode(codes.to_string()));
        }
        Ok(ResponseCodeFamily::Dynamic(parsed))
    }

    pub fn as_str(&self) -> String {
        match self {
            ResponseCodeFamily::Predefined(family) => family.token().to_string(),
            ResponseCodeFamily::Dynamic(codes) => codes.join(", "),
        }
    }

    pub fn allowed_codes(&self) -> Vec<String> {
        match self {
            ResponseCodeFamily::Predefined(family) => {
                family.allowed_codes().iter().map(|c| c.to_string()).collect()
            }
            ResponseCodeFamily::Dynamic(codes) => codes.clone(),
        }
    }

    pub fn matches_allowed(&self, code: &str) -> bool {
        self.allowed_codes()
            .iter()
            .any(|allowed| match_as_code_or_range(allowed, code))
    }

    /// The family expected after removing fields or headers: `4XX` when
    /// anything required was removed, `2XX` otherwise.
    pub fn for_required_removed(required_removed: bool) -> Self {
        if required_removed {
            ResponseCodeFamily::FOUR_XX
        } else {
            ResponseCodeFamily::TWO_XX
        }
    }
}

impl fmt::Display for ResponseCodeFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.allowed_codes().join(", "))
    }
}

impl FromStr for ResponseCodeFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match PredefinedFamily::from_token(s.trim()) {
            Some(family) => Ok(ResponseCodeFamily::Predefined(family)),
            None => ResponseCodeFamily::from_code_list(s),
        }
    }
}

/// Matches `actual` against a literal code (`404`), a range (`4xx`, `4XX`)
/// or the token of a predefined family (`4XX_AA`).
pub fn match_as_code_or_range(expected: &str, actual: &str) -> bool {
    let expected = expected.trim();
    if expected == actual {
        return true;
    }
    let lowered = expected.to_ascii_lowercase();
    if lowered.len() == 3 && lowered.ends_with("xx") {
        return expected.chars().next() == actual.chars().next();
    }
    match PredefinedFamily::from_token(expected) {
        Some(family) => family
            .allowed_codes()
            .iter()
            .any(|code| match_as_code_or_range(code, actual)),
        None => false,
    }
}

pub fn is_2xx(code: u16) -> bool {
    (200..300).contains(&code)
}

pub fn is_4xx(code: u16) -> bool {
    (400..500).contains(&code)
}

pub fn is_unimplemented(code: u16) -> bool {
    code == 501
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranges_match_on_first_digit_case_insensitively() {
        assert!(match_as_code_or_range("4xx", "404"));
        assert!(match_as_code_or_range("4XX", "499"));
        assert!(!match_as_code_or_range("404", "405"));
        assert!(match_as_code_or_range("404", "404"));
    }

    #[test]
    fn no_token_in_a_list_matches_a_server_error() {
        for token in "2xx,4xx".split(',') {
            assert!(!match_as_code_or_range(token, "500"), "{token} should not match 500");
        }
    }

    #[test]
    fn predefined_family_tokens_match_their_members() {
        assert!(match_as_code_or_range("4XX_AA", "403"));
        assert!(!match_as_code_or_range("4XX_AA", "400"));
        assert!(match_as_code_or_range("4XX_2XX", "201"));
    }

    #[test]
    fn families_check_allowed_codes() {
        assert!(ResponseCodeFamily::TWO_XX.matches_allowed("204"));
        assert!(!ResponseCodeFamily::TWO_XX.matches_allowed("400"));
        let media = ResponseCodeFamily::predefined(PredefinedFamily::FourXxMediaType);
        assert!(media.matches_allowed("415"));
        assert!(!media.matches_allowed("400"));
    }

    #[test]
    fn dynamic_families_drop_malformed_entries() {
        let family = ResponseCodeFamily::from_code_list("201, 202,20,abcd").unwrap();
        assert_eq!(family.allowed_codes(), vec!["201", "202"]);
        assert_eq!(family.as_str(), "201, 202");
        assert!(ResponseCodeFamily::from_code_list("1,2").is_err());
    }

    #[test]
    fn parsing_prefers_predefined_tokens() {
        let parsed: ResponseCodeFamily = "4xx_mt".parse().unwrap();
        assert_eq!(parsed, ResponseCodeFamily::predefined(PredefinedFamily::FourXxMediaType));
        let parsed: ResponseCodeFamily = "400,501".parse().unwrap();
        assert_eq!(parsed, ResponseCodeFamily::Dynamic(vec!["400".into(), "501".into()]));
    }

    #[test]
    fn required_removal_flips_the_family() {
        assert_eq!(ResponseCodeFamily::for_required_removed(true), ResponseCodeFamily::FOUR_XX);
        assert_eq!(ResponseCodeFamily::for_required_removed(false), ResponseCodeFamily::TWO_XX);
    }
}
