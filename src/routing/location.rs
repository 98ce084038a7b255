//! Location matching.
//!
//! # Responsibilities
//! - Parse and render the compact location pattern form
//! - Compile patterns once (regexes included) at activation time
//! - Match a request path against the ordered locations of a server
//!
//! # Pattern form
//! ```text
//! [!][TOKEN ]PATTERN
//!
//!   !      reverse: the location applies when the rule does NOT match
//!   =      exact
//!   =*     exact, case-insensitive
//!   *      prefix, case-insensitive
//!   ~      regex
//!   ~*     regex, case-insensitive
//!   (none) prefix
//! ```
//!
//! # Design Decisions
//! - First structural match wins; declaration order is preserved
//! - Named regex groups become route parameters
//! - Reverse matches never carry parameters

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LocationConfig;

/// Errors raised while compiling a location pattern.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PatternError {
    #[error("location pattern is empty")]
    Empty,

    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// How the bare pattern is compared with the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternType {
    #[default]
    Prefix,
    Exact,
    Regex,
}

impl PatternType {
    pub fn display_name(&self) -> &'static str {
        match self {
            PatternType::Prefix => "Prefix match",
            PatternType::Exact => "Exact match",
            PatternType::Regex => "Regular expression",
        }
    }
}

/// All pattern types with display names, for admin UIs.
pub fn all_pattern_types() -> Vec<(PatternType, &'static str)> {
    [PatternType::Prefix, PatternType::Exact, PatternType::Regex]
        .into_iter()
        .map(|kind| (kind, kind.display_name()))
        .collect()
}

/// Structured view of a location pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationPattern {
    pub pattern: String,
    pub kind: PatternType,
    pub case_insensitive: bool,
    pub reverse: bool,
}

impl LocationPattern {
    pub fn new(
        pattern: impl Into<String>,
        kind: PatternType,
        case_insensitive: bool,
        reverse: bool,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
            case_insensitive,
            reverse,
        }
    }

    /// Parse the compact form. Anything without a recognised token is a
    /// case-sensitive prefix.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let (reverse, rest) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };

        let (kind, case_insensitive, pattern) = match rest.split_once(char::is_whitespace) {
            Some((token, pattern)) => match token {
                "=" => (PatternType::Exact, false, pattern),
                "=*" => (PatternType::Exact, true, pattern),
                "*" => (PatternType::Prefix, true, pattern),
                "~" => (PatternType::Regex, false, pattern),
                "~*" => (PatternType::Regex, true, pattern),
                _ => (PatternType::Prefix, false, rest),
            },
            None => (PatternType::Prefix, false, rest),
        };

        Self::new(pattern.trim_start(), kind, case_insensitive, reverse)
    }
}

impl fmt::Display for LocationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reverse {
            f.write_str("!")?;
        }
        let token = match (self.kind, self.case_insensitive) {
            (PatternType::Prefix, false) => None,
            (PatternType::Prefix, true) => Some("*"),
            (PatternType::Exact, false) => Some("="),
            (PatternType::Exact, true) => Some("=*"),
            (PatternType::Regex, false) => Some("~"),
            (PatternType::Regex, true) => Some("~*"),
        };
        if let Some(token) = token {
            write!(f, "{token} ")?;
        }
        f.write_str(&self.pattern)
    }
}

/// Named captures produced by a regex location.
pub type Params = HashMap<String, String>;

/// A pattern ready for matching.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    source: LocationPattern,
    folded: String,
    regex: Option<Regex>,
}

impl CompiledPattern {
    pub fn compile(source: LocationPattern) -> Result<Self, PatternError> {
        if source.pattern.is_empty() {
            return Err(PatternError::Empty);
        }

        let regex = match source.kind {
            PatternType::Regex => {
                let expr = if source.case_insensitive {
                    format!("(?i){}", source.pattern)
                } else {
                    source.pattern.clone()
                };
                let regex = Regex::new(&expr).map_err(|e| PatternError::InvalidRegex {
                    pattern: source.pattern.clone(),
                    reason: e.to_string(),
                })?;
                Some(regex)
            }
            _ => None,
        };

        let folded = if source.case_insensitive {
            source.pattern.to_lowercase()
        } else {
            source.pattern.clone()
        };

        Ok(Self {
            source,
            folded,
            regex,
        })
    }

    pub fn source(&self) -> &LocationPattern {
        &self.source
    }

    /// The rule without the reverse flag applied.
    pub fn base_match(&self, path: &str) -> Option<Params> {
        if let Some(regex) = &self.regex {
            let captures = regex.captures(path)?;
            let params = regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    captures
                        .name(name)
                        .map(|m| (name.to_string(), m.as_str().to_string()))
                })
                .collect();
            return Some(params);
        }

        let matched = if self.source.case_insensitive {
            self.compare(&path.to_lowercase())
        } else {
            self.compare(path)
        };
        matched.then(Params::new)
    }

    /// The rule with the reverse flag applied.
    pub fn matches(&self, path: &str) -> Option<Params> {
        match (self.source.reverse, self.base_match(path)) {
            (false, found) => found,
            (true, Some(_)) => None,
            (true, None) => Some(Params::new()),
        }
    }

    fn compare(&self, path: &str) -> bool {
        match self.source.kind {
            PatternType::Exact => path == self.folded,
            PatternType::Prefix => path.starts_with(&self.folded),
            PatternType::Regex => false,
        }
    }
}

/// Result of matching a path against a server's locations.
#[derive(Debug, Clone)]
pub struct LocationMatch {
    pub location: Arc<LocationConfig>,
    /// Position of the location in declaration order.
    pub index: usize,
    pub params: Params,
}

#[derive(Debug)]
struct CompiledLocation {
    config: Arc<LocationConfig>,
    pattern: CompiledPattern,
}

/// Ordered, compiled locations of one server.
#[derive(Debug, Default)]
pub struct LocationMatcher {
    entries: Vec<CompiledLocation>,
}

impl LocationMatcher {
    /// Compile every location. The first bad pattern aborts compilation.
    pub fn compile(locations: &[LocationConfig]) -> Result<Self, PatternError> {
        let entries = locations
            .iter()
            .map(|config| {
                Ok(CompiledLocation {
                    pattern: CompiledPattern::compile(config.parsed_pattern())?,
                    config: Arc::new(config.clone()),
                })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First enabled location whose rule matches `path`.
    pub fn find(&self, path: &str) -> Option<LocationMatch> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.config.on)
            .find_map(|(index, entry)| {
                entry.pattern.matches(path).map(|params| LocationMatch {
                    location: entry.config.clone(),
                    index,
                    params,
                })
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(raw: &str) -> CompiledPattern {
        CompiledPattern::compile(LocationPattern::parse(raw)).unwrap()
    }

    #[test]
    fn test_parse_tokens() {
        let cases = vec![
            ("/api", PatternType::Prefix, false, false, "/api"),
            ("* /API", PatternType::Prefix, true, false, "/API"),
            ("= /login", PatternType::Exact, false, false, "/login"),
            ("=* /Login", PatternType::Exact, true, false, "/Login"),
            ("~ ^/v[0-9]+", PatternType::Regex, false, false, "^/v[0-9]+"),
            ("~* \\.php$", PatternType::Regex, true, false, "\\.php$"),
            ("!/admin", PatternType::Prefix, false, true, "/admin"),
            ("!~* ^/admin", PatternType::Regex, true, true, "^/admin"),
            ("/with space", PatternType::Prefix, false, false, "/with space"),
        ];

        for (raw, kind, ci, reverse, pattern) in cases {
            let parsed = LocationPattern::parse(raw);
            assert_eq!(parsed.kind, kind, "pattern '{}'", raw);
            assert_eq!(parsed.case_insensitive, ci, "pattern '{}'", raw);
            assert_eq!(parsed.reverse, reverse, "pattern '{}'", raw);
            assert_eq!(parsed.pattern, pattern, "pattern '{}'", raw);
        }
    }

    #[test]
    fn test_display_is_parseable() {
        for raw in ["/api", "* /api", "= /x", "=* /x", "~ ^/a", "~* ^/a", "!/admin", "!= /x"] {
            assert_eq!(LocationPattern::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_matching_rules() {
        let cases = vec![
            ("/api", "/api/users", true),
            ("/api", "/ap", false),
            ("/api", "/API/users", false),
            ("* /api", "/API/users", true),
            ("= /login", "/login", true),
            ("= /login", "/login/", false),
            ("=* /Login", "/LOGIN", true),
            ("~ ^/v[0-9]+/", "/v2/items", true),
            ("~ ^/v[0-9]+/", "/V2/items", false),
            ("~* ^/v[0-9]+/", "/V2/items", true),
            ("!/admin", "/admin/panel", false),
            ("!/admin", "/public", true),
        ];

        for (raw, path, expected) in cases {
            assert_eq!(
                compiled(raw).matches(path).is_some(),
                expected,
                "pattern: '{}', path: '{}'",
                raw,
                path
            );
        }
    }

    #[test]
    fn test_reverse_negates_base_match() {
        let paths = ["/", "/admin", "/admin/x", "/Admin", "/other"];
        for raw in ["/admin", "* /admin", "= /admin", "~ ^/adm"] {
            let base = compiled(raw);
            let reversed = compiled(&format!("!{raw}"));
            for path in paths {
                assert_eq!(
                    reversed.matches(path).is_some(),
                    base.base_match(path).is_none(),
                    "pattern: '{}', path: '{}'",
                    raw,
                    path
                );
            }
        }
    }

    #[test]
    fn test_named_captures() {
        let pattern = compiled("~ ^/users/(?P<id>[0-9]+)/posts/(?P<post>[a-z]+)$");
        let params = pattern.matches("/users/42/posts/intro").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["post"], "intro");

        assert!(compiled("!~ ^/users/(?P<id>[0-9]+)").matches("/other").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_regex_fails_compilation() {
        let err = CompiledPattern::compile(LocationPattern::parse("~ ^/[invalid")).unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));

        let err = CompiledPattern::compile(LocationPattern::parse("")).unwrap_err();
        assert_eq!(err, PatternError::Empty);
    }

    #[test]
    fn test_first_match_wins() {
        let locations = vec![
            LocationConfig {
                id: "first".into(),
                pattern: "/static".into(),
                ..LocationConfig::default()
            },
            LocationConfig {
                id: "second".into(),
                pattern: "~ ^/static/.*\\.css$".into(),
                ..LocationConfig::default()
            },
        ];
        let matcher = LocationMatcher::compile(&locations).unwrap();
        let found = matcher.find("/static/site.css").unwrap();
        assert_eq!(found.location.id, "first");
        assert_eq!(found.index, 0);
        assert!(matcher.find("/other").is_none());
    }

    #[test]
    fn test_disabled_locations_are_skipped() {
        let locations = vec![
            LocationConfig {
                on: false,
                id: "off".into(),
                pattern: "/".into(),
                ..LocationConfig::default()
            },
            LocationConfig {
                id: "on".into(),
                pattern: "/".into(),
                ..LocationConfig::default()
            },
        ];
        let matcher = LocationMatcher::compile(&locations).unwrap();
        assert_eq!(matcher.find("/x").unwrap().location.id, "on");
    }

    #[test]
    fn test_pattern_type_listing() {
        let types = all_pattern_types();
        assert_eq!(types.len(), 3);
        assert_eq!(types[0].0, PatternType::Prefix);
    }
}
