//! Server name matching.
//!
//! Names are compared case-sensitively. An exact match wins outright;
//! otherwise names are compared segment by segment on `.`, where a `*` or
//! empty segment matches any single label.

use serde::Serialize;

/// Outcome of a successful name match.
///
/// `requested` is the host the client asked for, `pattern` the configured
/// name that accepted it. Both are equal on an exact match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NameMatch {
    pub requested: String,
    pub pattern: String,
    pub exact: bool,
}

impl NameMatch {
    /// The configured literal, only known for exact matches.
    pub fn literal(&self) -> Option<&str> {
        self.exact.then_some(self.pattern.as_str())
    }
}

/// Match `host` against the configured `names`. An empty host never matches
/// and empty names are ignored.
pub fn match_name(names: &[String], host: &str) -> Option<NameMatch> {
    if host.is_empty() {
        return None;
    }
    let names = || names.iter().filter(|name| !name.is_empty());

    if let Some(name) = names().find(|name| name.as_str() == host) {
        return Some(NameMatch {
            requested: host.to_string(),
            pattern: name.clone(),
            exact: true,
        });
    }

    names()
        .find(|name| segments_match(name, host))
        .map(|name| NameMatch {
            requested: host.to_string(),
            pattern: name.clone(),
            exact: false,
        })
}

fn segments_match(pattern: &str, host: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let host: Vec<&str> = host.split('.').collect();
    if pattern.len() != host.len() {
        return false;
    }
    pattern
        .iter()
        .zip(&host)
        .all(|(p, h)| p.is_empty() || *p == "*" || p == h)
}

/// First configured name without a wildcard, for display.
pub fn first_name(names: &[String]) -> Option<&str> {
    names
        .iter()
        .map(String::as_str)
        .find(|name| !name.contains('*'))
}

/// Drop a trailing `:port` from a Host header value. Bracketed IPv6
/// literals keep their brackets.
pub fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !name.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => {
            name
        }
        _ => host,
    }
}
