//! No-proxy exception matching
//!
//! An exception list is a comma-separated string of patterns evaluated against
//! the candidate `host` or `host:port` (the port segment is present only when the
//! request names one explicitly). A destination matching any pattern bypasses the
//! proxy and is connected to directly.
//!
//! Pattern grammar, checked in this order:
//! - `*` matches everything
//! - `prefix*` matches candidates starting with `prefix`
//! - `*suffix` matches candidates ending with `suffix`
//! - `*infix*` matches candidates containing `infix`
//! - anything else is an unanchored regular expression searched in the candidate
//!
//! Patterns are compiled once; evaluation never allocates beyond the candidate.

use regex::Regex;
use tracing::warn;

use crate::env::ProxyEnv;

/// One compiled exception pattern
#[derive(Debug, Clone)]
pub enum NoProxyRule {
    MatchAll,
    Prefix(String),
    Suffix(String),
    Contains(String),
    Pattern(Regex),
}

impl NoProxyRule {
    /// Compile a single trimmed, non-empty entry
    pub fn compile(entry: &str) -> Self {
        if entry == "*" {
            return NoProxyRule::MatchAll;
        }

        let leading = entry.starts_with('*');
        let trailing = entry.ends_with('*');

        match (leading, trailing) {
            (false, true) => NoProxyRule::Prefix(entry[..entry.len() - 1].to_string()),
            (true, false) => NoProxyRule::Suffix(entry[1..].to_string()),
            (true, true) => NoProxyRule::Contains(entry[1..entry.len() - 1].to_string()),
            (false, false) => match Regex::new(entry) {
                Ok(re) => NoProxyRule::Pattern(re),
                Err(e) => {
                    warn!(
                        "no_proxy entry {:?} is not a valid pattern ({}), matching it literally",
                        entry, e
                    );
                    NoProxyRule::Contains(entry.to_string())
                }
            },
        }
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            NoProxyRule::MatchAll => true,
            NoProxyRule::Prefix(prefix) => candidate.starts_with(prefix.as_str()),
            NoProxyRule::Suffix(suffix) => candidate.ends_with(suffix.as_str()),
            NoProxyRule::Contains(infix) => candidate.contains(infix.as_str()),
            NoProxyRule::Pattern(re) => re.is_match(candidate),
        }
    }
}

/// Compiled exception list. An empty list proxies everything.
#[derive(Debug, Clone, Default)]
pub struct NoProxy {
    entries: Vec<String>,
    rules: Vec<NoProxyRule>,
}

impl NoProxy {
    /// Parse a comma-separated exception list
    pub fn parse(list: &str) -> Self {
        let entries: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();

        let rules = entries.iter().map(|e| NoProxyRule::compile(e)).collect();

        Self { entries, rules }
    }

    /// Use the explicit list when it has content, otherwise `NO_PROXY`/`no_proxy`
    pub fn resolve(explicit: Option<&str>, env: &ProxyEnv) -> Self {
        match explicit.filter(|s| !s.trim().is_empty()).or_else(|| env.no_proxy()) {
            Some(list) => Self::parse(list),
            None => Self::default(),
        }
    }

    /// Whether a connection to `host` (and explicit `port`, if any) goes through the proxy
    pub fn should_use_proxy(&self, host: &str, port: Option<u16>) -> bool {
        if self.rules.is_empty() {
            return true;
        }

        !self.matches(&candidate(host, port))
    }

    /// Whether any rule matches the candidate string
    pub fn matches(&self, candidate: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(candidate))
    }

    pub fn rules(&self) -> &[NoProxyRule] {
        &self.rules
    }

    /// The trimmed entries the rules were compiled from
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }
}

/// Build the string exception patterns are matched against
pub fn candidate(host: &str, port: Option<u16>) -> String {
    match port {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}
