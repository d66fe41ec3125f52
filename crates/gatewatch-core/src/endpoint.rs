//! Endpoint blocking rules.
//!
//! Paths are compared after stripping leading slashes and lower-casing.
//! A literal rule blocks the path itself and everything below it
//! (`health` blocks `health` and `health/live`, not `healthcheck`). A rule
//! containing `*` is a prefix rule: the first `*` is removed and every path
//! starting with the remaining text is blocked, so `admin/*` blocks
//! `admin/users` and `v1*internal` blocks `v1internal/keys`.

use thiserror::Error;

/// Endpoint patterns blocked when no list is configured.
pub const DEFAULT_BLOCKED_ENDPOINTS: &[&str] =
    &["health", "status", "ping", "admin/*", "internal/*"];

const WILDCARD: char = '*';

/// Reason a pattern was rejected at load time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// Pattern is blank after trimming
    #[error("endpoint pattern is empty")]
    Empty,
}

/// A single compiled endpoint rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointRule {
    /// Blocks the path and its sub-paths
    Literal(String),
    /// Blocks every path starting with the prefix
    Prefix(String),
}

impl EndpointRule {
    /// Compile a pattern. Surrounding whitespace and leading slashes are
    /// ignored and matching is case-insensitive.
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let pattern = normalize_path(pattern.trim());
        if pattern.is_empty() {
            return Err(PatternError::Empty);
        }
        match pattern.find(WILDCARD) {
            None => Ok(Self::Literal(pattern)),
            Some(idx) => {
                let mut prefix = pattern;
                prefix.remove(idx);
                Ok(Self::Prefix(prefix))
            }
        }
    }

    /// Check a normalized path against this rule.
    pub fn matches(&self, normalized: &str) -> bool {
        match self {
            Self::Prefix(prefix) => normalized.starts_with(prefix.as_str()),
            Self::Literal(literal) => {
                normalized == literal
                    || normalized
                        .strip_prefix(literal.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }
}

/// Ordered set of endpoint rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointFilter {
    rules: Vec<EndpointRule>,
}

impl EndpointFilter {
    /// Compile a list of patterns. Blank patterns are skipped.
    pub fn from_patterns(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        let rules = patterns
            .into_iter()
            .filter_map(|pattern| EndpointRule::parse(pattern.as_ref()).ok())
            .collect();
        Self { rules }
    }

    /// Compile a comma-separated pattern list such as `"health,admin/*"`.
    pub fn from_list(list: &str) -> Self {
        Self::from_patterns(list.split(','))
    }

    /// The compiled rules, in evaluation order.
    pub fn rules(&self) -> &[EndpointRule] {
        &self.rules
    }

    /// Decide whether monitoring is suppressed for a path.
    ///
    /// Absent and empty paths are never blocked.
    pub fn is_blocked(&self, path: Option<&str>) -> bool {
        let Some(path) = path.filter(|p| !p.is_empty()) else {
            return false;
        };
        let normalized = normalize_path(path);
        self.rules.iter().any(|rule| rule.matches(&normalized))
    }
}

/// Strip every leading `/` and lower-case.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').to_lowercase()
}
