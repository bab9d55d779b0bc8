//! Scope rules: patterns over document source paths

use globset::{Glob, GlobBuilder, GlobMatcher};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{RagError, Result};

/// Normalize a source path for matching.
///
/// Backslashes become `/`, repeated separators collapse and a leading `./`
/// is dropped. Case is preserved.
pub fn normalize_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut out = String::with_capacity(unified.len());
    let mut prev_sep = false;
    for ch in unified.chars() {
        if ch == '/' {
            if prev_sep {
                continue;
            }
            prev_sep = true;
        } else {
            prev_sep = false;
        }
        out.push(ch);
    }
    let mut trimmed = out.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// A pattern defining which document paths a role may see
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScopeRule {
    /// Exactly one document
    Exact(String),
    /// Every document under a directory (stored with a trailing `/`,
    /// the empty prefix matches everything)
    Prefix(String),
    /// Wildcard pattern; `*` stays within a path segment, `**` crosses them
    Glob { glob: Glob, matcher: GlobMatcher },
}

impl ScopeRule {
    /// Parse a rule from its textual form.
    ///
    /// Patterns containing `*`, `?`, `[` or `{` are globs, patterns ending
    /// in `/` are directory prefixes, anything else is an exact path.
    pub fn parse(pattern: &str) -> Result<Self> {
        let normalized = normalize_path(pattern.trim());
        if normalized.contains(['*', '?', '[', '{']) {
            Self::glob(&normalized)
        } else if normalized.is_empty() || normalized.ends_with('/') {
            Ok(ScopeRule::Prefix(normalized))
        } else {
            Ok(ScopeRule::Exact(normalized))
        }
    }

    pub fn exact(path: &str) -> Self {
        ScopeRule::Exact(normalize_path(path))
    }

    pub fn prefix(dir: &str) -> Self {
        let mut normalized = normalize_path(dir);
        if !normalized.is_empty() && !normalized.ends_with('/') {
            normalized.push('/');
        }
        ScopeRule::Prefix(normalized)
    }

    pub fn glob(pattern: &str) -> Result<Self> {
        let glob = GlobBuilder::new(&normalize_path(pattern))
            .literal_separator(true)
            .build()
            .map_err(|e| RagError::PolicyError(format!("Invalid glob '{}': {}", pattern, e)))?;
        let matcher = glob.compile_matcher();
        Ok(ScopeRule::Glob { glob, matcher })
    }

    /// Rule matching every path
    pub fn universal() -> Self {
        ScopeRule::Prefix(String::new())
    }

    /// Whether this rule matches any path whatsoever
    pub fn is_universal(&self) -> bool {
        match self {
            ScopeRule::Prefix(p) => p.is_empty(),
            ScopeRule::Glob { glob, .. } => glob.glob() == "**",
            ScopeRule::Exact(_) => false,
        }
    }

    /// Match an already normalized source path
    pub fn matches_normalized(&self, path: &str) -> bool {
        match self {
            ScopeRule::Exact(p) => p == path,
            ScopeRule::Prefix(p) => path.starts_with(p.as_str()),
            ScopeRule::Glob { matcher, .. } => matcher.is_match(path),
        }
    }

    /// Match a raw source path
    pub fn matches(&self, path: &str) -> bool {
        self.matches_normalized(&normalize_path(path))
    }

    pub fn pattern(&self) -> &str {
        match self {
            ScopeRule::Exact(p) | ScopeRule::Prefix(p) => p,
            ScopeRule::Glob { glob, .. } => glob.glob(),
        }
    }
}

impl PartialEq for ScopeRule {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScopeRule::Exact(a), ScopeRule::Exact(b)) => a == b,
            (ScopeRule::Prefix(a), ScopeRule::Prefix(b)) => a == b,
            (ScopeRule::Glob { glob: a, .. }, ScopeRule::Glob { glob: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for ScopeRule {}

impl fmt::Display for ScopeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeRule::Prefix(p) if p.is_empty() => f.write_str("**"),
            _ => f.write_str(self.pattern()),
        }
    }
}

impl TryFrom<String> for ScopeRule {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self> {
        ScopeRule::parse(&value)
    }
}

impl From<ScopeRule> for String {
    fn from(rule: ScopeRule) -> Self {
        rule.pattern().to_string()
    }
}
