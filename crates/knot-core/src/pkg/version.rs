//! npm-style version ranges on top of `semver`.
//!
//! `semver::VersionReq` follows Cargo's rules, where a bare `1.2.3` means
//! `^1.2.3`. npm reads the same text as `=1.2.3` and adds hyphen ranges,
//! `||` unions and whitespace-separated comparators, so ranges are rewritten
//! into Cargo syntax before parsing.

use super::error::PkgError;
use semver::{Version, VersionReq};
use std::fmt;

const OPERATORS: &[&str] = &[">=", "<=", ">", "<", "=", "~", "^"];

/// A parsed version range: a union of comparator sets.
#[derive(Debug, Clone)]
pub struct Range {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl Range {
    /// Parse an npm range. The empty string means `*`.
    ///
    /// # Errors
    /// Returns `PkgError::SpecInvalid` if any `||` alternative is invalid.
    pub fn parse(range: &str) -> Result<Self, PkgError> {
        let alternatives = range
            .split("||")
            .map(|alt| parse_alternative(alt.trim()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: range.to_string(),
            alternatives,
        })
    }

    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Highest version in `versions` satisfying `range`.
///
/// Strings that are not valid semver are ignored.
pub fn max_satisfying<'a, I>(versions: I, range: &Range) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .filter_map(|v| parse_version(v).map(|parsed| (parsed, v)))
        .filter(|(parsed, _)| range.matches(parsed))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, v)| v)
}

/// Whether `version` satisfies `range`. Unparseable versions never do.
#[must_use]
pub fn satisfies(version: &str, range: &Range) -> bool {
    parse_version(version).is_some_and(|v| range.matches(&v))
}

fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim();
    Version::parse(version.strip_prefix('v').unwrap_or(version)).ok()
}

fn parse_alternative(range: &str) -> Result<VersionReq, PkgError> {
    let converted = if range.is_empty() {
        "*".to_string()
    } else if let Some((start, end)) = parse_hyphen_range(range) {
        // "1.0.0 - 2.0.0" -> ">=1.0.0, <=2.0.0"
        format!(">={}, <={}", strip_v(start), strip_v(end))
    } else {
        comparators(range)
            .iter()
            .map(|c| normalize_comparator(c))
            .collect::<Vec<_>>()
            .join(", ")
    };

    VersionReq::parse(&converted)
        .map_err(|e| PkgError::spec_invalid(format!("Invalid version range '{range}': {e}")))
}

/// Parse a hyphen range like "1.0.0 - 2.0.0".
fn parse_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (start, end) = range.split_once(" - ")?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() || end.contains(" - ") {
        return None;
    }
    Some((start, end))
}

/// Split whitespace-separated comparators, re-attaching detached operators
/// (`">= 2.1.2 < 3"` becomes `[">=2.1.2", "<3"]`).
fn comparators(range: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut pending_op = String::new();

    for token in range.split_whitespace() {
        if OPERATORS.contains(&token) {
            pending_op.push_str(token);
            continue;
        }
        result.push(format!("{pending_op}{token}"));
        pending_op.clear();
    }

    if !pending_op.is_empty() {
        result.push(pending_op);
    }
    result
}

/// Rewrite one npm comparator into Cargo syntax.
fn normalize_comparator(comparator: &str) -> String {
    let (op, rest) = split_operator(comparator);
    let rest = strip_v(rest);

    // Drop wildcard components: "1.2.x" -> "1.2"
    let (core, suffix) = match rest.find(['-', '+']) {
        Some(pos) => rest.split_at(pos),
        None => (rest, ""),
    };
    let parts: Vec<&str> = core
        .split('.')
        .take_while(|p| !matches!(*p, "x" | "X" | "*" | ""))
        .collect();

    if parts.is_empty() {
        return "*".to_string();
    }

    let full = parts.len() == 3;
    let version = if full {
        format!("{}{suffix}", parts.join("."))
    } else {
        parts.join(".")
    };

    match op {
        // A bare full version is exact; a bare partial one is an x-range
        "" if full => format!("={version}"),
        "" => format!("~{version}"),
        _ => format!("{op}{version}"),
    }
}

fn split_operator(comparator: &str) -> (&str, &str) {
    for &op in OPERATORS {
        if let Some(rest) = comparator.strip_prefix(op) {
            return (op, rest.trim_start());
        }
    }
    ("", comparator)
}

fn strip_v(version: &str) -> &str {
    version
        .strip_prefix('v')
        .or_else(|| version.strip_prefix('V'))
        .unwrap_or(version)
}
