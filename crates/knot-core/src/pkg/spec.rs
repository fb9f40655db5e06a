//! Package spec parsing.
//!
//! Parses command-line package specifications like:
//! - `react`
//! - `react@^18.0.0`
//! - `@types/node@^20`
//! - `tool@github:owner/tool#main`

use super::error::PkgError;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters left unescaped by `encodeURIComponent`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A parsed package specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Scope without the @ prefix, if scoped.
    pub scope: Option<String>,
    /// Version constraint (None means latest).
    pub range: Option<String>,
}

impl PackageSpec {
    /// Parse a package specification string.
    ///
    /// # Errors
    /// Returns `PkgError::SpecInvalid` if the spec is malformed.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        // The version delimiter is the first @ after the name
        let search_from = if input.starts_with('@') { 1 } else { 0 };
        let (name, range) = match input[search_from..].find('@') {
            Some(pos) => {
                let at = search_from + pos;
                let range = &input[at + 1..];
                if range.is_empty() {
                    return Err(PkgError::spec_invalid(format!(
                        "Empty version range in '{input}'"
                    )));
                }
                (&input[..at], Some(range.to_string()))
            }
            None => (input, None),
        };

        let scope = validate_name(name)?;

        Ok(Self {
            name: name.to_string(),
            scope,
            range,
        })
    }
}

/// Escape a package name for use as a registry path segment.
///
/// Scoped names keep their leading `@` and have the rest component-encoded
/// (`@scope/pkg` becomes `@scope%2Fpkg`). Unscoped names are fully encoded.
#[must_use]
pub fn escape_name(name: &str) -> String {
    match name.strip_prefix('@') {
        Some(rest) => format!("@{}", utf8_percent_encode(rest, COMPONENT)),
        None => utf8_percent_encode(name, COMPONENT).to_string(),
    }
}

/// Validate a package name, returning its scope.
///
/// A valid name is always a single `node_modules` entry (two for scoped
/// names) and never walks out of it.
///
/// # Errors
/// Returns `PkgError::SpecInvalid` describing the first problem found.
pub(crate) fn validate_name(name: &str) -> Result<Option<String>, PkgError> {
    let (scope, bare) = match name.strip_prefix('@') {
        Some(rest) => {
            let Some((scope, bare)) = rest.split_once('/') else {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid scoped package: missing '/' in '{name}'"
                )));
            };
            if scope.is_empty() {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid scoped package: empty scope in '{name}'"
                )));
            }
            (Some(scope), bare)
        }
        None => (None, name),
    };

    if bare.is_empty() {
        return Err(PkgError::spec_invalid(format!(
            "Empty package name in '{name}'"
        )));
    }

    for part in scope.into_iter().chain([bare]) {
        if part.starts_with('.') {
            return Err(PkgError::spec_invalid(format!(
                "Package name '{name}' cannot start with '.'"
            )));
        }
        if let Some(c) = part
            .chars()
            .find(|c| !c.is_alphanumeric() && !matches!(c, '-' | '_' | '.' | '~'))
        {
            return Err(PkgError::spec_invalid(format!(
                "Invalid character '{c}' in package name '{name}'"
            )));
        }
    }

    Ok(scope.map(String::from))
}
