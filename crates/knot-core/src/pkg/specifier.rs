//! Classification of dependency version constraints.

use super::error::PkgError;
use super::version::Range;
use url::Url;

/// What a dependency's version constraint asks for.
#[derive(Debug, Clone)]
pub enum Specifier {
    /// A semver range against the registry.
    Range(Range),
    /// A registry dist-tag such as `latest`.
    Tag(String),
    /// A tarball URL.
    Tarball(String),
    /// A GitHub repository at a branch.
    Git(GitRepo),
}

/// A GitHub repository reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepo {
    pub owner: String,
    pub repo: String,
    /// Branch name; `None` means the default ref.
    pub reference: Option<String>,
}

/// Ref used when a git specifier names none.
pub const DEFAULT_GIT_REF: &str = "master";

impl GitRepo {
    #[must_use]
    pub fn reference(&self) -> &str {
        self.reference.as_deref().unwrap_or(DEFAULT_GIT_REF)
    }
}

impl Specifier {
    /// Classify a constraint. The empty constraint means `*`.
    ///
    /// # Errors
    /// Returns `PkgError::SpecInvalid` for unsupported or malformed
    /// constraints, including git sources not hosted on GitHub.
    pub fn parse(constraint: &str) -> Result<Self, PkgError> {
        let constraint = constraint.trim();

        if let Some(rest) = constraint.strip_prefix("github:") {
            return parse_shorthand(rest, constraint).map(Self::Git);
        }
        if constraint.starts_with("git+") || constraint.starts_with("git://") {
            return parse_git_url(constraint).map(Self::Git);
        }
        if constraint.starts_with("http://") || constraint.starts_with("https://") {
            return Url::parse(constraint)
                .map(|_| Self::Tarball(constraint.to_string()))
                .map_err(|e| PkgError::spec_invalid(format!("Invalid URL '{constraint}': {e}")));
        }
        if is_shorthand(constraint) {
            return parse_shorthand(constraint, constraint).map(Self::Git);
        }

        if let Ok(range) = Range::parse(constraint) {
            return Ok(Self::Range(range));
        }
        if is_tag(constraint) {
            return Ok(Self::Tag(constraint.to_string()));
        }

        Err(PkgError::spec_invalid(format!(
            "Unsupported version constraint '{constraint}'"
        )))
    }
}

/// `owner/repo` or `owner/repo#ref` with no other punctuation.
fn is_shorthand(constraint: &str) -> bool {
    let repo_part = constraint.split('#').next().unwrap_or(constraint);
    let mut parts = repo_part.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(repo), None) if is_repo_segment(owner) && is_repo_segment(repo)
    )
}

fn is_repo_segment(segment: &str) -> bool {
    !segment.is_empty()
        && !segment.starts_with('.')
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn is_tag(constraint: &str) -> bool {
    !constraint.is_empty()
        && !constraint.starts_with(|c: char| c.is_ascii_digit())
        && constraint
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn parse_shorthand(shorthand: &str, original: &str) -> Result<GitRepo, PkgError> {
    let (path, reference) = match shorthand.split_once('#') {
        Some((path, reference)) => (path, Some(reference)),
        None => (shorthand, None),
    };

    let Some((owner, repo)) = path.split_once('/') else {
        return Err(PkgError::spec_invalid(format!(
            "Invalid GitHub specifier '{original}': expected owner/repo"
        )));
    };
    let repo = repo.strip_suffix(".git").unwrap_or(repo);

    if !is_repo_segment(owner) || !is_repo_segment(repo) {
        return Err(PkgError::spec_invalid(format!(
            "Invalid GitHub specifier '{original}'"
        )));
    }

    let reference = match reference {
        Some("") => {
            return Err(PkgError::spec_invalid(format!(
                "Empty git ref in '{original}'"
            )))
        }
        Some(r) if r.contains(char::is_whitespace) || r.contains("..") => {
            return Err(PkgError::spec_invalid(format!(
                "Invalid git ref in '{original}'"
            )))
        }
        other => other.map(String::from),
    };

    Ok(GitRepo {
        owner: owner.to_string(),
        repo: repo.to_string(),
        reference,
    })
}

fn parse_git_url(constraint: &str) -> Result<GitRepo, PkgError> {
    let raw = constraint.strip_prefix("git+").unwrap_or(constraint);
    let url = Url::parse(raw)
        .map_err(|e| PkgError::spec_invalid(format!("Invalid git URL '{constraint}': {e}")))?;

    if url.host_str() != Some("github.com") {
        return Err(PkgError::spec_invalid(format!(
            "Unsupported git host in '{constraint}': only github.com is supported"
        )));
    }

    let path = url.path().trim_matches('/');
    let shorthand = match url.fragment() {
        Some(fragment) => format!("{path}#{fragment}"),
        None => path.to_string(),
    };
    parse_shorthand(&shorthand, constraint)
}
