//! Package manager error types.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Package manager error codes.
pub mod codes {
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_VERSION_NOT_FOUND: &str = "PKG_VERSION_NOT_FOUND";
    pub const PKG_PACKAGE_ROOT_INVALID: &str = "PKG_PACKAGE_ROOT_INVALID";
    pub const PKG_CORRUPTED: &str = "PKG_CORRUPTED";
    pub const PKG_LOCAL_CONFLICT: &str = "PKG_LOCAL_CONFLICT";
    pub const PKG_LINK_CONFLICT: &str = "PKG_LINK_CONFLICT";
    pub const PKG_DUPLICATE_EDGE: &str = "PKG_DUPLICATE_EDGE";
    pub const PKG_BUILD_FAILED: &str = "PKG_BUILD_FAILED";
    pub const PKG_NETWORK_ERROR: &str = "PKG_NETWORK_ERROR";
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_MANIFEST_INVALID: &str = "PKG_MANIFEST_INVALID";
    pub const PKG_DEP_RANGE_INVALID: &str = "PKG_DEP_RANGE_INVALID";
    pub const PKG_DEP_NAME_INVALID: &str = "PKG_DEP_NAME_INVALID";
    pub const PKG_EXTRACT_FAILED: &str = "PKG_EXTRACT_FAILED";
    pub const PKG_IO_ERROR: &str = "PKG_IO_ERROR";
    pub const PKG_CONFIG_INVALID: &str = "PKG_CONFIG_INVALID";
}

/// One lifecycle script that exited unsuccessfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFailure {
    pub package: String,
    pub id: String,
    pub script: String,
    /// Exit code, or `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

/// Package manager error.
///
/// `Clone` so that a deduplicated request can hand the same failure to every
/// waiter.
#[derive(Debug, Clone, Error)]
pub enum PkgError {
    /// Recoverable: a strategy does not apply, or a store entry is missing.
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("no version of {name} satisfies {requested} (available: {})", available.join(", "))]
    Version {
        name: String,
        requested: String,
        available: Vec<String>,
    },

    #[error("invalid package root document from {url}: {reason}")]
    PackageRoot { url: String, reason: String },

    #[error("integrity mismatch for {url}: expected {expected}, got {actual}")]
    CorruptedPackage {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("local version {name}@{version} does not match required version {expected}")]
    LocalConflict {
        name: String,
        version: String,
        expected: String,
    },

    #[error("refusing to replace {} with a symlink: not a symlink", path.display())]
    LinkConflict { path: PathBuf },

    #[error("{name} under {parent} resolved to both {first} and {second}")]
    DuplicateEdge {
        parent: String,
        name: String,
        first: String,
        second: String,
    },

    #[error("failed to build {} {}", failures.len(), dependency_noun(failures.len()))]
    FailedBuild { failures: Vec<ScriptFailure> },

    #[error("request to {url} failed: {message}")]
    Network {
        url: String,
        status: Option<u16>,
        message: String,
    },

    #[error("invalid package spec: {0}")]
    SpecInvalid(String),

    #[error("invalid manifest {}: {message}", path.display())]
    Manifest { path: PathBuf, message: String },

    #[error("extraction failed: {0}")]
    Extract(String),

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl PkgError {
    /// Get the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => codes::PKG_NOT_FOUND,
            Self::Version { .. } => codes::PKG_VERSION_NOT_FOUND,
            Self::PackageRoot { .. } => codes::PKG_PACKAGE_ROOT_INVALID,
            Self::CorruptedPackage { .. } => codes::PKG_CORRUPTED,
            Self::LocalConflict { .. } => codes::PKG_LOCAL_CONFLICT,
            Self::LinkConflict { .. } => codes::PKG_LINK_CONFLICT,
            Self::DuplicateEdge { .. } => codes::PKG_DUPLICATE_EDGE,
            Self::FailedBuild { .. } => codes::PKG_BUILD_FAILED,
            Self::Network { .. } => codes::PKG_NETWORK_ERROR,
            Self::SpecInvalid(_) => codes::PKG_SPEC_INVALID,
            Self::Manifest { .. } => codes::PKG_MANIFEST_INVALID,
            Self::Extract(_) => codes::PKG_EXTRACT_FAILED,
            Self::Io { .. } => codes::PKG_IO_ERROR,
            Self::Config(_) => codes::PKG_CONFIG_INVALID,
        }
    }

    /// Whether this is the recoverable not-found condition.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a spec invalid error.
    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::SpecInvalid(msg.into())
    }

    /// Create an extraction failed error.
    pub fn extract_failed(msg: impl Into<String>) -> Self {
        Self::Extract(msg.into())
    }

    /// Create a manifest error for the file at `path`.
    pub fn manifest(path: &Path, msg: impl Into<String>) -> Self {
        Self::Manifest {
            path: path.to_path_buf(),
            message: msg.into(),
        }
    }

    /// Create a network error without an HTTP status.
    pub fn network(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            status: None,
            message: msg.into(),
        }
    }

    /// Wrap an I/O error with the path it happened at.
    ///
    /// `ENOENT` is kept distinguishable through [`PkgError::is_io_not_found`].
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source: Arc::new(source),
        }
    }

    /// Whether this wraps an `ENOENT` I/O error.
    #[must_use]
    pub fn is_io_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }

    /// Whether a failed request is worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { status, .. } => *status != Some(404),
            Self::Io { .. } => true,
            _ => false,
        }
    }
}

fn dependency_noun(count: usize) -> &'static str {
    if count == 1 {
        "dependency"
    } else {
        "dependencies"
    }
}

/// Attach a path to an I/O result.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T, PkgError>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T, PkgError> {
        self.map_err(|e| PkgError::io(path, e))
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        let url = e.url().map(ToString::to_string).unwrap_or_default();
        let status = e.status().map(|s| s.as_u16());
        let message = if e.is_timeout() {
            format!("Request timed out: {e}")
        } else if e.is_connect() {
            format!("Connection failed: {e}")
        } else {
            e.to_string()
        };
        Self::Network {
            url,
            status,
            message,
        }
    }
}
