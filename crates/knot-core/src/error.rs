use crate::pkg::PkgError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error for knot operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error(transparent)]
    Pkg(#[from] PkgError),

    #[error("no package.json found in {} or any parent directory", start.display())]
    ProjectNotFound { start: PathBuf },
}

impl Error {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Pkg(e) => e.code(),
            Self::ProjectNotFound { .. } => "PROJECT_NOT_FOUND",
        }
    }
}
