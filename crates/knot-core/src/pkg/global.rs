//! Links shared between projects on one machine.
//!
//! `link` in a package directory points `<global>/<name>` at it and exposes
//! its `bin` entries in the global bin directory. `link <name>` in a project
//! then points `<project>/node_modules/<name>` at that global link, where the
//! local strategy reuses it like any other linked package.
//!
//! Unlinking only ever removes symlinks.

use super::error::{IoContext, PkgError};
use super::link::{
    contained, force_symlink, is_link, is_plain_name, make_executable, remove_link, LinkKind,
};
use super::manifest::Manifest;
use super::spec::validate_name;
use crate::config::InstallConfig;
use crate::paths::NODE_MODULES;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Links touched by one global link operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub package: String,
    pub links: Vec<PathBuf>,
}

/// The global package and command directories.
#[derive(Debug, Clone)]
pub struct GlobalLinks {
    node_modules: PathBuf,
    bin: PathBuf,
}

impl GlobalLinks {
    #[must_use]
    pub fn new(node_modules: PathBuf, bin: PathBuf) -> Self {
        Self { node_modules, bin }
    }

    #[must_use]
    pub fn from_config(config: &InstallConfig) -> Self {
        Self::new(config.global_node_modules.clone(), config.global_bin.clone())
    }

    /// Expose the package in `package_dir` globally.
    ///
    /// # Errors
    /// Returns `PkgError::Manifest` or `PkgError::SpecInvalid` if the package
    /// has no usable name, `PkgError::LinkConflict` if a destination is not a
    /// symlink, or `PkgError::Io`.
    pub async fn link_to_global(&self, package_dir: &Path) -> Result<LinkReport, PkgError> {
        let package_dir = dunce::canonicalize(package_dir).at(package_dir)?;
        let (package, manifest) = read_named(&package_dir)?;
        let node_modules = canonical_dir(&self.node_modules).await?;
        let bin = canonical_dir(&self.bin).await?;

        let global = node_modules.join(&package);
        force_symlink(&package_dir, &global, LinkKind::Dir).await?;
        let mut links = vec![global.clone()];

        for (command, script) in manifest.bin() {
            let Some(script_path) = contained(&global, &script) else {
                warn!(package = %package, command = %command, script = %script, "Ignoring bin outside package");
                continue;
            };
            if !is_plain_name(&command) {
                warn!(package = %package, command = %command, "Ignoring invalid bin name");
                continue;
            }
            if tokio::fs::metadata(&script_path).await.is_err() {
                warn!(package = %package, command = %command, script = %script, "Bin target missing");
                continue;
            }

            make_executable(&script_path).await?;
            let link = bin.join(&command);
            force_symlink(&script_path, &link, LinkKind::File).await?;
            links.push(link);
        }

        info!(package = %package, path = %package_dir.display(), "Linked globally");
        Ok(LinkReport { package, links })
    }

    /// Remove the global links created for the package in `package_dir`.
    ///
    /// Links that are already gone are skipped.
    ///
    /// # Errors
    /// Returns `PkgError::LinkConflict` if a link path holds something other
    /// than a symlink, or the manifest and I/O errors of
    /// [`GlobalLinks::link_to_global`].
    pub async fn unlink_to_global(&self, package_dir: &Path) -> Result<LinkReport, PkgError> {
        let (package, manifest) = read_named(package_dir)?;
        let mut links = Vec::new();

        let global = self.node_modules.join(&package);
        if remove_symlink(&global, LinkKind::Dir).await? {
            links.push(global);
        }
        for command in manifest.bin().into_keys().filter(|c| is_plain_name(c)) {
            let link = self.bin.join(&command);
            if remove_symlink(&link, LinkKind::File).await? {
                links.push(link);
            }
        }

        info!(package = %package, removed = links.len(), "Unlinked globally");
        Ok(LinkReport { package, links })
    }

    /// Link the globally exposed `name` into `<project_root>/node_modules`.
    ///
    /// The project's `.bin` is left alone.
    ///
    /// # Errors
    /// Returns `PkgError::SpecInvalid` for an invalid name,
    /// `PkgError::NotFound` if `name` is not linked globally,
    /// `PkgError::LinkConflict` if the project already has a real directory
    /// there, or `PkgError::Io`.
    pub async fn link_from_global(
        &self,
        project_root: &Path,
        name: &str,
    ) -> Result<LinkReport, PkgError> {
        validate_name(name)?;
        let global = self.node_modules.join(name);
        match tokio::fs::symlink_metadata(&global).await {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PkgError::not_found(format!("{name} is not linked globally")));
            }
            Err(e) => return Err(PkgError::io(&global, e)),
        }

        // Relative targets are computed between canonical paths
        let node_modules = dunce::canonicalize(&self.node_modules).at(&self.node_modules)?;
        let project_root = dunce::canonicalize(project_root).at(project_root)?;
        let link = project_root.join(NODE_MODULES).join(name);
        force_symlink(&node_modules.join(name), &link, LinkKind::Dir).await?;

        info!(package = name, project = %project_root.display(), "Linked from global");
        Ok(LinkReport {
            package: name.to_string(),
            links: vec![link],
        })
    }

    /// Remove `<project_root>/node_modules/<name>`.
    ///
    /// # Errors
    /// Returns `PkgError::SpecInvalid` for an invalid name,
    /// `PkgError::NotFound` if nothing is linked under `name`,
    /// `PkgError::LinkConflict` if it is not a symlink, or `PkgError::Io`.
    pub async fn unlink_from_global(
        &self,
        project_root: &Path,
        name: &str,
    ) -> Result<LinkReport, PkgError> {
        validate_name(name)?;
        let link = project_root.join(NODE_MODULES).join(name);
        if !remove_symlink(&link, LinkKind::Dir).await? {
            return Err(PkgError::not_found(format!("{} is not linked", link.display())));
        }

        info!(package = name, "Unlinked from project");
        Ok(LinkReport {
            package: name.to_string(),
            links: vec![link],
        })
    }
}

/// Read `<dir>/package.json`, which must carry a valid name.
fn read_named(dir: &Path) -> Result<(String, Manifest), PkgError> {
    let path = dir.join("package.json");
    let manifest = Manifest::read(&path)?;
    let name = manifest
        .name()
        .ok_or_else(|| PkgError::manifest(&path, "missing \"name\""))?
        .to_string();
    validate_name(&name)?;
    Ok((name, manifest))
}

/// Create `dir` and return its canonical form, so relative link targets
/// computed against it resolve.
async fn canonical_dir(dir: &Path) -> Result<PathBuf, PkgError> {
    tokio::fs::create_dir_all(dir).await.at(dir)?;
    dunce::canonicalize(dir).at(dir)
}

/// Remove `link` if it is a symlink. Returns whether anything was removed.
async fn remove_symlink(link: &Path, kind: LinkKind) -> Result<bool, PkgError> {
    match tokio::fs::symlink_metadata(link).await {
        Ok(meta) if is_link(&meta) => {
            remove_link(link, kind).await.at(link)?;
            debug!(link = %link.display(), "Removed link");
            Ok(true)
        }
        Ok(_) => Err(PkgError::LinkConflict {
            path: link.to_path_buf(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(PkgError::io(link, e)),
    }
}
