//! Content-addressed package storage.
//!
//! Two directories back the store:
//! - the tarball cache, `<cache_dir>/<id>`, holding verified archive bytes;
//! - the package store, `<store_root>/<id>/package`, holding extracted
//!   contents, with the entry's own dependency links in
//!   `<store_root>/<id>/node_modules`.
//!
//! Both are write-once per id.

use super::error::{IoContext, PkgError};
use super::graph::NodeId;
use super::tarball::extract_tgz_atomic;
use crate::paths::NODE_MODULES;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Directory under the cache root holding in-progress downloads.
const TMP_DIR: &str = ".tmp";

/// On-disk store for one project.
#[derive(Debug, Clone)]
pub struct ContentStore {
    project_root: PathBuf,
    store_root: PathBuf,
    cache_dir: PathBuf,
}

impl ContentStore {
    #[must_use]
    pub fn new(project_root: PathBuf, store_root: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            project_root,
            store_root,
            cache_dir,
        }
    }

    #[must_use]
    pub fn store_root(&self) -> &Path {
        &self.store_root
    }

    /// Verified tarball for `id`.
    #[must_use]
    pub fn tarball_path(&self, id: &str) -> PathBuf {
        self.cache_dir.join(id)
    }

    /// Extracted contents of `id`.
    #[must_use]
    pub fn package_dir(&self, id: &str) -> PathBuf {
        self.store_root.join(id).join("package")
    }

    /// Directory a node's dependency links live in.
    #[must_use]
    pub fn node_modules(&self, node: &NodeId) -> PathBuf {
        match node {
            NodeId::Root => self.project_root.join(NODE_MODULES),
            NodeId::Package(id) => self.store_root.join(id).join(NODE_MODULES),
        }
    }

    /// Open a sink at a fresh temporary path under the cache.
    ///
    /// The file is deleted on drop unless passed to [`ContentStore::commit`].
    ///
    /// # Errors
    /// Returns `PkgError::Io` if the temp directory or file cannot be created.
    pub fn write(&self) -> Result<NamedTempFile, PkgError> {
        let tmp = self.cache_dir.join(TMP_DIR);
        fs::create_dir_all(&tmp).at(&tmp)?;
        NamedTempFile::new_in(&tmp).at(&tmp)
    }

    /// Atomically promote a verified download to the cache entry for `id`.
    ///
    /// # Errors
    /// Returns `PkgError::Io` if the rename fails.
    pub fn commit(&self, download: NamedTempFile, id: &str) -> Result<(), PkgError> {
        let dest = self.tarball_path(id);
        download
            .persist(&dest)
            .map_err(|e| PkgError::io(&dest, e.error))?;
        debug!(id, path = %dest.display(), "Cached tarball");
        Ok(())
    }

    /// Unpack the cached tarball for `id` into `destination`.
    ///
    /// # Errors
    /// Returns `PkgError::NotFound` if no tarball is cached for `id`, or the
    /// extraction error otherwise.
    pub async fn extract(&self, destination: &Path, id: &str) -> Result<(), PkgError> {
        let tarball = self.tarball_path(id);
        match tokio::fs::metadata(&tarball).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(PkgError::not_found(format!("{id} in cache")));
            }
            Err(e) => return Err(PkgError::io(&tarball, e)),
        }

        let dest = destination.to_path_buf();
        tokio::task::spawn_blocking(move || extract_tgz_atomic(&tarball, &dest))
            .await
            .map_err(|e| PkgError::extract_failed(format!("Extraction task failed: {e}")))??;

        debug!(id, dest = %destination.display(), "Extracted");
        Ok(())
    }
}

/// Delete cached tarballs: the entry for `id`, or the whole cache.
///
/// Returns how many tarballs were removed. Extracted store entries are left
/// alone.
///
/// # Errors
/// Returns `PkgError::SpecInvalid` if `id` is not a content id, or
/// `PkgError::Io`.
pub fn clean_cache(cache_dir: &Path, id: Option<&str>) -> Result<usize, PkgError> {
    if let Some(id) = id {
        if !is_valid_id(id) {
            return Err(PkgError::spec_invalid(format!("Invalid cache entry '{id}'")));
        }
        let path = cache_dir.join(id);
        return match fs::remove_file(&path) {
            Ok(()) => {
                debug!(id, "Removed cached tarball");
                Ok(1)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(PkgError::io(&path, e)),
        };
    }

    let entries = match fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(PkgError::io(cache_dir, e)),
    };
    let mut removed = 0;
    for entry in entries {
        if entry.at(cache_dir)?.file_name() != TMP_DIR {
            removed += 1;
        }
    }
    fs::remove_dir_all(cache_dir).at(cache_dir)?;
    debug!(dir = %cache_dir.display(), removed, "Cleared tarball cache");
    Ok(removed)
}

/// Whether `id` is usable as a single path component.
#[must_use]
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric())
}
