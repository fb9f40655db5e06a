//! Tarball extraction.

use super::error::{IoContext, PkgError};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tar::Archive;

/// Extract a `.tgz` into `dest_package_dir` atomically, dropping the
/// archive's top-level directory (`package/` for registry tarballs,
/// `<repo>-<ref>/` for GitHub snapshots).
///
/// Entries are unpacked into a sibling temp directory that is renamed into
/// place. If `dest_package_dir` appears meanwhile the other extraction wins.
///
/// # Errors
/// Returns `PkgError::Extract` if the archive is invalid or unsafe, or
/// `PkgError::Io` if the filesystem refuses the writes.
pub fn extract_tgz_atomic(tarball: &Path, dest_package_dir: &Path) -> Result<(), PkgError> {
    let entry_dir = dest_package_dir
        .parent()
        .ok_or_else(|| PkgError::extract_failed("Destination has no parent"))?;
    fs::create_dir_all(entry_dir).at(entry_dir)?;

    if dest_package_dir.exists() {
        return Ok(());
    }

    let temp_dir = tempfile::Builder::new()
        .prefix(".tmp-")
        .tempdir_in(entry_dir)
        .at(entry_dir)?;

    let file = File::open(tarball).at(tarball)?;
    let unpacked = temp_dir.path().join("package");
    fs::create_dir_all(&unpacked).at(&unpacked)?;
    extract_stripped(BufReader::new(file), &unpacked)?;

    match fs::rename(&unpacked, dest_package_dir) {
        Ok(()) => Ok(()),
        Err(_) if dest_package_dir.exists() => Ok(()),
        Err(e) => Err(PkgError::io(dest_package_dir, e)),
    }
}

/// Unpack a gzip-compressed tar stream into `dest`, stripping one leading
/// path segment from every entry.
fn extract_stripped(reader: impl io::Read, dest: &Path) -> Result<(), PkgError> {
    let mut archive = Archive::new(GzDecoder::new(reader));

    let entries = archive
        .entries()
        .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entries: {e}")))?;

    for entry in entries {
        let mut entry = entry
            .map_err(|e| PkgError::extract_failed(format!("Failed to read tarball entry: {e}")))?;

        let path = entry
            .path()
            .map_err(|e| PkgError::extract_failed(format!("Failed to read entry path: {e}")))?
            .into_owned();

        let Some(relative) = strip_first_component(&path)? else {
            continue;
        };
        let dest_path = dest.join(&relative);

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path).at(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent).at(parent)?;
            }
            let mut file = File::create(&dest_path).at(&dest_path)?;
            io::copy(&mut entry, &mut file).at(&dest_path)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(mode) = entry.header().mode() {
                    let perms = fs::Permissions::from_mode(mode & 0o777);
                    fs::set_permissions(&dest_path, perms).at(&dest_path)?;
                }
            }
        }
        // Links and special entries are skipped
    }

    Ok(())
}

/// Drop the first component of an entry path.
///
/// Returns `None` for the top-level entry itself. Absolute paths and `..`
/// components are rejected.
fn strip_first_component(path: &Path) -> Result<Option<PathBuf>, PkgError> {
    let display = path.display();
    let mut stripped = PathBuf::new();
    let mut skipped_root = false;

    for component in path.components() {
        match component {
            Component::Normal(part) if skipped_root => stripped.push(part),
            Component::Normal(_) => skipped_root = true,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(PkgError::extract_failed(format!(
                    "Tarball contains path traversal: {display}"
                )))
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PkgError::extract_failed(format!(
                    "Tarball contains absolute path: {display}"
                )))
            }
        }
    }

    Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
}
