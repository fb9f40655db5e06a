//! Symlink farm construction.
//!
//! For an edge `parent -> name -> id` the linker creates
//! `<parent node_modules>/<name> -> <store>/<id>/package` and one
//! `<parent node_modules>/.bin/<command>` link per `bin` entry. Link targets
//! are relative so a project can be moved as a whole.

use super::error::{IoContext, PkgError};
use super::graph::{InstallEdge, NodeId};
use super::store::ContentStore;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace, warn};

/// Result of applying one symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Created,
    /// A link pointing elsewhere was replaced.
    Replaced,
    /// The link already pointed at the target.
    Unchanged,
}

impl LinkStatus {
    #[must_use]
    pub fn changed(self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

/// Creates the links for install edges, once per `(parent, name)`.
pub struct Linker {
    store: ContentStore,
    linked: DashMap<(NodeId, String), String>,
}

impl Linker {
    #[must_use]
    pub fn new(store: ContentStore) -> Self {
        Self {
            store,
            linked: DashMap::new(),
        }
    }

    /// Link one edge, returning how many links were created or replaced.
    ///
    /// A repeated `(parent, name)` with the same id is a no-op.
    ///
    /// # Errors
    /// Returns `PkgError::DuplicateEdge` if `(parent, name)` was already
    /// linked to a different id, `PkgError::LinkConflict` if a destination
    /// is occupied by a non-symlink, or `PkgError::Io`.
    pub async fn link(&self, edge: &InstallEdge) -> Result<usize, PkgError> {
        let id = &edge.resolved.id;
        match self.linked.entry((edge.parent.clone(), edge.name.clone())) {
            Entry::Occupied(existing) if existing.get() == id => return Ok(0),
            Entry::Occupied(existing) => {
                return Err(PkgError::DuplicateEdge {
                    parent: edge.parent.to_string(),
                    name: edge.name.clone(),
                    first: existing.get().clone(),
                    second: id.clone(),
                })
            }
            Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let node_modules = self.store.node_modules(&edge.parent);
        let package_dir = self.store.package_dir(id);
        let mut changed = 0;

        let link = node_modules.join(&edge.name);
        if force_symlink(&package_dir, &link, LinkKind::Dir).await?.changed() {
            changed += 1;
        }

        let bin_dir = node_modules.join(".bin");
        for (command, script) in &edge.resolved.bin {
            let Some(script_path) = contained(&package_dir, script) else {
                warn!(package = %edge.name, command = %command, script = %script, "Ignoring bin outside package");
                continue;
            };
            if !is_plain_name(command) {
                warn!(package = %edge.name, command = %command, "Ignoring invalid bin name");
                continue;
            }
            if tokio::fs::metadata(&script_path).await.is_err() {
                warn!(package = %edge.name, command = %command, script = %script, "Bin target missing");
                continue;
            }

            make_executable(&script_path).await?;
            if force_symlink(&script_path, &bin_dir.join(command), LinkKind::File)
                .await?
                .changed()
            {
                changed += 1;
            }
        }

        trace!(parent = %edge.parent, name = %edge.name, id = %id, changed, "Linked");
        Ok(changed)
    }
}

/// What a link points at. Only matters on Windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Dir,
    File,
}

/// Point `link` at `target`.
///
/// An existing symlink with the same target is left alone; one pointing
/// elsewhere is removed and creation retried once. Anything else at `link`
/// is a conflict.
///
/// # Errors
/// Returns `PkgError::LinkConflict` if `link` exists and is not a symlink,
/// or `PkgError::Io`.
pub async fn force_symlink(
    target: &Path,
    link: &Path,
    kind: LinkKind,
) -> Result<LinkStatus, PkgError> {
    let parent = link
        .parent()
        .ok_or_else(|| PkgError::io(link, io::Error::other("link has no parent directory")))?;
    tokio::fs::create_dir_all(parent).await.at(parent)?;

    let desired = link_target(parent, target);

    match create_symlink(&desired, link, kind).await {
        Ok(()) => return Ok(LinkStatus::Created),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
        Err(e) => return Err(PkgError::io(link, e)),
    }

    let meta = tokio::fs::symlink_metadata(link).await.at(link)?;
    if !is_link(&meta) {
        return Err(PkgError::LinkConflict {
            path: link.to_path_buf(),
        });
    }

    let current = tokio::fs::read_link(link).await.at(link)?;
    if current == desired {
        return Ok(LinkStatus::Unchanged);
    }

    debug!(link = %link.display(), from = %current.display(), to = %desired.display(), "Replacing stale link");
    remove_link(link, kind).await.at(link)?;
    create_symlink(&desired, link, kind).await.at(link)?;
    Ok(LinkStatus::Replaced)
}

#[cfg(unix)]
fn link_target(link_dir: &Path, target: &Path) -> PathBuf {
    knot_util::fs::relative_path(link_dir, target)
}

#[cfg(windows)]
fn link_target(link_dir: &Path, target: &Path) -> PathBuf {
    // Junctions must be absolute
    let _ = link_dir;
    target.to_path_buf()
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path, _kind: LinkKind) -> io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_symlink(target: &Path, link: &Path, kind: LinkKind) -> io::Result<()> {
    let (target, link) = (target.to_path_buf(), link.to_path_buf());
    tokio::task::spawn_blocking(move || match kind {
        LinkKind::Dir => junction::create(&target, &link),
        LinkKind::File => std::os::windows::fs::symlink_file(&target, &link),
    })
    .await
    .map_err(io::Error::other)?
}

#[cfg(unix)]
pub(crate) fn is_link(meta: &std::fs::Metadata) -> bool {
    meta.file_type().is_symlink()
}

#[cfg(windows)]
pub(crate) fn is_link(meta: &std::fs::Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    // FILE_ATTRIBUTE_REPARSE_POINT
    meta.file_attributes() & 0x400 != 0
}

pub(crate) async fn remove_link(link: &Path, kind: LinkKind) -> io::Result<()> {
    if cfg!(windows) && kind == LinkKind::Dir {
        tokio::fs::remove_dir(link).await
    } else {
        tokio::fs::remove_file(link).await
    }
}

#[cfg(unix)]
pub(crate) async fn make_executable(path: &Path) -> Result<(), PkgError> {
    use std::os::unix::fs::PermissionsExt;
    let mode = knot_util::fs::executable_mode();
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .at(path)
}

#[cfg(not(unix))]
pub(crate) async fn make_executable(_path: &Path) -> Result<(), PkgError> {
    Ok(())
}

/// `package_dir/relative`, or `None` if `relative` escapes the package.
pub(crate) fn contained(package_dir: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let mut path = package_dir.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (path != package_dir).then_some(path)
}

pub(crate) fn is_plain_name(command: &str) -> bool {
    !command.is_empty()
        && command != "."
        && command != ".."
        && !command.contains(['/', '\\'])
}
