//! Reuse of packages already linked under the parent.

use super::{Request, Resolver};
use crate::pkg::error::PkgError;
use crate::pkg::graph::{Dist, NodeId, ResolvedPackage, Source};
use crate::pkg::manifest::Manifest;
use crate::pkg::specifier::Specifier;
use crate::pkg::store::is_valid_id;
use crate::pkg::version::satisfies;
use knot_util::hash::sha1_bytes;
use std::path::{Path, PathBuf};
use tracing::trace;

pub(super) async fn resolve(
    resolver: &Resolver,
    request: Request<'_>,
    specifier: &Specifier,
) -> Result<ResolvedPackage, PkgError> {
    let link = resolver
        .store()
        .node_modules(request.parent)
        .join(request.name);

    let target = match tokio::fs::symlink_metadata(&link).await {
        Ok(meta) if meta.file_type().is_symlink() => tokio::fs::read_link(&link)
            .await
            .map_err(|e| PkgError::io(&link, e))?,
        Ok(_) => return Err(not_linked(&link)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_linked(&link)),
        Err(e) => return Err(PkgError::io(&link, e)),
    };

    let target = match link.parent() {
        Some(dir) if target.is_relative() => dir.join(&target),
        _ => target,
    };

    let manifest = match Manifest::read(&target.join("package.json")) {
        Ok(manifest) => manifest,
        // A dangling link is replaced by the remote strategy
        Err(e) if e.is_io_not_found() => return Err(not_linked(&link)),
        Err(e) => return Err(e),
    };
    let version = manifest.version().unwrap_or_default().to_string();

    if resolver.explicit && *request.parent == NodeId::Root {
        if let Specifier::Range(range) = specifier {
            if !satisfies(&version, range) {
                return Err(PkgError::LocalConflict {
                    name: request.name.to_string(),
                    version,
                    expected: request.constraint.to_string(),
                });
            }
        }
    }

    let id = id_for_target(&target);
    trace!(name = request.name, id = %id, "Using linked package");

    let dist = Dist {
        tarball: String::new(),
        integrity: None,
    };
    Ok(ResolvedPackage::new(
        id,
        request.name,
        Source::Local,
        dist,
        manifest,
    ))
}

fn not_linked(link: &Path) -> PkgError {
    PkgError::not_found(format!("{} is not linked", link.display()))
}

/// Store entries link to `<store>/<id>/package`; any other target gets an id
/// derived from its canonical path.
fn id_for_target(target: &Path) -> String {
    let normalized: PathBuf = dunce::canonicalize(target).unwrap_or_else(|_| target.to_path_buf());

    if normalized.file_name().is_some_and(|n| n == "package") {
        if let Some(id) = normalized
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .filter(|id| is_valid_id(id))
        {
            return id.to_string();
        }
    }

    sha1_bytes(normalized.to_string_lossy().as_bytes())
}
