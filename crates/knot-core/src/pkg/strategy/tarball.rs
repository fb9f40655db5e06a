//! Tarball URL resolution.

use super::{Request, Resolver};
use crate::pkg::error::PkgError;
use crate::pkg::graph::{Dist, ResolvedPackage, Source};
use crate::pkg::manifest::Manifest;
use knot_util::hash::sha1_bytes;

/// The id is derived from the URL, so the archive carries no digest to check
/// against. It is fetched here because only its `package.json` names the
/// package's own dependencies.
pub(super) async fn resolve(
    resolver: &Resolver,
    request: Request<'_>,
    url: &str,
) -> Result<ResolvedPackage, PkgError> {
    let id = sha1_bytes(url.as_bytes());
    let dist = Dist {
        tarball: url.to_string(),
        integrity: None,
    };

    resolver.fetcher.fetch(&id, &dist).await?;

    let manifest_path = resolver.store().package_dir(&id).join("package.json");
    let manifest = Manifest::read(&manifest_path)?;

    Ok(ResolvedPackage::new(
        id,
        request.name,
        Source::Tarball,
        dist,
        manifest,
    ))
}
