//! GitHub repository resolution.
//!
//! The branch head commit is the content id and the snapshot tarball is
//! taken at that commit, so a branch moving mid-run cannot change contents.

use super::{Request, Resolver};
use crate::pkg::error::PkgError;
use crate::pkg::graph::{Dist, ResolvedPackage, Source};
use crate::pkg::manifest::Manifest;
use crate::pkg::specifier::GitRepo;
use crate::pkg::store::is_valid_id;
use serde_json::Value;
use std::path::Path;

pub(super) async fn resolve(
    resolver: &Resolver,
    request: Request<'_>,
    repo: &GitRepo,
) -> Result<ResolvedPackage, PkgError> {
    let github = &resolver.github;
    let GitRepo { owner, repo: name, .. } = repo;
    let reference = repo.reference();

    let manifest_url = endpoint(&github.raw, &format!("{owner}/{name}/{reference}/package.json"));
    let head_url = endpoint(
        &github.api,
        &format!("repos/{owner}/{name}/git/refs/heads/{reference}"),
    );

    let (manifest, head) = tokio::try_join!(
        resolver.registry.get_json(&manifest_url),
        resolver.registry.get_json(&head_url),
    )?;

    let sha = head_sha(&head).ok_or_else(|| PkgError::PackageRoot {
        url: head_url.clone(),
        reason: "missing 'object.sha'".to_string(),
    })?;
    let manifest = Manifest::from_value(manifest, Path::new(&manifest_url))?;

    let dist = Dist {
        tarball: endpoint(&github.codeload, &format!("{owner}/{name}/tar.gz/{sha}")),
        integrity: None,
    };

    Ok(ResolvedPackage::new(
        sha,
        request.name,
        Source::Git,
        dist,
        manifest,
    ))
}

fn head_sha(head: &Value) -> Option<String> {
    head.pointer("/object/sha")
        .and_then(Value::as_str)
        .map(str::to_ascii_lowercase)
        .filter(|sha| is_valid_id(sha))
}

fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{path}", base.trim_end_matches('/'))
}
