//! Registry resolution: semver range or dist-tag matching.

use super::{Request, Resolver};
use crate::pkg::error::PkgError;
use crate::pkg::graph::{Dist, ResolvedPackage, Source};
use crate::pkg::registry::PackageRoot;
use crate::pkg::specifier::Specifier;
use crate::pkg::store::is_valid_id;
use crate::pkg::version::max_satisfying;

pub(super) async fn resolve(
    resolver: &Resolver,
    request: Request<'_>,
    specifier: &Specifier,
) -> Result<ResolvedPackage, PkgError> {
    let root = resolver.package_root(request.name).await?;
    let version = select_version(&root, request, specifier)?;

    let url = resolver
        .registry
        .package_root_url(request.name)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| request.name.to_string());
    let invalid = |reason: String| PkgError::PackageRoot {
        url: url.clone(),
        reason,
    };

    let manifest = root
        .manifest(version)
        .ok_or_else(|| invalid(format!("version {version} is not an object")))?;
    let dist = manifest
        .dist()
        .ok_or_else(|| invalid(format!("version {version} has no valid 'dist'")))?;
    let shasum = dist
        .shasum
        .as_deref()
        .map(str::to_ascii_lowercase)
        .filter(|s| is_valid_id(s))
        .ok_or_else(|| invalid(format!("version {version} has no valid 'dist.shasum'")))?;

    Ok(ResolvedPackage::new(
        shasum.clone(),
        request.name,
        Source::Registry,
        Dist {
            tarball: dist.tarball,
            integrity: Some(shasum),
        },
        manifest,
    ))
}

/// Pick the version a range or tag selects.
fn select_version<'a>(
    root: &'a PackageRoot,
    request: Request<'_>,
    specifier: &Specifier,
) -> Result<&'a str, PkgError> {
    let selected = match specifier {
        Specifier::Range(range) => max_satisfying(root.version_strings(), range),
        Specifier::Tag(tag) => root
            .tag(tag)
            .and_then(|v| root.versions.get_key_value(v))
            .map(|(k, _)| k.as_str()),
        Specifier::Tarball(_) | Specifier::Git(_) => None,
    };

    selected.ok_or_else(|| PkgError::Version {
        name: request.name.to_string(),
        requested: request.constraint.to_string(),
        available: root.version_strings().map(String::from).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::graph::NodeId;
    use serde_json::json;

    fn root() -> PackageRoot {
        PackageRoot::from_value(
            "left-pad",
            "http://r/left-pad",
            json!({
                "versions": { "1.0.0": {}, "1.2.0": {}, "2.0.0": {} },
                "dist-tags": { "latest": "1.2.0", "ghost": "9.9.9" }
            }),
        )
        .unwrap()
    }

    fn select(constraint: &str) -> Result<String, PkgError> {
        let root = root();
        let request = Request {
            parent: &NodeId::Root,
            name: "left-pad",
            constraint,
        };
        let specifier = Specifier::parse(constraint)?;
        select_version(&root, request, &specifier).map(String::from)
    }

    #[test]
    fn test_range_picks_highest_satisfying() {
        assert_eq!(select("^1.0.0").unwrap(), "1.2.0");
        assert_eq!(select("*").unwrap(), "2.0.0");
    }

    #[test]
    fn test_tag_lookup() {
        assert_eq!(select("latest").unwrap(), "1.2.0");
    }

    #[test]
    fn test_no_match_lists_available() {
        for constraint in ["^9.0.0", "next", "ghost"] {
            match select(constraint).unwrap_err() {
                PkgError::Version {
                    name,
                    requested,
                    available,
                } => {
                    assert_eq!(name, "left-pad");
                    assert_eq!(requested, constraint);
                    assert_eq!(available, vec!["1.0.0", "1.2.0", "2.0.0"]);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
