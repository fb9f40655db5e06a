//! Resolution strategies.
//!
//! Each dependency edge is resolved by trying [`Strategy::Local`] first and
//! then the strategy selected by the constraint's [`Specifier`]. A strategy
//! that does not apply returns `PkgError::NotFound`, which falls through to
//! the next one; any other error is final.

mod git;
mod local;
mod registry;
mod tarball;

use super::error::PkgError;
use super::fetch::Fetcher;
use super::flight::Flights;
use super::graph::{NodeId, ResolvedPackage};
use super::registry::{PackageRoot, RegistryClient};
use super::specifier::Specifier;
use super::store::ContentStore;
use crate::config::GitHubEndpoints;
use std::sync::Arc;
use tracing::debug;

/// One dependency edge to resolve.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub parent: &'a NodeId,
    pub name: &'a str,
    pub constraint: &'a str,
}

/// The closed set of resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Reuse a package already linked under the parent.
    Local,
    /// Match a range or dist-tag against the registry's package root.
    Registry,
    /// Download a tarball URL.
    Tarball,
    /// Snapshot a GitHub repository.
    Git,
}

impl Strategy {
    /// The remote strategy for a specifier.
    #[must_use]
    pub fn for_specifier(specifier: &Specifier) -> Self {
        match specifier {
            Specifier::Range(_) | Specifier::Tag(_) => Self::Registry,
            Specifier::Tarball(_) => Self::Tarball,
            Specifier::Git(_) => Self::Git,
        }
    }

    async fn resolve(
        self,
        resolver: &Resolver,
        request: Request<'_>,
        specifier: &Specifier,
    ) -> Result<ResolvedPackage, PkgError> {
        match (self, specifier) {
            (Self::Local, _) => local::resolve(resolver, request, specifier).await,
            (Self::Registry, _) => registry::resolve(resolver, request, specifier).await,
            (Self::Tarball, Specifier::Tarball(url)) => {
                tarball::resolve(resolver, request, url).await
            }
            (Self::Git, Specifier::Git(repo)) => git::resolve(resolver, request, repo).await,
            (Self::Tarball | Self::Git, _) => {
                Err(PkgError::not_found(format!("{} via {self:?}", request.name)))
            }
        }
    }
}

/// Shared state for resolving every edge of one run.
pub struct Resolver {
    registry: RegistryClient,
    fetcher: Arc<Fetcher>,
    github: GitHubEndpoints,
    explicit: bool,
    package_roots: Flights<String, Arc<PackageRoot>>,
}

impl Resolver {
    /// `explicit` marks a run whose root dependencies were requested on the
    /// command line; their ranges are then enforced against local links.
    #[must_use]
    pub fn new(
        registry: RegistryClient,
        fetcher: Arc<Fetcher>,
        github: GitHubEndpoints,
        explicit: bool,
    ) -> Self {
        Self {
            registry,
            fetcher,
            github,
            explicit,
            package_roots: Flights::new(),
        }
    }

    fn store(&self) -> &ContentStore {
        self.fetcher.store()
    }

    /// Resolve `name@constraint` as a dependency of `parent`.
    ///
    /// # Errors
    /// Returns the first non-`NotFound` strategy error, or the last
    /// `NotFound` if no strategy applies.
    pub async fn resolve(
        &self,
        parent: &NodeId,
        name: &str,
        constraint: &str,
    ) -> Result<ResolvedPackage, PkgError> {
        let specifier = Specifier::parse(constraint)?;
        let request = Request {
            parent,
            name,
            constraint,
        };

        let mut last = PkgError::not_found(format!("{name}@{constraint}"));
        for strategy in [Strategy::Local, Strategy::for_specifier(&specifier)] {
            match strategy.resolve(self, request, &specifier).await {
                Ok(resolved) => {
                    debug!(
                        parent = %parent,
                        name,
                        constraint,
                        strategy = ?strategy,
                        id = %resolved.id,
                        version = %resolved.version,
                        "Resolved"
                    );
                    return Ok(resolved);
                }
                Err(e) if e.is_not_found() => last = e,
                Err(e) => return Err(e),
            }
        }
        Err(last)
    }

    /// Package-root document for `name`, fetched at most once per run.
    async fn package_root(&self, name: &str) -> Result<Arc<PackageRoot>, PkgError> {
        let registry = self.registry.clone();
        let owned = name.to_string();
        self.package_roots
            .run(name.to_string(), move || async move {
                registry.fetch_package_root(&owned).await.map(Arc::new)
            })
            .await
    }

    /// Package-root fetches started so far.
    #[must_use]
    pub fn package_roots_requested(&self) -> usize {
        self.package_roots.len()
    }
}
