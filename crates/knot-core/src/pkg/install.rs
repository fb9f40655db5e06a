//! The install pipeline.
//!
//! Expansion streams edges; each edge is fetched and then linked as soon as
//! it arrives, so downloads overlap with resolution. Lifecycle scripts run
//! once every edge is in place.

use super::build::BuildRunner;
use super::error::PkgError;
use super::expand::Expander;
use super::fetch::Fetcher;
use super::graph::{InstallEdge, NodeId, ResolvedPackage, Source};
use super::link::Linker;
use super::manifest::Manifest;
use super::registry::RegistryClient;
use super::spec::PackageSpec;
use super::store::ContentStore;
use super::strategy::Resolver;
use crate::config::InstallConfig;
use crate::paths::default_store_dir;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// A package placed by an install run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPackage {
    pub id: String,
    pub name: String,
    pub version: String,
    pub source: Source,
}

impl From<&ResolvedPackage> for InstalledPackage {
    fn from(resolved: &ResolvedPackage) -> Self {
        Self {
            id: resolved.id.clone(),
            name: resolved.name.clone(),
            version: resolved.version.clone(),
            source: resolved.source,
        }
    }
}

/// What an install run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct InstallSummary {
    /// Dependency edges resolved.
    pub edges: usize,
    /// Distinct packages, ordered by id.
    pub packages: Vec<InstalledPackage>,
    /// What each root dependency resolved to, by dependency name.
    pub direct: BTreeMap<String, InstalledPackage>,
    /// Tarballs downloaded.
    pub downloaded: usize,
    /// Packages satisfied without a download.
    pub reused: usize,
    /// Symlinks created or replaced.
    pub linked: usize,
    pub scripts_run: usize,
}

/// Install the dependencies declared in `<project_root>/package.json`.
///
/// # Errors
/// Returns the first error of the run; see [`install`].
pub async fn install_project(
    project_root: &Path,
    config: &InstallConfig,
) -> Result<InstallSummary, PkgError> {
    let manifest = Manifest::read(&project_root.join("package.json"))?;
    install(project_root, manifest, config, false).await
}

/// Install packages named on the command line into `project_root`.
///
/// Their ranges are enforced against packages already linked there.
///
/// # Errors
/// Returns the first error of the run; see [`install`].
pub async fn install_specs(
    project_root: &Path,
    specs: &[PackageSpec],
    config: &InstallConfig,
) -> Result<InstallSummary, PkgError> {
    install(project_root, Manifest::from_specs(specs), config, true).await
}

/// Run the full pipeline for `root`.
///
/// The first unrecovered error aborts the run; in-flight work is dropped.
///
/// # Errors
/// Returns resolution, fetch and link errors as they occur, and
/// `PkgError::FailedBuild` if any lifecycle script fails.
pub async fn install(
    project_root: &Path,
    root: Manifest,
    config: &InstallConfig,
    explicit: bool,
) -> Result<InstallSummary, PkgError> {
    let project_root = dunce::canonicalize(project_root)
        .map_err(|e| PkgError::io(project_root, e))?;
    let store = ContentStore::new(
        project_root.clone(),
        store_root(&project_root, config),
        config.cache_dir.clone(),
    );

    let registry = RegistryClient::new(config)?;
    let fetcher = Arc::new(Fetcher::new(store.clone(), registry.clone()));
    let resolver = Arc::new(Resolver::new(
        registry,
        Arc::clone(&fetcher),
        config.github.clone(),
        explicit,
    ));
    let linker = Arc::new(Linker::new(store.clone()));

    info!(
        project = %project_root.display(),
        store = %store.store_root().display(),
        registry = %config.registry,
        "Installing"
    );

    let (expansion, mut edges) = Expander::new(Arc::clone(&resolver)).spawn(Arc::new(root));
    let abort = expansion.abort_handle();

    let mut summary = InstallSummary::default();
    let mut packages: BTreeMap<String, Arc<ResolvedPackage>> = BTreeMap::new();
    let mut placing: FuturesUnordered<BoxFuture<'static, Result<usize, PkgError>>> =
        FuturesUnordered::new();
    let mut streaming = true;

    loop {
        tokio::select! {
            edge = edges.recv(), if streaming => match edge {
                Some(edge) => {
                    summary.edges += 1;
                    if edge.parent == NodeId::Root {
                        summary
                            .direct
                            .insert(edge.name.clone(), InstalledPackage::from(&*edge.resolved));
                    }
                    record(&mut packages, &edge.resolved);
                    placing.push(place(Arc::clone(&fetcher), Arc::clone(&linker), edge).boxed());
                }
                None => streaming = false,
            },
            Some(result) = placing.next() => match result {
                Ok(changed) => summary.linked += changed,
                Err(e) => {
                    abort.abort();
                    return Err(e);
                }
            },
            else => break,
        }
    }

    match expansion.await {
        Ok(result) => result?,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => return Err(PkgError::Config(format!("expansion cancelled: {e}"))),
    }

    summary.downloaded = fetcher.downloads();
    summary.reused = packages.len().saturating_sub(summary.downloaded);
    debug!(
        package_roots = resolver.package_roots_requested(),
        edges = summary.edges,
        "Graph placed"
    );

    let packages: Vec<_> = packages.into_values().collect();
    if config.run_scripts {
        let runner = BuildRunner::new(
            store,
            config.sh.clone(),
            config.sh_flag.clone(),
            config.bin_dir.clone(),
        );
        summary.scripts_run = runner.run(&packages).await?;
    }

    summary.packages = packages.iter().map(|p| InstalledPackage::from(&**p)).collect();

    info!(
        packages = summary.packages.len(),
        downloaded = summary.downloaded,
        linked = summary.linked,
        scripts = summary.scripts_run,
        "Install complete"
    );
    Ok(summary)
}

/// Fetch then link one edge. Edges resolved locally are already in place.
async fn place(
    fetcher: Arc<Fetcher>,
    linker: Arc<Linker>,
    edge: InstallEdge,
) -> Result<usize, PkgError> {
    if edge.resolved.source == Source::Local {
        return Ok(0);
    }
    fetcher.fetch(&edge.resolved.id, &edge.resolved.dist).await?;
    linker.link(&edge).await
}

/// Keep one package per id, preferring one placed by this run over a local one.
fn record(packages: &mut BTreeMap<String, Arc<ResolvedPackage>>, resolved: &Arc<ResolvedPackage>) {
    let slot = packages
        .entry(resolved.id.clone())
        .or_insert_with(|| Arc::clone(resolved));
    if slot.source == Source::Local && resolved.source != Source::Local {
        *slot = Arc::clone(resolved);
    }
}

fn store_root(project_root: &Path, config: &InstallConfig) -> PathBuf {
    match &config.store_dir {
        Some(dir) => project_root.join(dir),
        None => default_store_dir(project_root),
    }
}
