//! Fetching resolved packages into the store.

use super::error::{IoContext, PkgError};
use super::flight::Flights;
use super::graph::Dist;
use super::registry::RegistryClient;
use super::store::ContentStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// How a fetch was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Contents were already extracted in the store.
    Present,
    /// Extracted from a previously verified tarball.
    Cached,
    /// Downloaded, verified and extracted.
    Downloaded,
}

/// Downloads, verifies and extracts packages, once per id per run.
pub struct Fetcher {
    store: ContentStore,
    registry: RegistryClient,
    flights: Flights<String, FetchOutcome>,
    downloads: Arc<AtomicUsize>,
}

impl Fetcher {
    #[must_use]
    pub fn new(store: ContentStore, registry: RegistryClient) -> Self {
        Self {
            store,
            registry,
            flights: Flights::new(),
            downloads: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[must_use]
    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Tarballs downloaded so far in this run.
    #[must_use]
    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }

    /// Make `<store>/<id>/package` available.
    ///
    /// Concurrent and repeated calls for the same id share one outcome.
    ///
    /// # Errors
    /// Returns `PkgError::CorruptedPackage` if the downloaded bytes do not
    /// match `dist.integrity` (nothing is cached in that case), or the
    /// network/extraction error.
    pub async fn fetch(&self, id: &str, dist: &Dist) -> Result<FetchOutcome, PkgError> {
        let store = self.store.clone();
        let registry = self.registry.clone();
        let downloads = Arc::clone(&self.downloads);
        let key = id.to_string();
        let dist = dist.clone();

        self.flights
            .run(id.to_string(), move || async move {
                fetch_uncached(&store, &registry, &downloads, &key, &dist).await
            })
            .await
    }
}

async fn fetch_uncached(
    store: &ContentStore,
    registry: &RegistryClient,
    downloads: &AtomicUsize,
    id: &str,
    dist: &Dist,
) -> Result<FetchOutcome, PkgError> {
    let dest = store.package_dir(id);
    if tokio::fs::metadata(&dest).await.is_ok_and(|m| m.is_dir()) {
        debug!(id, "Already in store");
        return Ok(FetchOutcome::Present);
    }

    match store.extract(&dest, id).await {
        Ok(()) => return Ok(FetchOutcome::Cached),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let sink = store.write()?;
    let temp_path = sink.path().to_path_buf();
    let actual = {
        let mut file = tokio::fs::File::from_std(sink.reopen().at(&temp_path)?);
        registry.download(&dist.tarball, &mut file, &temp_path).await?
    };

    if let Some(expected) = &dist.integrity {
        if !expected.eq_ignore_ascii_case(&actual) {
            // Dropping the sink deletes the unverified bytes
            return Err(PkgError::CorruptedPackage {
                url: dist.tarball.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    store.commit(sink, id)?;
    downloads.fetch_add(1, Ordering::SeqCst);
    info!(id, url = %dist.tarball, "Downloaded package");

    store.extract(&dest, id).await?;
    Ok(FetchOutcome::Downloaded)
}
