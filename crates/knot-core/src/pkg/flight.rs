//! Per-run request deduplication.

use super::error::PkgError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::hash::Hash;

type SharedResult<V> = Shared<BoxFuture<'static, Result<V, PkgError>>>;

/// Runs at most one operation per key and remembers its outcome.
///
/// Concurrent callers for the same key await the same future; later callers
/// get the stored result, success or failure, without re-running it.
pub struct Flights<K, V> {
    inner: DashMap<K, SharedResult<V>>,
}

impl<K, V> Flights<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Run `op` unless an operation for `key` already exists, then await
    /// the shared outcome.
    pub async fn run<F, Fut>(&self, key: K, op: F) -> Result<V, PkgError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, PkgError>> + Send + 'static,
    {
        // The shard lock is released before awaiting
        let flight = match self.inner.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let flight = op().boxed().shared();
                entry.insert(flight.clone());
                flight
            }
        };
        flight.await
    }

    /// Number of distinct keys seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<K, V> Default for Flights<K, V>
where
    K: Eq + Hash,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
