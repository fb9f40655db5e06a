//! Dependency graph expansion.
//!
//! Turns the root manifest into the flat set of [`InstallEdge`]s. Every node
//! is expanded at most once per run, keyed by content id: this both
//! deduplicates shared dependencies and terminates cycles. Two requests for
//! the same name that resolve to different ids are distinct nodes.

use super::error::PkgError;
use super::graph::{InstallEdge, NodeId};
use super::manifest::{Manifest, DEPENDENCY_FIELDS, ENTRY_DEPENDENCY_FIELDS};
use super::strategy::Resolver;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

type Pending = FuturesUnordered<BoxFuture<'static, Result<InstallEdge, PkgError>>>;

/// Expands one run's dependency graph.
pub struct Expander {
    resolver: Arc<Resolver>,
    visited: HashSet<NodeId>,
}

impl Expander {
    #[must_use]
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            visited: HashSet::new(),
        }
    }

    /// Expand in a background task, streaming edges as they resolve.
    ///
    /// The channel closes when expansion finishes; the task's result reports
    /// the first resolution error.
    pub fn spawn(
        self,
        root: Arc<Manifest>,
    ) -> (
        JoinHandle<Result<(), PkgError>>,
        mpsc::UnboundedReceiver<InstallEdge>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(root, tx));
        (handle, rx)
    }

    /// Expand to completion and return every edge.
    ///
    /// # Errors
    /// Returns the first resolution error.
    pub async fn collect(self, root: Arc<Manifest>) -> Result<Vec<InstallEdge>, PkgError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.run(root, tx).await?;

        let mut edges = Vec::new();
        while let Some(edge) = rx.recv().await {
            edges.push(edge);
        }
        Ok(edges)
    }

    async fn run(
        mut self,
        root: Arc<Manifest>,
        tx: mpsc::UnboundedSender<InstallEdge>,
    ) -> Result<(), PkgError> {
        let mut pending = Pending::new();
        self.visit(NodeId::Root, &root, &mut pending);

        while let Some(result) = pending.next().await {
            let edge = result?;
            let child = Arc::clone(&edge.resolved);

            if tx.send(edge).is_err() {
                debug!("Edge receiver dropped, stopping expansion");
                return Ok(());
            }

            self.visit(child.node(), &child.manifest, &mut pending);
        }

        debug!(nodes = self.visited.len(), "Expansion complete");
        Ok(())
    }

    /// Queue resolution of a node's dependencies unless it was seen before.
    fn visit(&mut self, node: NodeId, manifest: &Manifest, pending: &mut Pending) {
        if !self.visited.insert(node.clone()) {
            return;
        }

        let fields = if node == NodeId::Root {
            ENTRY_DEPENDENCY_FIELDS
        } else {
            DEPENDENCY_FIELDS
        };
        let deps = manifest.dependencies(fields);

        for error in &deps.errors {
            warn!(
                node = %node,
                name = %error.name,
                code = error.code,
                "Skipping dependency: {}",
                error.message
            );
        }

        for (name, constraint) in deps.deps {
            let resolver = Arc::clone(&self.resolver);
            let parent = node.clone();
            pending.push(
                async move {
                    let resolved = resolver.resolve(&parent, &name, &constraint).await?;
                    Ok(InstallEdge {
                        parent,
                        name,
                        resolved: Arc::new(resolved),
                    })
                }
                .boxed(),
            );
        }
    }
}
