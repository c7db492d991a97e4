//! Node discovery for meshtable.
//!
//! The discovery loop periodically resolves the desired node set from a
//! pluggable backend, pings the nodes it can resolve, and drives the
//! join coordinator for every (table, node) pair so that segments form
//! and re-form without operator involvement.
//!
//! Discovery is deliberately dumb: a backend only answers "which nodes
//! should exist", the [`NodeDirectory`] answers "how do I reach a table
//! there", and every failure is logged and retried on the next poll.

mod backend;

pub use backend::{DiscoveryBackend, FileBackend, StaticBackend};

use meshtable_table::{Error as TableError, JoinOpts, Table, join};
use meshtable_types::{NodeName, TableName};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Result type for discovery operations.
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// Errors that can occur while resolving the node set.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The backend could not produce a node list.
    #[error("backend error: {0}")]
    Backend(String),

    /// Reading a backend source failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Registry from (node, table) to the table server reachable there.
///
/// Stands in for node connectivity: a pair that is not registered is an
/// unreachable node as far as discovery is concerned.
#[derive(Debug, Default)]
pub struct NodeDirectory {
    inner: RwLock<HashMap<(NodeName, TableName), Table>>,
}

impl NodeDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a table server under its node and table name.
    pub fn register(&self, table: &Table) {
        let key = (table.node().clone(), table.table_name().clone());
        self.write().insert(key, table.clone());
    }

    /// Removes a registration.
    pub fn unregister(&self, node: &NodeName, table: &TableName) {
        self.write().remove(&(node.clone(), table.clone()));
    }

    /// Resolves the server for a table on a node.
    #[must_use]
    pub fn get(&self, node: &NodeName, table: &TableName) -> Option<Table> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(node.clone(), table.clone()))
            .cloned()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<(NodeName, TableName), Table>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

/// Configuration for the discovery loop.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How often the backend is polled.
    pub poll_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// The discovery driver.
pub struct Discovery {
    config: DiscoveryConfig,
    backend: Box<dyn DiscoveryBackend>,
    directory: Arc<NodeDirectory>,
    tables: Vec<Table>,
}

impl Discovery {
    /// Creates a driver with the default poll interval.
    pub fn new(backend: Box<dyn DiscoveryBackend>, directory: Arc<NodeDirectory>) -> Self {
        Self::with_config(backend, directory, DiscoveryConfig::default())
    }

    /// Creates a driver with an explicit configuration.
    pub fn with_config(
        backend: Box<dyn DiscoveryBackend>,
        directory: Arc<NodeDirectory>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            config,
            backend,
            directory,
            tables: Vec::new(),
        }
    }

    /// Adds a local table the loop keeps joined to the node set.
    pub fn add_table(&mut self, table: Table) {
        self.tables.push(table);
    }

    /// One discovery pass: resolve the node set, then try to join every
    /// (table, node) pair that is resolvable, reachable and not yet a
    /// peer. Join failures are logged and retried on the next pass.
    pub async fn poll_once(&mut self) -> DiscoveryResult<()> {
        let nodes = self.backend.get_nodes().await?;
        debug!(count = nodes.len(), "resolved node set");

        for table in &self.tables {
            for node in &nodes {
                if node == table.node() {
                    continue;
                }
                let Some(remote) = self.directory.get(node, table.table_name()) else {
                    debug!(%node, table = %table.table_name(), "node not resolvable, skipping");
                    continue;
                };
                if remote.ping().await.is_err() {
                    debug!(%node, "node not responding, skipping");
                    continue;
                }
                match table.other_servers().await {
                    Ok(peers) if peers.contains(&remote) => continue,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(table = %table.table_name(), error = %err, "local table unavailable");
                        continue;
                    }
                }
                let lock_key = table.table_name().as_str();
                match join(lock_key, table.clone(), remote, JoinOpts::default()).await {
                    Ok(()) | Err(TableError::AlreadyJoined) => {}
                    Err(err) => {
                        warn!(%node, table = %table.table_name(), error = %err, "join failed, will retry");
                    }
                }
            }
        }
        Ok(())
    }

    /// Runs the loop forever, logging backend errors.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.poll_once().await {
                warn!(error = %err, "discovery poll failed");
            }
        }
    }
}
