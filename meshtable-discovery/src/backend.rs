//! Discovery backends.
//!
//! A backend answers one question: which nodes should currently exist.
//! It owns whatever state it needs and reports errors instead of
//! crashing the loop; the loop retries on the next poll.

use crate::{DiscoveryError, DiscoveryResult};
use async_trait::async_trait;
use meshtable_types::NodeName;
use std::path::PathBuf;

/// Source of the desired node set.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Resolves the current node set.
    async fn get_nodes(&mut self) -> DiscoveryResult<Vec<NodeName>>;
}

/// A fixed node list.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    nodes: Vec<NodeName>,
}

impl StaticBackend {
    /// Creates a backend returning exactly these nodes.
    #[must_use]
    pub fn new(nodes: Vec<NodeName>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl DiscoveryBackend for StaticBackend {
    async fn get_nodes(&mut self) -> DiscoveryResult<Vec<NodeName>> {
        Ok(self.nodes.clone())
    }
}

/// Node list read from a file, one node name per line.
///
/// The file is re-read on every poll, so it can be rewritten while the
/// system runs. Blank lines and `#` comments are ignored.
#[derive(Debug, Clone)]
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    /// Creates a backend reading from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DiscoveryBackend for FileBackend {
    async fn get_nodes(&mut self) -> DiscoveryResult<Vec<NodeName>> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(DiscoveryError::Io)?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(NodeName::from)
            .collect())
    }
}
