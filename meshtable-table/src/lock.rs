//! Cluster-wide named advisory locks.
//!
//! Joins for one lock key must be serialized across the whole cluster.
//! Within a single process the lock space is this registry; a deployment
//! spanning real nodes would back the same interface with a lease
//! service. Acquisition never gives up: every timed-out attempt is
//! logged with its attempt number and re-entered.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

/// How long one acquisition attempt waits before logging and retrying.
const ACQUIRE_ATTEMPT: Duration = Duration::from_secs(5);

/// Name of a cluster-wide lock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LockKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for LockKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The named-lock registry.
#[derive(Debug, Default)]
pub struct GlobalLocks {
    locks: StdMutex<HashMap<LockKey, Arc<Mutex<()>>>>,
}

static GLOBAL: OnceLock<GlobalLocks> = OnceLock::new();

impl GlobalLocks {
    /// An empty, private lock space.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide lock space used by the join coordinator.
    #[must_use]
    pub fn global() -> &'static GlobalLocks {
        GLOBAL.get_or_init(Self::new)
    }

    /// Runs `fut` while holding the named lock, releasing it on every
    /// exit path. Acquisition retries without bound, logging each
    /// timed-out attempt.
    pub async fn with_lock<T>(&self, key: &LockKey, fut: impl Future<Output = T>) -> T {
        let lock = self.entry(key);
        let mut attempt: u32 = 0;
        let guard = loop {
            attempt += 1;
            match tokio::time::timeout(ACQUIRE_ATTEMPT, lock.clone().lock_owned()).await {
                Ok(guard) => break guard,
                Err(_) => warn!(%key, attempt, "lock busy, retrying"),
            }
        };
        let out = fut.await;
        drop(guard);
        out
    }

    fn entry(&self, key: &LockKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(key.clone()).or_default().clone()
    }
}
