//! Supervised long-running tasks.
//!
//! Wraps a future in a spawned worker, logs a progress line while it
//! runs, and converts a panic or abort of the worker into a tagged
//! error value instead of tearing down the caller. Joins run inside
//! this wrapper.

use crate::error::{Error, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How often a still-running task is logged.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Runs `fut` in a supervised worker task. The worker's own `Result`
/// passes through unchanged; a panic or abort becomes
/// [`Error::TaskFailed`].
pub async fn run_tracked<T, F>(label: &str, fut: F) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let started = Instant::now();
    let mut handle = tokio::spawn(fut);
    let mut ticker =
        tokio::time::interval_at(tokio::time::Instant::now() + PROGRESS_INTERVAL, PROGRESS_INTERVAL);
    loop {
        tokio::select! {
            res = &mut handle => {
                return match res {
                    Ok(inner) => inner,
                    Err(err) => {
                        warn!(label, error = %err, "long task died");
                        Err(Error::TaskFailed(format!("{label}: {err}")))
                    }
                };
            }
            _ = ticker.tick() => {
                info!(
                    label,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "long task still running"
                );
            }
        }
    }
}
