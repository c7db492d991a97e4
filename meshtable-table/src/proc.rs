//! Process identities, liveness and DOWN monitors.
//!
//! Every message-serialized actor in the engine (table server, ack
//! aggregator, join worker) owns a [`ProcGuard`] for its lifetime and
//! hands out cloneable [`ProcRef`]s. Dropping the guard, on clean exit
//! and task abort alike, publishes a [`DownReason`] to every subscriber,
//! which is how peers observe one another's deaths.

use meshtable_types::ProcId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Why a process went down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownReason {
    /// Clean, intentional stop.
    Normal,
    /// Abrupt termination (kill, abort, panic).
    Killed,
    /// A `check_server` probe found a stale alias or join reference.
    CheckServerFailed,
    /// Anything else, with a description.
    Other(String),
}

impl std::fmt::Display for DownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Killed => write!(f, "killed"),
            Self::CheckServerFailed => write!(f, "check_server_failed"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Liveness guard owned by a running process.
///
/// The guard publishes its exit reason when dropped, so an aborted task
/// still notifies its watchers. The default reason is [`DownReason::Killed`];
/// call [`ProcGuard::set_exit_reason`] before a clean return.
#[derive(Debug)]
pub struct ProcGuard {
    id: ProcId,
    tx: watch::Sender<Option<DownReason>>,
    exit_reason: DownReason,
}

impl ProcGuard {
    /// Creates a fresh process identity and its subscription handle.
    #[must_use]
    pub fn new() -> (Self, ProcRef) {
        let id = ProcId::new();
        let (tx, rx) = watch::channel(None);
        (
            Self {
                id,
                tx,
                exit_reason: DownReason::Killed,
            },
            ProcRef { id, rx },
        )
    }

    /// This process's identity.
    #[must_use]
    pub fn id(&self) -> ProcId {
        self.id
    }

    /// Sets the reason published when the guard drops.
    pub fn set_exit_reason(&mut self, reason: DownReason) {
        self.exit_reason = reason;
    }
}

impl Drop for ProcGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(Some(self.exit_reason.clone()));
    }
}

/// Cloneable liveness subscription for a process.
#[derive(Debug, Clone)]
pub struct ProcRef {
    id: ProcId,
    rx: watch::Receiver<Option<DownReason>>,
}

impl ProcRef {
    /// The identity of the process this handle refers to.
    #[must_use]
    pub fn id(&self) -> ProcId {
        self.id
    }

    /// Whether the process has not yet published a down reason.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.rx.borrow().is_none()
    }

    /// Waits for the process to go down and returns the reason.
    pub async fn down(&self) -> DownReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                // Sender gone without publishing: treat as a kill.
                return rx.borrow().clone().unwrap_or(DownReason::Killed);
            }
        }
    }

    /// Subscribes `tx` to this process's death: exactly one message,
    /// produced by `f` from the id and reason, is delivered when the
    /// process goes down. Returns a handle that cancels the
    /// subscription.
    pub fn monitor<M, F>(&self, tx: mpsc::UnboundedSender<M>, f: F) -> MonitorHandle
    where
        M: Send + 'static,
        F: FnOnce(ProcId, DownReason) -> M + Send + 'static,
    {
        let target = self.clone();
        let handle = tokio::spawn(async move {
            let reason = target.down().await;
            let _ = tx.send(f(target.id, reason));
        });
        MonitorHandle { handle }
    }
}

/// Cancellation handle for a monitor subscription. Dropping it cancels
/// the subscription, so a dying subscriber cannot leak notifier tasks.
#[derive(Debug)]
pub struct MonitorHandle {
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Cancels the subscription; no DOWN message will be delivered.
    pub fn demonitor(self) {}
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
