//! The ack aggregator.
//!
//! One aggregator serves one table server. It tracks, per outstanding
//! write, which peers still owe an acknowledgement, and releases the
//! waiting caller once the set empties, or once a missing peer's death
//! makes its ack moot. Acknowledgements arrive best effort from remote
//! servers; anything malformed is logged and dropped, never a crash.

use crate::error::{Error, Result};
use crate::proc::{DownReason, ProcGuard, ProcRef};
use meshtable_types::{Bits, Mask, ProcId, TableName, WriteRef};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

/// Messages accepted by the aggregator.
enum AckMsg {
    /// Register a new pending write with its wait-list and the caller
    /// to release.
    Add {
        write_ref: WriteRef,
        peers: Vec<ProcId>,
        reply: oneshot::Sender<Result<()>>,
    },
    /// A peer acknowledged a write.
    Ack { write_ref: WriteRef, peer: ProcId },
    /// A peer died; treat it as having acknowledged everything.
    RemoteDown { peer: ProcId },
}

/// Cloneable, fire-and-forget handle to an ack aggregator.
#[derive(Debug, Clone)]
pub struct AckHandle {
    id: ProcId,
    tx: mpsc::UnboundedSender<AckMsg>,
}

impl AckHandle {
    /// The aggregator's process identity.
    #[must_use]
    pub fn id(&self) -> ProcId {
        self.id
    }

    /// Registers a pending write. `peers` must be non-empty: the table
    /// server releases empty-peer writes inline and never calls this.
    pub fn add(&self, write_ref: WriteRef, peers: Vec<ProcId>, reply: oneshot::Sender<Result<()>>) {
        let _ = self.tx.send(AckMsg::Add {
            write_ref,
            peers,
            reply,
        });
    }

    /// Marks `peer` as having acknowledged `write_ref`. Unknown tokens
    /// and unknown peers are dropped silently.
    pub fn ack(&self, write_ref: WriteRef, peer: ProcId) {
        let _ = self.tx.send(AckMsg::Ack { write_ref, peer });
    }

    /// Acknowledges every tracked write on behalf of a dead peer.
    pub fn remote_down(&self, peer: ProcId) {
        let _ = self.tx.send(AckMsg::RemoteDown { peer });
    }
}

/// One outstanding write: its wait-list and the caller to release.
///
/// The remaining peers are tracked as bit flags indexed by position in
/// the wait-list, cleared one per acknowledgement.
struct Pending {
    peers: Vec<ProcId>,
    remaining: Bits,
    reply: oneshot::Sender<Result<()>>,
}

/// Spawns the aggregator for a table server. It runs until every handle
/// is dropped (which happens when the table server stops) and then exits
/// with `Normal` reason.
pub fn spawn_ack(table: TableName) -> (AckHandle, ProcRef) {
    let (guard, proc_ref) = ProcGuard::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = AckHandle {
        id: guard.id(),
        tx,
    };
    tokio::spawn(run(table, guard, rx));
    (handle, proc_ref)
}

async fn run(table: TableName, mut guard: ProcGuard, mut rx: mpsc::UnboundedReceiver<AckMsg>) {
    let mut pending: HashMap<WriteRef, Pending> = HashMap::new();

    while let Some(msg) = rx.recv().await {
        match msg {
            AckMsg::Add {
                write_ref,
                peers,
                reply,
            } => {
                if peers.is_empty() {
                    let _ = reply.send(Ok(()));
                    continue;
                }
                let remaining = Bits::zero().set_flags(&(0..peers.len()).collect::<Vec<_>>());
                pending.insert(
                    write_ref,
                    Pending {
                        peers,
                        remaining,
                        reply,
                    },
                );
            }
            AckMsg::Ack { write_ref, peer } => {
                apply_ack(&table, &mut pending, write_ref, peer);
            }
            AckMsg::RemoteDown { peer } => {
                debug!(%table, %peer, "releasing pending writes for dead peer");
                let refs: Vec<WriteRef> = pending.keys().copied().collect();
                for write_ref in refs {
                    apply_ack(&table, &mut pending, write_ref, peer);
                }
            }
        }
    }

    // Callers still waiting observe the dropped reply channels.
    guard.set_exit_reason(DownReason::Normal);
}

fn apply_ack(
    table: &TableName,
    pending: &mut HashMap<WriteRef, Pending>,
    write_ref: WriteRef,
    peer: ProcId,
) {
    let Some(entry) = pending.get_mut(&write_ref) else {
        debug!(%table, %write_ref, %peer, "ack for unknown write, dropping");
        return;
    };
    let Some(pos) = entry.peers.iter().position(|p| *p == peer) else {
        debug!(%table, %write_ref, %peer, "ack from unknown peer, dropping");
        return;
    };
    entry.remaining = entry.remaining.apply_mask(&Mask::unset_flag(pos));
    let released = entry.remaining.is_zero();
    if released {
        if let Some(done) = pending.remove(&write_ref) {
            let _ = done.reply.send(Ok(()));
        }
    }
}

/// Maps a dropped reply channel to the failure surfaced to a waiting
/// writer.
pub(crate) fn closed_error() -> Error {
    Error::ServerDown("ack aggregator terminated".to_string())
}
