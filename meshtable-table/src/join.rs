//! The join coordinator.
//!
//! A join merges two segments into one. Under the cluster-wide lock for
//! the given key it pauses every member of both sides, flushes in-flight
//! traffic, exchanges dumps (optionally resolving per-key conflicts),
//! mints a fresh alias generation and join reference, installs the
//! merged membership on every member, and unpauses on every exit path.
//!
//! The coordinator is a stateless procedure run in a supervised worker.
//! Pause tokens monitor the worker, so servers resume on their own even
//! if the worker dies mid-join.

use crate::error::{Error, JoinSide, Result};
use crate::lock::{GlobalLocks, LockKey};
use crate::long_task;
use crate::proc::{DownReason, ProcGuard, ProcRef};
use crate::server::{ConflictHandler, PeerLink, Table};
use futures::future::BoxFuture;
use meshtable_types::{AliasId, DumpRef, JoinRef, PauseToken, ProcId, Record, TableType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Points at which a test checkpoint handler is consulted. A handler
/// error aborts the join right there, leaving whatever partial state the
/// protocol allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    BeforeCheckFullyConnected,
    BeforeSendDump(ProcId),
    BeforeApplyDump(ProcId),
    BeforeUnpause,
}

/// Async test hook invoked at each [`Checkpoint`].
pub type CheckpointHandler =
    Arc<dyn Fn(Checkpoint) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Options for a join.
#[derive(Clone, Default)]
pub struct JoinOpts {
    /// Test-only checkpoint hook.
    pub checkpoint: Option<CheckpointHandler>,
}

impl std::fmt::Debug for JoinOpts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinOpts")
            .field("checkpoint", &self.checkpoint.is_some())
            .finish()
    }
}

/// Joins the segments of `local` and `remote`, serialized cluster-wide
/// per `lock_key`.
pub async fn join(
    lock_key: impl Into<LockKey>,
    local: Table,
    remote: Table,
    opts: JoinOpts,
) -> Result<()> {
    let lock_key = lock_key.into();
    if local == remote {
        return Err(Error::SameServer);
    }
    if local.other_servers().await?.contains(&remote) {
        return Err(Error::AlreadyJoined);
    }
    info!(%lock_key, local = %local.id(), remote = %remote.id(), "joining segments");
    let label = format!("join {lock_key}");
    long_task::run_tracked(&label, async move {
        GlobalLocks::global()
            .with_lock(&lock_key, join_locked(local, remote, opts))
            .await
    })
    .await
}

async fn join_locked(local: Table, remote: Table, opts: JoinOpts) -> Result<()> {
    // The join worker is a process of its own: pause tokens monitor it,
    // so a dying worker releases every server it paused.
    let (mut guard, worker) = ProcGuard::new();

    let result = join_under_lock(&opts, &worker, &local, &remote).await;
    if let Err(err) = &result {
        warn!(error = %err, "join failed");
    }
    guard.set_exit_reason(DownReason::Normal);
    drop(guard);
    result
}

async fn join_under_lock(
    opts: &JoinOpts,
    worker: &ProcRef,
    local: &Table,
    remote: &Table,
) -> Result<()> {
    // Membership may have changed while we waited for the lock.
    let loc_servers = side_servers(local).await?;
    let rem_servers = side_servers(remote).await?;
    if loc_servers.contains(remote) {
        return Err(Error::AlreadyJoined);
    }
    if loc_servers.iter().any(|t| rem_servers.contains(t)) {
        return Err(Error::SegmentsOverlap);
    }

    checkpoint(opts, Checkpoint::BeforeCheckFullyConnected).await?;
    check_fully_connected(&loc_servers).await?;
    check_fully_connected(&rem_servers).await?;

    let mut paused: Vec<(Table, PauseToken)> = Vec::new();
    let result = install(
        opts,
        worker,
        local,
        remote,
        &loc_servers,
        &rem_servers,
        &mut paused,
    )
    .await;

    // Exit path, success and failure alike. Unpause errors are logged,
    // never surfaced.
    let at_unpause = checkpoint(opts, Checkpoint::BeforeUnpause).await;
    for (server, token) in paused {
        if let Err(err) = server.unpause(token).await {
            warn!(server = %server.id(), error = %err, "unpause failed");
        }
    }
    result.and(at_unpause)
}

async fn install(
    opts: &JoinOpts,
    worker: &ProcRef,
    local: &Table,
    remote: &Table,
    loc_servers: &[Table],
    rem_servers: &[Table],
    paused: &mut Vec<(Table, PauseToken)>,
) -> Result<()> {
    for server in loc_servers.iter().chain(rem_servers) {
        let token = server.pause(worker).await?;
        paused.push((server.clone(), token));
    }
    assert_paused(local, JoinSide::Local).await?;
    assert_paused(remote, JoinSide::Remote).await?;

    // Flush whatever was in flight when the pauses landed.
    local.sync().await?;
    remote.sync().await?;

    let loc_dump = local.remote_dump().await?;
    let rem_dump = remote.remote_dump().await?;

    // A concurrent failure shows up as a membership change.
    recheck_membership(local, loc_servers).await?;
    recheck_membership(remote, rem_servers).await?;

    let (for_loc_side, for_rem_side) = match local.conflict_handler() {
        Some(resolve) if local.table_type() == TableType::OrderedSet => {
            apply_resolver_for_sorted(&loc_dump, &rem_dump, local.keypos(), &resolve)
        }
        _ => (rem_dump, loc_dump),
    };

    let join_ref = JoinRef::new();
    let all: Vec<Table> = loc_servers.iter().chain(rem_servers).cloned().collect();

    // Every member mints one alias per other member of the merged
    // segment; the alias a member accepts is the one it minted itself.
    let mut minted: HashMap<ProcId, HashMap<ProcId, AliasId>> = HashMap::new();
    for owner in &all {
        let callers: Vec<ProcId> = all
            .iter()
            .filter(|t| *t != owner)
            .map(|t| t.id())
            .collect();
        let pairs = owner.make_aliases_for(callers).await?;
        minted.insert(owner.id(), pairs.into_iter().collect());
    }

    let mut staged: Vec<(Table, DumpRef)> = Vec::new();
    for (side, payload) in [(loc_servers, &for_loc_side), (rem_servers, &for_rem_side)] {
        for member in side {
            checkpoint(opts, Checkpoint::BeforeSendDump(member.id())).await?;
            let links = links_for(member, &all, &minted);
            // Best effort: a failing member is left out of the install
            // and surfaces through the post-unpause checks.
            match member.send_dump(links, join_ref, payload.clone()).await {
                Ok(dump_ref) => staged.push((member.clone(), dump_ref)),
                Err(err) => {
                    warn!(server = %member.id(), error = %err, "send_dump failed, skipping")
                }
            }
        }
    }

    for (member, dump_ref) in &staged {
        checkpoint(opts, Checkpoint::BeforeApplyDump(member.id())).await?;
        member.apply_dump(*dump_ref).await?;
    }

    info!(%join_ref, members = all.len(), "join complete");
    Ok(())
}

/// The merged-segment peer list for one member: every other member,
/// addressed through the alias that member minted for us.
fn links_for(
    member: &Table,
    all: &[Table],
    minted: &HashMap<ProcId, HashMap<ProcId, AliasId>>,
) -> Vec<PeerLink> {
    let mut links = Vec::new();
    for peer in all {
        if peer == member {
            continue;
        }
        match minted.get(&peer.id()).and_then(|m| m.get(&member.id())) {
            Some(alias) => links.push(PeerLink {
                server: peer.clone(),
                alias: *alias,
            }),
            None => warn!(peer = %peer.id(), member = %member.id(), "no minted alias for pair"),
        }
    }
    links
}

async fn side_servers(head: &Table) -> Result<Vec<Table>> {
    let mut servers = vec![head.clone()];
    servers.extend(head.other_servers().await?);
    Ok(servers)
}

/// Every member of a side must agree on the side's membership and on
/// one join reference; anything else means a concurrent failure is in
/// flight and the join must not proceed.
async fn check_fully_connected(side: &[Table]) -> Result<()> {
    let expected: HashSet<ProcId> = side.iter().map(Table::id).collect();
    let mut join_refs: HashSet<JoinRef> = HashSet::new();
    for server in side {
        let info = server.info().await?;
        let mut seen: HashSet<ProcId> = info.other_servers.into_iter().collect();
        seen.insert(server.id());
        if seen != expected {
            return Err(Error::NotFullyConnected);
        }
        join_refs.insert(info.join_ref);
    }
    if join_refs.len() > 1 {
        return Err(Error::JoinRefMismatch);
    }
    Ok(())
}

async fn recheck_membership(head: &Table, side: &[Table]) -> Result<()> {
    let now: HashSet<ProcId> = side_servers(head).await?.iter().map(Table::id).collect();
    let then: HashSet<ProcId> = side.iter().map(Table::id).collect();
    if now != then {
        return Err(Error::NotFullyConnected);
    }
    Ok(())
}

async fn assert_paused(server: &Table, side: JoinSide) -> Result<()> {
    let info = server.info().await?;
    if info.pause_monitors.is_empty() {
        return Err(Error::AssertPaused {
            server: server.id(),
            side,
        });
    }
    Ok(())
}

async fn checkpoint(opts: &JoinOpts, point: Checkpoint) -> Result<()> {
    match &opts.checkpoint {
        Some(handler) => handler(point).await,
        None => Ok(()),
    }
}

/// Walks two key-sorted dumps in parallel and produces, per side, the
/// records that side must adopt: the other side's one-sided records
/// plus the resolver's output for every shared key with differing
/// records. Equal whole records are skipped; both sides already agree.
///
/// The resolver must be deterministic; a resolver whose output depends
/// on evaluation order can diverge the two sides.
pub fn apply_resolver_for_sorted(
    left: &[Record],
    right: &[Record],
    keypos: usize,
    resolve: &ConflictHandler,
) -> (Vec<Record>, Vec<Record>) {
    let mut for_left = Vec::new();
    let mut for_right = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        let (l, r) = (&left[i], &right[j]);
        match (l.key(keypos), r.key(keypos)) {
            (Some(lk), Some(rk)) if lk < rk => {
                for_right.push(l.clone());
                i += 1;
            }
            (Some(lk), Some(rk)) if rk < lk => {
                for_left.push(r.clone());
                j += 1;
            }
            (Some(_), Some(_)) => {
                if l != r {
                    let merged = resolve(l, r);
                    for_left.push(merged.clone());
                    for_right.push(merged);
                }
                i += 1;
                j += 1;
            }
            // Keyless records cannot be matched; skip them.
            (None, _) => i += 1,
            (_, None) => j += 1,
        }
    }
    for_right.extend(left[i..].iter().cloned());
    for_left.extend(right[j..].iter().cloned());
    (for_left, for_right)
}
