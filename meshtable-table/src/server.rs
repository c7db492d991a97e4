//! The table server.
//!
//! One server owns one table replica on one node. It is a single
//! message-serialized actor: reads are served directly from the shared
//! replica, every mutation funnels through the mailbox. Writes are
//! applied locally, fanned out to every peer in the segment, and the
//! caller is released by the ack aggregator once every live peer has
//! confirmed.
//!
//! The server also carries the pause state machine used by joins: while
//! any pause token is outstanding, application effects (local writes and
//! replicated ops) queue in arrival order, while control-plane traffic
//! keeps flowing. Destination aliases gate incoming replication so that
//! traffic from an older segment generation is discarded silently.

use crate::ack::{self, AckHandle};
use crate::error::{Error, Result};
use crate::proc::{DownReason, MonitorHandle, ProcGuard, ProcRef};
use crate::store::{TableStore, WriteOp};
use meshtable_types::{
    AliasId, DumpRef, JoinRef, NodeName, PauseToken, ProcId, Record, TableName, TableType, Value,
    WriteRef,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

/// Pure resolver combining two conflicting records at join time.
pub type ConflictHandler = Arc<dyn Fn(&Record, &Record) -> Record + Send + Sync>;

/// Effectful callback invoked when a peer goes down.
pub type DownHandler = Arc<dyn Fn(DownEvent) + Send + Sync>;

/// Delivered to [`TableOpts::handle_down`] when a peer disappears.
#[derive(Debug, Clone)]
pub struct DownEvent {
    /// The dead peer's process identity.
    pub remote: ProcId,
    /// The table the peer served.
    pub table: TableName,
}

/// Options for starting a table server.
#[derive(Clone)]
pub struct TableOpts {
    /// The table's shape. Defaults to `OrderedSet`.
    pub table_type: TableType,
    /// 1-indexed key position within each record. Defaults to 1.
    pub keypos: usize,
    /// The node this server lives on. Defaults to `"local"`.
    pub node: NodeName,
    /// Join-time conflict resolver; `OrderedSet` only.
    pub handle_conflict: Option<ConflictHandler>,
    /// Callback invoked when a peer goes down.
    pub handle_down: Option<DownHandler>,
}

impl Default for TableOpts {
    fn default() -> Self {
        Self {
            table_type: TableType::OrderedSet,
            keypos: 1,
            node: NodeName::from("local"),
            handle_conflict: None,
            handle_down: None,
        }
    }
}

impl fmt::Debug for TableOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableOpts")
            .field("table_type", &self.table_type)
            .field("keypos", &self.keypos)
            .field("node", &self.node)
            .field("handle_conflict", &self.handle_conflict.is_some())
            .field("handle_down", &self.handle_down.is_some())
            .finish()
    }
}

/// A peer plus the destination alias used to reach it.
///
/// The alias is owned by the receiving server, which minted it for this
/// sender specifically and may disable it at any time.
#[derive(Debug, Clone)]
pub struct PeerLink {
    pub server: Table,
    pub alias: AliasId,
}

/// Snapshot of a server's state, as returned by [`Table::info`].
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub table: TableName,
    pub node: NodeName,
    pub table_type: TableType,
    pub keypos: usize,
    pub size: usize,
    pub other_servers: Vec<ProcId>,
    pub other_nodes: Vec<NodeName>,
    pub join_ref: JoinRef,
    pub pause_monitors: Vec<PauseToken>,
    pub ack: ProcId,
    pub dest_aliases: HashMap<ProcId, AliasId>,
    pub active_aliases: Vec<AliasId>,
    pub pending_aliases: Vec<AliasId>,
}

/// Mailbox messages. Writes and remote ops are application effects and
/// queue while paused; everything else is control plane.
enum Msg {
    Write {
        op: WriteOp,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoteOp {
        alias: AliasId,
        write_ref: WriteRef,
        reply_to: AckHandle,
        from: ProcId,
        op: WriteOp,
    },
    Pause {
        owner: ProcRef,
        reply: oneshot::Sender<PauseToken>,
    },
    Unpause {
        token: PauseToken,
        reply: oneshot::Sender<Result<()>>,
    },
    PauseOwnerDown {
        token: PauseToken,
    },
    Info {
        reply: oneshot::Sender<TableInfo>,
    },
    OtherServers {
        reply: oneshot::Sender<Vec<Table>>,
    },
    Ping {
        reply: oneshot::Sender<()>,
    },
    Sync {
        reply: oneshot::Sender<()>,
    },
    RemoteDump {
        reply: oneshot::Sender<Vec<Record>>,
    },
    MakeAliases {
        callers: Vec<ProcId>,
        reply: oneshot::Sender<Result<Vec<(ProcId, AliasId)>>>,
    },
    SendDump {
        peers: Vec<PeerLink>,
        join_ref: JoinRef,
        dump: Vec<Record>,
        reply: oneshot::Sender<Result<DumpRef>>,
    },
    ApplyDump {
        dump_ref: DumpRef,
        reply: oneshot::Sender<Result<()>>,
    },
    PeerDown {
        peer: ProcId,
        reason: DownReason,
    },
    CheckServer {
        from: Table,
        alias: AliasId,
        join_ref: JoinRef,
    },
    CheckServerOk {
        from: ProcId,
    },
    Suspend {
        resume: oneshot::Receiver<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

struct Shared {
    name: TableName,
    opts: TableOpts,
    tx: mpsc::UnboundedSender<Msg>,
    proc: ProcRef,
    store: RwLock<TableStore>,
    abort: OnceLock<AbortHandle>,
}

/// Cloneable handle to a running table server.
///
/// Handles compare equal when they refer to the same server process.
#[derive(Clone)]
pub struct Table {
    inner: Arc<Shared>,
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.inner.name)
            .field("node", &self.inner.opts.node)
            .field("id", &self.id())
            .finish()
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Table {}

impl std::hash::Hash for Table {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl Table {
    /// Starts a table server.
    ///
    /// Fails with [`Error::BagWithConflictHandler`] when a `bag` table
    /// is paired with a conflict handler, and with
    /// [`Error::InvalidKeypos`] for a key position of zero.
    pub fn start(name: impl Into<TableName>, opts: TableOpts) -> Result<Table> {
        let name = name.into();
        if opts.keypos < 1 {
            return Err(Error::InvalidKeypos(opts.keypos));
        }
        if opts.table_type == TableType::Bag && opts.handle_conflict.is_some() {
            return Err(Error::BagWithConflictHandler);
        }

        let (guard, proc_ref) = ProcGuard::new();
        let (ack, _ack_ref) = ack::spawn_ack(name.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        let store = TableStore::new(opts.table_type, opts.keypos);
        let table = Table {
            inner: Arc::new(Shared {
                name: name.clone(),
                opts,
                tx,
                proc: proc_ref,
                store: RwLock::new(store),
                abort: OnceLock::new(),
            }),
        };
        info!(table = %name, id = %guard.id(), "starting table server");
        let state = ServerState::new(table.clone(), guard, ack);
        let handle = tokio::spawn(state.run(rx));
        let _ = table.inner.abort.set(handle.abort_handle());
        Ok(table)
    }

    // ── Accessors ────────────────────────────────────────────────

    /// The server's process identity.
    #[must_use]
    pub fn id(&self) -> ProcId {
        self.inner.proc.id()
    }

    /// The table's name.
    #[must_use]
    pub fn table_name(&self) -> &TableName {
        &self.inner.name
    }

    /// The node this server lives on.
    #[must_use]
    pub fn node(&self) -> &NodeName {
        &self.inner.opts.node
    }

    /// The table's shape.
    #[must_use]
    pub fn table_type(&self) -> TableType {
        self.inner.opts.table_type
    }

    /// The 1-indexed key position.
    #[must_use]
    pub fn keypos(&self) -> usize {
        self.inner.opts.keypos
    }

    /// Liveness subscription for this server.
    #[must_use]
    pub fn proc_ref(&self) -> &ProcRef {
        &self.inner.proc
    }

    pub(crate) fn conflict_handler(&self) -> Option<ConflictHandler> {
        self.inner.opts.handle_conflict.clone()
    }

    // ── Reads (direct, no mailbox round-trip) ────────────────────

    /// All records with the given key.
    pub async fn lookup(&self, key: &Value) -> Vec<Record> {
        self.inner.store.read().await.lookup(key)
    }

    /// Full local contents, ordered by key ascending.
    pub async fn dump(&self) -> Vec<Record> {
        self.inner.store.read().await.dump()
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Inserts a record and waits for every peer to acknowledge.
    pub async fn insert(&self, record: Record) -> Result<()> {
        self.insert_request(record).wait().await
    }

    /// Inserts a record, returning a waitable request token.
    pub fn insert_request(&self, record: Record) -> WriteRequest {
        self.write_request(WriteOp::Insert(record))
    }

    /// Inserts many records as one replicated operation.
    pub async fn insert_many(&self, records: Vec<Record>) -> Result<()> {
        self.insert_many_request(records).wait().await
    }

    /// `insert_many`, returning a waitable request token.
    pub fn insert_many_request(&self, records: Vec<Record>) -> WriteRequest {
        self.write_request(WriteOp::InsertMany(records))
    }

    /// Deletes every record with the given key.
    pub async fn delete(&self, key: Value) -> Result<()> {
        self.delete_request(key).wait().await
    }

    /// `delete`, returning a waitable request token.
    pub fn delete_request(&self, key: Value) -> WriteRequest {
        self.write_request(WriteOp::Delete(key))
    }

    /// Deletes every record with any of the given keys.
    pub async fn delete_many(&self, keys: Vec<Value>) -> Result<()> {
        self.delete_many_request(keys).wait().await
    }

    /// `delete_many`, returning a waitable request token.
    pub fn delete_many_request(&self, keys: Vec<Value>) -> WriteRequest {
        self.write_request(WriteOp::DeleteMany(keys))
    }

    /// Deletes one record by whole value.
    pub async fn delete_object(&self, record: Record) -> Result<()> {
        self.delete_object_request(record).wait().await
    }

    /// `delete_object`, returning a waitable request token.
    pub fn delete_object_request(&self, record: Record) -> WriteRequest {
        self.write_request(WriteOp::DeleteObject(record))
    }

    /// Deletes many records by whole value.
    pub async fn delete_objects(&self, records: Vec<Record>) -> Result<()> {
        self.delete_objects_request(records).wait().await
    }

    /// `delete_objects`, returning a waitable request token.
    pub fn delete_objects_request(&self, records: Vec<Record>) -> WriteRequest {
        self.write_request(WriteOp::DeleteObjects(records))
    }

    fn write_request(&self, op: WriteOp) -> WriteRequest {
        let (reply, rx) = oneshot::channel();
        // A dead server drops the reply sender; the request then
        // resolves to a ServerDown error.
        let _ = self.inner.tx.send(Msg::Write { op, reply });
        WriteRequest { rx }
    }

    // ── Peer management & control plane ──────────────────────────

    /// The current peer set.
    pub async fn other_servers(&self) -> Result<Vec<Table>> {
        self.call(|reply| Msg::OtherServers { reply }).await
    }

    /// Distinct nodes of the current peer set.
    pub async fn other_nodes(&self) -> Result<Vec<NodeName>> {
        let mut nodes: Vec<NodeName> = self
            .other_servers()
            .await?
            .iter()
            .map(|t| t.node().clone())
            .collect();
        nodes.sort();
        nodes.dedup();
        Ok(nodes)
    }

    /// Pauses the server on behalf of `owner`. The returned token stays
    /// valid until consumed by [`Table::unpause`] or by the owner's
    /// death. Multiple concurrent pauses are allowed.
    pub async fn pause(&self, owner: &ProcRef) -> Result<PauseToken> {
        let owner = owner.clone();
        self.call(|reply| Msg::Pause { owner, reply }).await
    }

    /// Consumes a pause token; consuming the last one resumes the
    /// server and drains the pending-operations queue in arrival order.
    pub async fn unpause(&self, token: PauseToken) -> Result<()> {
        self.call(|reply| Msg::Unpause { token, reply }).await?
    }

    /// Snapshot of the server's state.
    pub async fn info(&self) -> Result<TableInfo> {
        self.call(|reply| Msg::Info { reply }).await
    }

    /// A round-trip through the server's mailbox.
    pub async fn ping(&self) -> Result<()> {
        self.call(|reply| Msg::Ping { reply }).await
    }

    /// Flushes this server's mailbox, then round-trips every current
    /// peer, so previously sent traffic has been processed everywhere.
    pub async fn sync(&self) -> Result<()> {
        self.call(|reply| Msg::Sync { reply }).await
    }

    /// Full contents through the mailbox, ordered behind any queued
    /// control traffic.
    pub async fn remote_dump(&self) -> Result<Vec<Record>> {
        self.call(|reply| Msg::RemoteDump { reply }).await
    }

    /// Mints one fresh destination alias per caller. The server must be
    /// paused; the aliases stay pending until a dump is applied or the
    /// server resumes.
    pub async fn make_aliases_for(&self, callers: Vec<ProcId>) -> Result<Vec<(ProcId, AliasId)>> {
        self.call(|reply| Msg::MakeAliases { callers, reply }).await?
    }

    /// Stages a dump with its peer list and join reference; nothing is
    /// applied yet. The server must be paused.
    pub async fn send_dump(
        &self,
        peers: Vec<PeerLink>,
        join_ref: JoinRef,
        dump: Vec<Record>,
    ) -> Result<DumpRef> {
        self.call(|reply| Msg::SendDump {
            peers,
            join_ref,
            dump,
            reply,
        })
        .await?
    }

    /// Atomically installs a previously staged dump: merges its
    /// records, replaces the peer set and join reference, and refreshes
    /// the destination aliases. Unknown references are a no-op error.
    pub async fn apply_dump(&self, dump_ref: DumpRef) -> Result<()> {
        self.call(|reply| Msg::ApplyDump { dump_ref, reply }).await?
    }

    /// Stops the server cleanly; its ack aggregator exits with `Normal`
    /// reason.
    pub async fn stop(&self) {
        let _ = self.call(|reply| Msg::Stop { reply }).await;
    }

    /// Kills the server abruptly, as a crash would. Pending writers
    /// observe the death; peers get DOWN notifications.
    pub fn kill(&self) {
        if let Some(abort) = self.inner.abort.get() {
            abort.abort();
        }
    }

    /// Blocks the server loop until the returned handle is resumed (or
    /// dropped). Mailbox traffic accumulates meanwhile. Intended for
    /// fault-injection tests.
    pub fn suspend(&self) -> SuspendHandle {
        let (tx, resume) = oneshot::channel();
        let _ = self.inner.tx.send(Msg::Suspend { resume });
        SuspendHandle { tx }
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Msg) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .tx
            .send(build(tx))
            .map_err(|_| Error::ServerDown("table server terminated".to_string()))?;
        rx.await
            .map_err(|_| Error::ServerDown("table server terminated".to_string()))
    }

    fn cast(&self, msg: Msg) {
        let _ = self.inner.tx.send(msg);
    }
}

/// A submitted write, waitable with or without a timeout.
#[derive(Debug)]
pub struct WriteRequest {
    rx: oneshot::Receiver<Result<()>>,
}

impl WriteRequest {
    /// Waits until every peer has acknowledged the write.
    pub async fn wait(self) -> Result<()> {
        match self.rx.await {
            Ok(res) => res,
            Err(_) => Err(ack::closed_error()),
        }
    }

    /// Waits up to `timeout`. A timeout does not cancel the write:
    /// replication keeps running, and a later call may still observe
    /// the release. A peer death after a timeout never surfaces as an
    /// additional failure.
    pub async fn wait_response(&mut self, timeout: Duration) -> Result<()> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Err(_) => Err(Error::Timeout),
            Ok(Ok(res)) => res,
            Ok(Err(_)) => Err(ack::closed_error()),
        }
    }
}

/// Resumes a suspended server when resumed or dropped.
#[derive(Debug)]
pub struct SuspendHandle {
    tx: oneshot::Sender<()>,
}

impl SuspendHandle {
    /// Lets the server loop continue.
    pub fn resume(self) {
        let _ = self.tx.send(());
    }
}

// ── Server internals ─────────────────────────────────────────────

/// An operation accepted while paused, waiting for the drain.
enum Queued {
    Local {
        op: WriteOp,
        reply: oneshot::Sender<Result<()>>,
    },
    Remote {
        alias: AliasId,
        write_ref: WriteRef,
        reply_to: AckHandle,
        from: ProcId,
        op: WriteOp,
    },
}

/// A staged, not-yet-applied dump.
struct StagedDump {
    peers: Vec<PeerLink>,
    join_ref: JoinRef,
    dump: Vec<Record>,
}

struct PeerState {
    link: PeerLink,
    monitor: MonitorHandle,
}

struct ServerState {
    table: Table,
    guard: ProcGuard,
    ack: AckHandle,
    peers: Vec<PeerState>,
    join_ref: JoinRef,
    pause_monitors: Vec<(PauseToken, MonitorHandle)>,
    queue: VecDeque<Queued>,
    staged: HashMap<DumpRef, StagedDump>,
    /// Aliases this server currently accepts remote ops on, each bound
    /// to the sender it was minted for.
    active_aliases: HashMap<AliasId, ProcId>,
    /// Aliases minted while paused, not yet live.
    pending_aliases: Vec<(ProcId, AliasId)>,
}

impl ServerState {
    fn new(table: Table, guard: ProcGuard, ack: AckHandle) -> Self {
        Self {
            table,
            guard,
            ack,
            peers: Vec::new(),
            join_ref: JoinRef::new(),
            pause_monitors: Vec::new(),
            queue: VecDeque::new(),
            staged: HashMap::new(),
            active_aliases: HashMap::new(),
            pending_aliases: Vec::new(),
        }
    }

    fn id(&self) -> ProcId {
        self.guard.id()
    }

    fn paused(&self) -> bool {
        !self.pause_monitors.is_empty()
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Stop { reply } => {
                    debug!(table = %self.table.inner.name, "stopping table server");
                    let _ = reply.send(());
                    break;
                }
                other => self.handle(other).await,
            }
        }
        self.guard.set_exit_reason(DownReason::Normal);
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Write { op, reply } => {
                if self.paused() {
                    self.queue.push_back(Queued::Local { op, reply });
                } else {
                    self.apply_local(op, reply).await;
                }
            }
            Msg::RemoteOp {
                alias,
                write_ref,
                reply_to,
                from,
                op,
            } => {
                if self.paused() {
                    self.queue.push_back(Queued::Remote {
                        alias,
                        write_ref,
                        reply_to,
                        from,
                        op,
                    });
                } else {
                    self.apply_remote(alias, write_ref, &reply_to, from, &op).await;
                }
            }
            Msg::Pause { owner, reply } => {
                let token = PauseToken::new();
                let tx = self.table.inner.tx.clone();
                let monitor = owner.monitor(tx, move |_, _| Msg::PauseOwnerDown { token });
                self.pause_monitors.push((token, monitor));
                debug!(table = %self.table.inner.name, owner = %owner.id(), %token, "paused");
                let _ = reply.send(token);
            }
            Msg::Unpause { token, reply } => {
                let _ = reply.send(self.unpause(token).await);
            }
            Msg::PauseOwnerDown { token } => {
                debug!(table = %self.table.inner.name, %token, "pause owner went down");
                if self.unpause(token).await.is_err() {
                    debug!(%token, "pause owner down for a consumed token");
                }
            }
            Msg::Info { reply } => {
                let _ = reply.send(self.info().await);
            }
            Msg::OtherServers { reply } => {
                let _ = reply.send(self.peer_tables());
            }
            Msg::Ping { reply } => {
                let _ = reply.send(());
            }
            Msg::Sync { reply } => {
                // Round-trip the peers off the server loop; two servers
                // syncing each other must not deadlock.
                let peers = self.peer_tables();
                tokio::spawn(async move {
                    for peer in peers {
                        let _ = peer.ping().await;
                    }
                    let _ = reply.send(());
                });
            }
            Msg::RemoteDump { reply } => {
                let dump = self.table.inner.store.read().await.dump();
                let _ = reply.send(dump);
            }
            Msg::MakeAliases { callers, reply } => {
                let _ = reply.send(self.make_aliases(callers));
            }
            Msg::SendDump {
                peers,
                join_ref,
                dump,
                reply,
            } => {
                let _ = reply.send(self.stage_dump(peers, join_ref, dump));
            }
            Msg::ApplyDump { dump_ref, reply } => {
                let _ = reply.send(self.apply_dump(dump_ref).await);
            }
            Msg::PeerDown { peer, reason } => {
                self.handle_peer_down(peer, &reason);
            }
            Msg::CheckServer {
                from,
                alias,
                join_ref,
            } => {
                let valid = self.active_aliases.get(&alias) == Some(&from.id())
                    && join_ref == self.join_ref;
                if valid {
                    from.cast(Msg::CheckServerOk { from: self.id() });
                } else {
                    debug!(
                        table = %self.table.inner.name,
                        prober = %from.id(),
                        %alias,
                        "check_server probe failed, replying with a DOWN"
                    );
                    from.cast(Msg::PeerDown {
                        peer: self.id(),
                        reason: DownReason::CheckServerFailed,
                    });
                }
            }
            Msg::CheckServerOk { from } => {
                debug!(table = %self.table.inner.name, peer = %from, "peer confirmed probe");
            }
            Msg::Suspend { resume } => {
                let _ = resume.await;
            }
            // Intercepted by the run loop before dispatch.
            Msg::Stop { .. } => {}
        }
    }

    fn peer_tables(&self) -> Vec<Table> {
        self.peers.iter().map(|p| p.link.server.clone()).collect()
    }

    fn peer_ids(&self) -> HashSet<ProcId> {
        self.peers.iter().map(|p| p.link.server.id()).collect()
    }

    async fn apply_local(&mut self, op: WriteOp, reply: oneshot::Sender<Result<()>>) {
        self.table.inner.store.write().await.apply(&op);
        if self.peers.is_empty() {
            let _ = reply.send(Ok(()));
            return;
        }
        let write_ref = WriteRef::new();
        let wait_list: Vec<ProcId> = self.peers.iter().map(|p| p.link.server.id()).collect();
        // Register before fanning out so an early ack finds its token.
        self.ack.add(write_ref, wait_list, reply);
        for peer in &self.peers {
            peer.link.server.cast(Msg::RemoteOp {
                alias: peer.link.alias,
                write_ref,
                reply_to: self.ack.clone(),
                from: self.id(),
                op: op.clone(),
            });
        }
    }

    async fn apply_remote(
        &mut self,
        alias: AliasId,
        write_ref: WriteRef,
        reply_to: &AckHandle,
        from: ProcId,
        op: &WriteOp,
    ) {
        if self.active_aliases.get(&alias) != Some(&from) {
            debug!(
                table = %self.table.inner.name,
                %from,
                %alias,
                "remote op on a disabled alias, dropping"
            );
            return;
        }
        self.table.inner.store.write().await.apply(op);
        reply_to.ack(write_ref, self.id());
    }

    async fn unpause(&mut self, token: PauseToken) -> Result<()> {
        let Some(pos) = self.pause_monitors.iter().position(|(t, _)| *t == token) else {
            return Err(Error::UnknownPauseMonitor);
        };
        let (_, monitor) = self.pause_monitors.remove(pos);
        monitor.demonitor();
        if !self.paused() {
            self.resume().await;
        }
        Ok(())
    }

    /// Transition back to RUNNING: settle pending aliases, discard
    /// stale staged dumps, drain the queue in arrival order.
    async fn resume(&mut self) {
        let peer_ids = self.peer_ids();
        for (caller, alias) in std::mem::take(&mut self.pending_aliases) {
            if peer_ids.contains(&caller) {
                self.active_aliases.insert(alias, caller);
            } else {
                debug!(table = %self.table.inner.name, %alias, "dropping pending alias without a peer");
            }
        }
        if !self.staged.is_empty() {
            debug!(
                table = %self.table.inner.name,
                count = self.staged.len(),
                "discarding stale staged dumps"
            );
            self.staged.clear();
        }
        let queued: Vec<Queued> = self.queue.drain(..).collect();
        if !queued.is_empty() {
            debug!(table = %self.table.inner.name, count = queued.len(), "draining pending operations");
        }
        for entry in queued {
            match entry {
                Queued::Local { op, reply } => self.apply_local(op, reply).await,
                Queued::Remote {
                    alias,
                    write_ref,
                    reply_to,
                    from,
                    op,
                } => self.apply_remote(alias, write_ref, &reply_to, from, &op).await,
            }
        }
    }

    fn make_aliases(&mut self, callers: Vec<ProcId>) -> Result<Vec<(ProcId, AliasId)>> {
        if !self.paused() {
            return Err(Error::NotPaused);
        }
        let pairs: Vec<(ProcId, AliasId)> = callers
            .into_iter()
            .map(|caller| (caller, AliasId::new()))
            .collect();
        self.pending_aliases.extend(pairs.iter().copied());
        Ok(pairs)
    }

    fn stage_dump(
        &mut self,
        peers: Vec<PeerLink>,
        join_ref: JoinRef,
        dump: Vec<Record>,
    ) -> Result<DumpRef> {
        if !self.paused() {
            return Err(Error::NotPaused);
        }
        let dump_ref = DumpRef::new();
        debug!(
            table = %self.table.inner.name,
            %dump_ref,
            records = dump.len(),
            peers = peers.len(),
            "staged dump"
        );
        self.staged.insert(
            dump_ref,
            StagedDump {
                peers,
                join_ref,
                dump,
            },
        );
        Ok(dump_ref)
    }

    async fn apply_dump(&mut self, dump_ref: DumpRef) -> Result<()> {
        let Some(staged) = self.staged.remove(&dump_ref) else {
            return Err(Error::UnknownDumpRef);
        };
        {
            let mut store = self.table.inner.store.write().await;
            for record in &staged.dump {
                store.apply(&WriteOp::Insert(record.clone()));
            }
        }
        let own_id = self.id();
        let links: Vec<PeerLink> = staged
            .peers
            .into_iter()
            .filter(|link| link.server.id() != own_id)
            .collect();
        self.set_peers(links);
        self.join_ref = staged.join_ref;

        // Refresh the alias generation: the old allow-set is disabled
        // wholesale, pending aliases minted for the new peers go live,
        // the rest are dropped.
        self.active_aliases.clear();
        let peer_ids = self.peer_ids();
        for (caller, alias) in std::mem::take(&mut self.pending_aliases) {
            if peer_ids.contains(&caller) {
                self.active_aliases.insert(alias, caller);
            }
        }
        info!(
            table = %self.table.inner.name,
            join_ref = %self.join_ref,
            peers = self.peers.len(),
            "applied staged dump"
        );
        Ok(())
    }

    fn set_peers(&mut self, links: Vec<PeerLink>) {
        self.peers = links
            .into_iter()
            .map(|link| {
                let tx = self.table.inner.tx.clone();
                let monitor = link
                    .server
                    .proc_ref()
                    .monitor(tx, |peer, reason| Msg::PeerDown { peer, reason });
                PeerState { link, monitor }
            })
            .collect();
    }

    fn handle_peer_down(&mut self, peer: ProcId, reason: &DownReason) {
        let Some(pos) = self.peers.iter().position(|p| p.link.server.id() == peer) else {
            debug!(table = %self.table.inner.name, %peer, "DOWN for an unknown peer, ignoring");
            return;
        };
        let removed = self.peers.remove(pos);
        removed.monitor.demonitor();
        warn!(table = %self.table.inner.name, %peer, %reason, "peer went down");

        // Anything the dead peer could still send through its aliases
        // is stale now.
        self.active_aliases.retain(|_, owner| *owner != peer);
        self.ack.remote_down(peer);
        if let Some(handle_down) = &self.table.inner.opts.handle_down {
            handle_down(DownEvent {
                remote: peer,
                table: self.table.inner.name.clone(),
            });
        }
        // Probe the survivors; anyone on a stale alias or an older join
        // answers with a DOWN-style failure and gets dropped too.
        for p in &self.peers {
            p.link.server.cast(Msg::CheckServer {
                from: self.table.clone(),
                alias: p.link.alias,
                join_ref: self.join_ref,
            });
        }
    }

    async fn info(&self) -> TableInfo {
        let store = self.table.inner.store.read().await;
        let mut other_nodes: Vec<NodeName> = self
            .peers
            .iter()
            .map(|p| p.link.server.node().clone())
            .collect();
        other_nodes.sort();
        other_nodes.dedup();
        TableInfo {
            table: self.table.inner.name.clone(),
            node: self.table.inner.opts.node.clone(),
            table_type: store.table_type(),
            keypos: store.keypos(),
            size: store.size(),
            other_servers: self.peers.iter().map(|p| p.link.server.id()).collect(),
            other_nodes,
            join_ref: self.join_ref,
            pause_monitors: self.pause_monitors.iter().map(|(t, _)| *t).collect(),
            ack: self.ack.id(),
            dest_aliases: self
                .peers
                .iter()
                .map(|p| (p.link.server.id(), p.link.alias))
                .collect(),
            active_aliases: self.active_aliases.keys().copied().collect(),
            pending_aliases: self.pending_aliases.iter().map(|(_, a)| *a).collect(),
        }
    }
}
