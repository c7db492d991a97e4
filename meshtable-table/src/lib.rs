//! Cluster-replicated in-memory tables.
//!
//! A set of per-node table servers together maintain an eventually
//! consistent, replicated keyed store over a full mesh. Servers on
//! different nodes form a *segment* by pairwise joining; a write
//! originating at one server is applied locally, fanned out to every
//! peer, and acknowledged to the caller once every live peer confirms.
//!
//! # Components
//!
//! - **Server** ([`Table`]): the per-node actor owning one replica:
//!   reads, writes, replication, pause/resume, dumps.
//! - **Ack aggregator** ([`AckHandle`]): tracks in-flight writes across
//!   peers and releases waiting callers.
//! - **Join coordinator** ([`join`]): merges two segments under a
//!   cluster-wide lock by exchanging full dumps while writes queue.
//! - **Long-task wrapper** ([`run_tracked`]): supervises joins and other
//!   slow work, logging progress and taming panics.
//!
//! # Consistency
//!
//! Eventual, per key: once a write is acknowledged, it is present on
//! every peer that was in the segment at submission time and stayed
//! alive. Conflicts between segments meet only at join time, where an
//! optional pure resolver combines the two records per shared key.
//!
//! # Example
//!
//! ```no_run
//! use meshtable_table::{Table, TableOpts, join, JoinOpts};
//! use meshtable_types::{Record, Value};
//!
//! # async fn demo() -> meshtable_table::Result<()> {
//! let a = Table::start("users", TableOpts::default())?;
//! let b = Table::start("users", TableOpts::default())?;
//! join("users", a.clone(), b.clone(), JoinOpts::default()).await?;
//!
//! a.insert(Record::from([Value::text("alice"), Value::int(32)])).await?;
//! assert_eq!(b.lookup(&Value::text("alice")).await.len(), 1);
//! # Ok(())
//! # }
//! ```

mod ack;
mod error;
mod join;
mod lock;
mod long_task;
mod proc;
mod server;
mod store;

pub use ack::{AckHandle, spawn_ack};
pub use error::{Error, JoinSide, Result};
pub use join::{Checkpoint, CheckpointHandler, JoinOpts, apply_resolver_for_sorted, join};
pub use lock::{GlobalLocks, LockKey};
pub use long_task::run_tracked;
pub use proc::{DownReason, MonitorHandle, ProcGuard, ProcRef};
pub use server::{
    ConflictHandler, DownEvent, DownHandler, PeerLink, SuspendHandle, Table, TableInfo, TableOpts,
    WriteRequest,
};
pub use store::{TableStore, WriteOp};
