//! Error types for the table engine.

use meshtable_types::ProcId;
use thiserror::Error;

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Which side of a join an assertion refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    Local,
    Remote,
}

impl std::fmt::Display for JoinSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// Errors that can occur in table and join operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Joining a server to itself.
    #[error("local and remote are the same server")]
    SameServer,

    /// The remote server is already a peer of the local one.
    #[error("servers are already joined")]
    AlreadyJoined,

    /// A `bag` table cannot carry a conflict handler.
    #[error("bag tables do not support a conflict handler")]
    BagWithConflictHandler,

    /// The key position must be at least 1.
    #[error("invalid key position {0}")]
    InvalidKeypos(usize),

    /// The pause token was never issued or was already consumed.
    #[error("unknown pause monitor")]
    UnknownPauseMonitor,

    /// The dump reference is stale or was never staged.
    #[error("unknown dump reference")]
    UnknownDumpRef,

    /// The operation requires the server to be paused.
    #[error("server is not paused")]
    NotPaused,

    /// A join-side assertion that a server is paused failed.
    #[error("server {server} on the {side} side is not paused")]
    AssertPaused { server: ProcId, side: JoinSide },

    /// The two segments being joined share a member.
    #[error("segments overlap")]
    SegmentsOverlap,

    /// A segment's members disagree on its membership.
    #[error("segment is not fully connected")]
    NotFullyConnected,

    /// A segment's members disagree on the current join reference.
    #[error("join reference mismatch within a segment")]
    JoinRefMismatch,

    /// A wait with a timeout expired before the write was acknowledged.
    /// The write itself keeps running.
    #[error("operation timed out")]
    Timeout,

    /// The server (or its ack aggregator) went away while the caller
    /// was waiting; carries the termination reason when known.
    #[error("server terminated: {0}")]
    ServerDown(String),

    /// A supervised worker task panicked or was aborted.
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// A test checkpoint aborted the operation.
    #[error("checkpoint aborted: {0}")]
    Checkpoint(String),
}
