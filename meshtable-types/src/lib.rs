//! Core type definitions for meshtable.
//!
//! This crate defines the fundamental, transport-agnostic types used
//! throughout the replicated-table engine:
//! - Process, join, alias, dump and write identifiers (UUID v7)
//! - Records, keys and table types
//! - The bit-flag set used for acknowledgement tracking
//!
//! Everything that lives on the wire between table servers is defined
//! here; the actors that exchange it belong in `meshtable-table`.

mod bits;
mod ids;
mod record;

pub use bits::{Bits, Mask};
pub use ids::{AliasId, DumpRef, JoinRef, NodeName, PauseToken, ProcId, TableName, WriteRef};
pub use record::{Record, TableType, Value};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
