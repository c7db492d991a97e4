//! Identifier types used throughout the meshtable engine.
//!
//! Uses UUID v7 for time-ordered, globally unique identifiers. Each id is
//! a distinct newtype so that a join reference can never be confused with
//! a destination alias or a pause token at a call site.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new identifier with the current timestamp.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id! {
    /// Unique identity of a message-serialized process (table server,
    /// ack aggregator, join worker, or any other monitored caller).
    ProcId
}

uuid_id! {
    /// Identity of the most recent successful join within a segment.
    /// All members of a segment share one value.
    JoinRef
}

uuid_id! {
    /// Ephemeral, recipient-owned address used to route a replication
    /// message. The recipient can disable an alias at any time, after
    /// which traffic carrying it is silently discarded.
    AliasId
}

uuid_id! {
    /// Reference to a staged (not yet applied) table dump.
    DumpRef
}

uuid_id! {
    /// Token issued by `pause()`; the server stays paused while any
    /// token is outstanding.
    PauseToken
}

uuid_id! {
    /// Per-write reference correlating replication fan-out with the
    /// acknowledgements it collects.
    WriteRef
}

macro_rules! name_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Returns the name as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

name_id! {
    /// Logical name of a replicated table. Servers on different nodes
    /// holding the same table name replicate to one another.
    TableName
}

name_id! {
    /// Name of a node hosting table servers.
    NodeName
}
