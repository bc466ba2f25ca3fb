//! Branded identifier newtypes.
//!
//! Connection handles, owner identities, and render handles are all "just"
//! strings or integers on the wire. Wrapping them keeps a `ConnectionId`
//! from being passed where an `OwnerIdentity` is expected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Errors produced when parsing identifiers from text.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Owner identity was not a non-negative integer.
    #[error("invalid owner identity: {0:?}")]
    InvalidOwner(String),
}

/// Opaque handle identifying one client connection.
///
/// Generated from a UUID v7, so handles are unique for the lifetime of the
/// process and never reused.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Mint a fresh, never-before-issued handle.
    pub fn generate() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// Wrap an existing handle string (e.g. one echoed back by a client).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the raw handle.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// OS-level principal a connection belongs to (a process uid).
///
/// The unit of throttling: every rate-limit and ban decision is keyed by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerIdentity(u32);

impl OwnerIdentity {
    /// Wrap a platform uid.
    pub const fn new(uid: u32) -> Self {
        Self(uid)
    }

    /// The raw uid.
    pub const fn uid(self) -> u32 {
        self.0
    }

    /// Key used for persisted throttle rows.
    pub fn store_key(self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerIdentity {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| IdError::InvalidOwner(s.to_string()))
    }
}

/// Identity of a render resource minted by the host's render factory.
///
/// The manager never looks inside; it only tracks which handle occupies
/// which slot and which surface belongs to which session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenderHandle(u64);

impl RenderHandle {
    /// Wrap a factory-issued raw handle.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw handle value.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RenderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "render#{}", self.0)
    }
}
