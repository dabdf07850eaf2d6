//! Identity and correlation types for netmsg.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// An online user as reported by the server directory.
///
/// Identity is the server-assigned `session_id`; the `nickname` is what
/// people type when addressing someone. Two records with the same session id
/// are the same user even if the nickname differs between snapshots.
#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    /// Display name, also used to address direct messages and pings.
    pub nickname: String,
    /// Server-side session identifier.
    pub session_id: i64,
}

impl User {
    /// Create a user record.
    pub fn new(nickname: impl Into<String>, session_id: i64) -> Self {
        Self {
            nickname: nickname.into(),
            session_id,
        }
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.session_id == other.session_id
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.session_id.hash(state);
    }
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "User({}#{})", self.nickname, self.session_id)
    }
}

/// Per-session request identifier.
///
/// Allocated from a monotonically increasing counter. Used as the generation
/// token of a ping (so a stale reply cannot complete a newer probe to the same
/// target) and as the correlation key of directory fetches.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(u64);

impl RequestId {
    /// Create a RequestId from a raw value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The identifier following this one.
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
