//! Presence directory for netmsg.
//!
//! Holds the most recent list of online users the server reported. Each
//! snapshot is immutable once built; an update swaps in a whole new snapshot
//! so a reader sees either the old list or the new one, never a mix.

use std::sync::{Arc, RwLock};

use netmsg_types::User;

/// Immutable list of online users, in the order the server sent them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceSnapshot {
    users: Vec<User>,
}

impl PresenceSnapshot {
    /// Build a snapshot from a server list.
    pub fn new(users: Vec<User>) -> Self {
        Self { users }
    }

    /// The users, in server order.
    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Iterate over the users.
    pub fn iter(&self) -> std::slice::Iter<'_, User> {
        self.users.iter()
    }

    /// First user carrying `nickname`.
    pub fn find_by_nickname(&self, nickname: &str) -> Option<&User> {
        self.users.iter().find(|u| u.nickname == nickname)
    }

    /// Check if someone with `nickname` is online.
    pub fn contains_nickname(&self, nickname: &str) -> bool {
        self.find_by_nickname(nickname).is_some()
    }

    /// Number of users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if nobody is online.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl<'a> IntoIterator for &'a PresenceSnapshot {
    type Item = &'a User;
    type IntoIter = std::slice::Iter<'a, User>;

    fn into_iter(self) -> Self::IntoIter {
        self.users.iter()
    }
}

impl From<Vec<User>> for PresenceSnapshot {
    fn from(users: Vec<User>) -> Self {
        Self::new(users)
    }
}

/// Shared slot holding the current snapshot.
///
/// Readers clone the `Arc` under a short read lock and then work on their
/// copy without holding anything.
#[derive(Debug)]
pub struct PresenceDirectory {
    slot: RwLock<Arc<PresenceSnapshot>>,
}

impl PresenceDirectory {
    /// Create a directory holding an empty snapshot.
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(Arc::new(PresenceSnapshot::default())),
        }
    }

    /// The current snapshot.
    pub fn current(&self) -> Arc<PresenceSnapshot> {
        // A poisoned lock still guards a complete Arc; the swap is a single store.
        let guard = self.slot.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    /// Install `snapshot` as current and return the shared handle to it.
    pub fn replace(&self, snapshot: PresenceSnapshot) -> Arc<PresenceSnapshot> {
        let snapshot = Arc::new(snapshot);
        let mut guard = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::clone(&snapshot);
        snapshot
    }
}

impl Default for PresenceDirectory {
    fn default() -> Self {
        Self::new()
    }
}
