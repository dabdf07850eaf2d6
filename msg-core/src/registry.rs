//! Pending-call registry for netmsg.
//!
//! Correlates each outstanding asynchronous request with the callback that
//! must eventually receive its result. Deadlines are checked on every
//! resolution, not just by the sweep: a reply that arrives after its call's
//! deadline comes back as [`Resolution::Overdue`] and must be failed as a
//! timeout. Every removal path ([`resolve`], [`expire`], [`expired`],
//! [`drain_all`], [`cancel`]) hands the entry back to the caller by value,
//! so an entry can be removed once and its callback can only be taken once. Whoever removes it first wins; later lookups for
//! the same key see nothing and must drop the event.
//!
//! The registry does not lock and does not invoke callbacks. netmsg-client
//! wraps it in a mutex and runs the returned callbacks outside the lock.
//!
//! [`resolve`]: PendingCallRegistry::resolve
//! [`expire`]: PendingCallRegistry::expire
//! [`expired`]: PendingCallRegistry::expired
//! [`drain_all`]: PendingCallRegistry::drain_all
//! [`cancel`]: PendingCallRegistry::cancel

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use netmsg_types::RequestId;

/// Correlation key of an outstanding request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallKey {
    /// A reachability probe.
    Connectivity(RequestId),
    /// The single outstanding login of the session.
    Login,
    /// A directory fetch.
    Directory(RequestId),
    /// A latency probe; at most one per target.
    Ping(String),
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallKey::Connectivity(id) => write!(f, "connectivity probe #{}", id),
            CallKey::Login => write!(f, "login"),
            CallKey::Directory(id) => write!(f, "directory fetch #{}", id),
            CallKey::Ping(target) => write!(f, "ping to {}", target),
        }
    }
}

/// An in-flight request awaiting exactly one resolution.
pub struct PendingCall<C> {
    /// Correlation key.
    pub key: CallKey,
    /// Request id sent on the wire; doubles as generation token.
    pub token: RequestId,
    /// When the request was registered.
    pub issued_at: Instant,
    /// When the request times out.
    pub deadline: Instant,
    /// Whatever must be notified on resolution.
    pub callback: C,
}

impl<C> PendingCall<C> {
    /// Time since the request was issued, as of `now`.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.issued_at)
    }
}

impl<C> fmt::Debug for PendingCall<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("issued_at", &self.issued_at)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Proof of registration, used to withdraw a call whose request never left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHandle {
    /// Correlation key.
    pub key: CallKey,
    /// Token the call was registered with.
    pub token: RequestId,
}

/// A call removed because its reply arrived.
#[derive(Debug)]
pub enum Resolution<C> {
    /// The reply beat the deadline; complete the call with it.
    OnTime(PendingCall<C>),
    /// The deadline passed before the reply; fail the call with a timeout.
    Overdue(PendingCall<C>),
}

impl<C> Resolution<C> {
    fn classify(call: PendingCall<C>, now: Instant) -> Self {
        if call.deadline <= now {
            Resolution::Overdue(call)
        } else {
            Resolution::OnTime(call)
        }
    }

    /// The call, whichever way it resolved.
    pub fn into_call(self) -> PendingCall<C> {
        match self {
            Resolution::OnTime(call) | Resolution::Overdue(call) => call,
        }
    }

    /// Check if the reply arrived in time.
    pub fn is_on_time(&self) -> bool {
        matches!(self, Resolution::OnTime(_))
    }
}

/// Error type for registry operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// An entry for this key is already outstanding.
    DuplicateKey(CallKey),
    /// The registry was drained for termination and accepts nothing new.
    Closed,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateKey(key) => write!(f, "{} already outstanding", key),
            RegistryError::Closed => write!(f, "registry closed"),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Map from correlation key to in-flight request.
pub struct PendingCallRegistry<C> {
    entries: HashMap<CallKey, PendingCall<C>>,
    closed: bool,
}

impl<C> PendingCallRegistry<C> {
    /// Create an empty, open registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            closed: false,
        }
    }

    /// Register a new call.
    ///
    /// Fails with [`RegistryError::DuplicateKey`] if `key` is outstanding and
    /// with [`RegistryError::Closed`] after [`drain_all`](Self::drain_all).
    pub fn register(
        &mut self,
        key: CallKey,
        token: RequestId,
        issued_at: Instant,
        timeout: Duration,
        callback: C,
    ) -> Result<CallHandle, RegistryError> {
        if self.closed {
            return Err(RegistryError::Closed);
        }
        if self.entries.contains_key(&key) {
            return Err(RegistryError::DuplicateKey(key));
        }

        self.entries.insert(
            key.clone(),
            PendingCall {
                key: key.clone(),
                token,
                issued_at,
                deadline: issued_at + timeout,
                callback,
            },
        );
        Ok(CallHandle { key, token })
    }

    /// Remove and return the entry for `key`, if still outstanding.
    ///
    /// An entry whose deadline is at or before `now` has already lost to
    /// its timeout and comes back as [`Resolution::Overdue`].
    pub fn resolve(&mut self, key: &CallKey, now: Instant) -> Option<Resolution<C>> {
        self.entries.remove(key).map(|call| Resolution::classify(call, now))
    }

    /// Like [`resolve`](Self::resolve), but only if the entry carries `token`.
    ///
    /// A reply carrying an older token belongs to a call that already
    /// finished; the newer entry stays in place.
    pub fn resolve_token(
        &mut self,
        key: &CallKey,
        token: RequestId,
        now: Instant,
    ) -> Option<Resolution<C>> {
        self.take_token(key, token).map(|call| Resolution::classify(call, now))
    }

    fn take_token(&mut self, key: &CallKey, token: RequestId) -> Option<PendingCall<C>> {
        match self.entries.get(key) {
            Some(call) if call.token == token => self.entries.remove(key),
            _ => None,
        }
    }

    /// Remove the entry for `key` so the caller can fail it with a timeout.
    pub fn expire(&mut self, key: &CallKey) -> Option<PendingCall<C>> {
        self.entries.remove(key)
    }

    /// Remove and return every entry whose deadline is at or before `now`,
    /// oldest first.
    pub fn expired(&mut self, now: Instant) -> Vec<PendingCall<C>> {
        let overdue: Vec<CallKey> = self
            .entries
            .values()
            .filter(|call| call.deadline <= now)
            .map(|call| call.key.clone())
            .collect();

        let mut calls: Vec<_> = overdue
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .collect();
        calls.sort_by_key(|call| call.issued_at);
        calls
    }

    /// Withdraw a call whose request could not be sent.
    ///
    /// Returns `None` if the call was already resolved by another path, in
    /// which case its outcome has been (or is being) delivered.
    pub fn cancel(&mut self, handle: &CallHandle) -> Option<PendingCall<C>> {
        self.take_token(&handle.key, handle.token)
    }

    /// Remove every entry, oldest first, and refuse further registrations.
    pub fn drain_all(&mut self) -> Vec<PendingCall<C>> {
        self.closed = true;
        let mut calls: Vec<_> = self.entries.drain().map(|(_, call)| call).collect();
        calls.sort_by_key(|call| call.issued_at);
        calls
    }

    /// Check if `key` is outstanding.
    pub fn contains(&self, key: &CallKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Earliest deadline among outstanding calls.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.values().map(|call| call.deadline).min()
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check if the registry has been drained for termination.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<C> Default for PendingCallRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for PendingCallRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCallRegistry")
            .field("outstanding", &self.entries.len())
            .field("closed", &self.closed)
            .finish()
    }
}
