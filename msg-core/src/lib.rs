//! # netmsg-core
//!
//! Pure session logic for netmsg (no I/O, instant tests).
//!
//! This crate holds the lifecycle state machine, the pending-call registry
//! and the presence snapshot types without any network access or async
//! runtime, so their rules can be tested directly.
//!
//! ## Design Philosophy
//!
//! The state machine is **pure**: it takes an event and returns the next
//! state plus a list of actions. The registry never invokes callbacks; it
//! hands removed entries back to the caller.
//!
//! The actual I/O (transport, timers, callback dispatch) is performed by
//! `netmsg-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod directory;
pub mod registry;
pub mod state;

pub use directory::{PresenceDirectory, PresenceSnapshot};
pub use registry::{
    CallHandle, CallKey, PendingCall, PendingCallRegistry, RegistryError, Resolution,
};
pub use state::{Action, DrainCause, Event as LifecycleEvent, Operation, SessionState, StateError};
