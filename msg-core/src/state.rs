//! Session lifecycle state machine for netmsg.
//!
//! This module provides a pure, side-effect-free state machine for the
//! session lifecycle. The state machine takes events as input and produces
//! a new state plus a list of actions to execute, or a [`StateError`] when
//! the event is illegal in the current state.
//!
//! The actual I/O (connecting, sending, invoking callbacks) is performed by
//! netmsg-client, not by this module.
//!
//! ```text
//! Created → Initialized → ConnectivityVerified → AuthPending → Authenticated
//!                 ↑                                   │
//!                 └──────── rejected / timed out ─────┘
//!
//! any state ──terminate / connection lost──► Terminated
//! ```

use std::fmt;

/// Session lifecycle states, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SessionState {
    /// Configuration attached, nothing else done.
    Created,
    /// Resources allocated, no network activity yet.
    Initialized,
    /// A connectivity probe succeeded.
    ConnectivityVerified,
    /// A login request is outstanding.
    AuthPending,
    /// Login accepted by the server.
    Authenticated,
    /// Resources released. Terminal.
    Terminated,
}

impl SessionState {
    /// Create a new state machine in the Created state.
    pub fn new() -> Self {
        Self::Created
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function. The caller is responsible for executing the
    /// returned actions, and for keeping the old state when an error is
    /// returned.
    pub fn on_event(self, event: Event) -> Result<(Self, Vec<Action>), StateError> {
        match (self, event) {
            // Initialization
            (Self::Created, Event::InitializeRequested) => {
                Ok((Self::Initialized, vec![Action::AllocateResources]))
            }
            (Self::Terminated, Event::InitializeRequested) => {
                Err(StateError::invalid(self, "initialize"))
            }
            (_, Event::InitializeRequested) => Err(StateError::AlreadyInitialized),

            // Connectivity never downgrades an established session
            (Self::Initialized, Event::ConnectivityConfirmed) => {
                Ok((Self::ConnectivityVerified, vec![]))
            }
            (
                state @ (Self::ConnectivityVerified | Self::AuthPending | Self::Authenticated),
                Event::ConnectivityConfirmed,
            ) => Ok((state, vec![])),
            (state, Event::ConnectivityConfirmed) => {
                Err(StateError::invalid(state, "verify connectivity"))
            }

            // Login
            (Self::Initialized | Self::ConnectivityVerified, Event::LoginRequested) => {
                Ok((Self::AuthPending, vec![Action::SendLogin]))
            }
            (Self::AuthPending, Event::LoginRequested) => Err(StateError::LoginInProgress),
            (state, Event::LoginRequested) => Err(StateError::invalid(state, "login")),

            (Self::AuthPending, Event::LoginAccepted) => Ok((Self::Authenticated, vec![])),
            (Self::AuthPending, Event::LoginRejected | Event::LoginAbandoned) => {
                Ok((Self::Initialized, vec![]))
            }
            (state, Event::LoginAccepted | Event::LoginRejected | Event::LoginAbandoned) => {
                Err(StateError::invalid(state, "resolve login"))
            }

            // Teardown is idempotent
            (Self::Terminated, Event::TerminateRequested | Event::ConnectionLost { .. }) => {
                Ok((Self::Terminated, vec![]))
            }
            (Self::Created, Event::TerminateRequested) => Ok((
                Self::Terminated,
                vec![
                    Action::DrainPending(DrainCause::Terminated),
                    Action::ReleaseTransport,
                ],
            )),
            (_, Event::TerminateRequested) => Ok((
                Self::Terminated,
                vec![
                    Action::SendBye,
                    Action::DrainPending(DrainCause::Terminated),
                    Action::ReleaseTransport,
                ],
            )),
            (_, Event::ConnectionLost { reason }) => Ok((
                Self::Terminated,
                vec![
                    Action::DrainPending(DrainCause::Disconnected { reason }),
                    Action::ReleaseTransport,
                ],
            )),
        }
    }

    /// Check whether an operation may start in this state.
    ///
    /// Login is gated by [`SessionState::on_event`] instead, since starting
    /// it is itself a transition.
    pub fn permits(&self, operation: Operation) -> Result<(), StateError> {
        let allowed = match operation {
            Operation::VerifyConnectivity => self.is_initialized(),
            Operation::RefreshDirectory
            | Operation::Broadcast
            | Operation::Direct
            | Operation::Ping => self.is_authenticated(),
        };

        if allowed {
            Ok(())
        } else {
            Err(StateError::invalid(*self, operation.name()))
        }
    }

    /// Initialized or later, and not terminated.
    pub fn is_initialized(&self) -> bool {
        !matches!(self, Self::Created | Self::Terminated)
    }

    /// Check if the login was accepted.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }

    /// Check if the session has been torn down.
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::ConnectivityVerified => "connectivity verified",
            Self::AuthPending => "authentication pending",
            Self::Authenticated => "authenticated",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Events that drive the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Caller asked to initialize.
    InitializeRequested,
    /// A connectivity probe succeeded.
    ConnectivityConfirmed,
    /// Caller asked to log in.
    LoginRequested,
    /// Server accepted the login.
    LoginAccepted,
    /// Server rejected the login.
    LoginRejected,
    /// Login never completed (timeout or the request could not be sent).
    LoginAbandoned,
    /// The transport went away.
    ConnectionLost {
        /// Reason for disconnection.
        reason: String,
    },
    /// Caller asked to terminate.
    TerminateRequested,
}

/// Operations gated by [`SessionState::permits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reachability probe.
    VerifyConnectivity,
    /// Directory fetch.
    RefreshDirectory,
    /// Message to everyone.
    Broadcast,
    /// Message to one user.
    Direct,
    /// Latency probe.
    Ping,
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::VerifyConnectivity => "verify connectivity",
            Operation::RefreshDirectory => "refresh directory",
            Operation::Broadcast => "broadcast",
            Operation::Direct => "direct message",
            Operation::Ping => "ping",
        }
    }
}

/// Actions to be executed by netmsg-client.
///
/// These are instructions, not side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Capture the runtime and start background tasks.
    AllocateResources,
    /// Send the login request.
    SendLogin,
    /// Send a Bye message before releasing the transport.
    SendBye,
    /// Fail every outstanding pending call.
    DrainPending(DrainCause),
    /// Close the transport and stop background tasks.
    ReleaseTransport,
}

/// Why outstanding calls are being failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainCause {
    /// The caller terminated the session.
    Terminated,
    /// The transport disconnected.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
}

/// Illegal lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// `initialize` was called more than once.
    AlreadyInitialized,
    /// A login is already outstanding.
    LoginInProgress,
    /// The operation is not allowed in the current state.
    InvalidState {
        /// State at the time of the attempt.
        state: SessionState,
        /// What was attempted.
        attempted: &'static str,
    },
}

impl StateError {
    fn invalid(state: SessionState, attempted: &'static str) -> Self {
        StateError::InvalidState { state, attempted }
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateError::AlreadyInitialized => write!(f, "session already initialized"),
            StateError::LoginInProgress => write!(f, "login already in progress"),
            StateError::InvalidState { state, attempted } => {
                write!(f, "cannot {} while {}", attempted, state)
            }
        }
    }
}

impl std::error::Error for StateError {}
