//! Error types for netmsg-client.
//!
//! Preconditions (bad state, bad input, a conflicting request already in
//! flight) come back synchronously as [`ClientError`]. Outcomes decided after
//! the request left (timeout, teardown, disconnect) reach the callback that
//! was registered for it as [`CallError`].

use netmsg_core::{RegistryError, SessionState, StateError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::TransportError;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Configuration rejected at construction.
    #[error("invalid config: {0}")]
    Config(#[from] ConfigError),

    /// `initialize` was called twice.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// The operation is not allowed in the current lifecycle state.
    #[error("cannot {attempted} while {state}")]
    InvalidState {
        /// State at the time of the call.
        state: SessionState,
        /// What was attempted.
        attempted: &'static str,
    },

    /// Resources could not be allocated.
    #[error("resource error: {0}")]
    Resource(String),

    /// A login is already outstanding.
    #[error("login already in progress")]
    LoginInProgress,

    /// A ping to this target is already outstanding.
    #[error("ping to {target} already in progress")]
    PingInProgress {
        /// Target of the outstanding ping.
        target: String,
    },

    /// Some other request with the same correlation key is outstanding.
    #[error("duplicate request: {0}")]
    DuplicateKey(String),

    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The server could not be reached or refused the service.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Direct-message target is not in the presence directory.
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// Caller passed an unusable value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A request the caller was waiting on ended without an answer.
    #[error("{0}")]
    Call(#[from] CallError),
}

impl From<StateError> for ClientError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::AlreadyInitialized => ClientError::AlreadyInitialized,
            StateError::LoginInProgress => ClientError::LoginInProgress,
            StateError::InvalidState { state, attempted } => {
                ClientError::InvalidState { state, attempted }
            }
        }
    }
}

impl ClientError {
    /// Map a registry refusal for an operation named `attempted`.
    pub(crate) fn from_registry(err: RegistryError, attempted: &'static str) -> Self {
        match err {
            RegistryError::Closed => ClientError::InvalidState {
                state: SessionState::Terminated,
                attempted,
            },
            RegistryError::DuplicateKey(netmsg_core::CallKey::Login) => ClientError::LoginInProgress,
            RegistryError::DuplicateKey(netmsg_core::CallKey::Ping(target)) => {
                ClientError::PingInProgress { target }
            }
            RegistryError::DuplicateKey(key) => ClientError::DuplicateKey(key.to_string()),
        }
    }
}

/// Asynchronous failure delivered to a request's callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// No answer within the request's timeout.
    #[error("request timed out")]
    Timeout,

    /// The session was terminated while the request was outstanding.
    #[error("session terminated")]
    SessionTerminated,

    /// The transport went away while the request was outstanding.
    #[error("disconnected: {reason}")]
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
}

impl CallError {
    /// Check if the request was cut short by the session ending.
    pub fn is_termination(&self) -> bool {
        matches!(self, CallError::SessionTerminated | CallError::Disconnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmsg_core::CallKey;

    #[test]
    fn state_errors_map_one_to_one() {
        assert!(matches!(
            ClientError::from(StateError::LoginInProgress),
            ClientError::LoginInProgress
        ));

        let err = ClientError::from(StateError::InvalidState {
            state: SessionState::Terminated,
            attempted: "broadcast",
        });
        assert_eq!(err.to_string(), "cannot broadcast while terminated");
    }

    #[test]
    fn duplicate_ping_becomes_ping_in_progress() {
        let err = ClientError::from_registry(
            RegistryError::DuplicateKey(CallKey::Ping("carol".into())),
            "ping",
        );
        assert!(matches!(err, ClientError::PingInProgress { ref target } if target == "carol"));
    }

    #[test]
    fn closed_registry_reads_as_terminated() {
        let err = ClientError::from_registry(RegistryError::Closed, "login");
        assert!(matches!(
            err,
            ClientError::InvalidState {
                state: SessionState::Terminated,
                attempted: "login"
            }
        ));
    }

    #[test]
    fn termination_failures_are_recognized() {
        assert!(CallError::SessionTerminated.is_termination());
        assert!(CallError::Disconnected {
            reason: "reset".into()
        }
        .is_termination());
        assert!(!CallError::Timeout.is_termination());
    }

    #[test]
    fn transport_error_converts() {
        let err: ClientError = TransportError::NotConnected.into();
        assert_eq!(err.to_string(), "transport error: not connected");
    }
}
