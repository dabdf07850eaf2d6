//! Error types for netmsg-bridge.
//!
//! All lower-layer errors flatten to human-readable strings, and every
//! error maps onto one of the flat [`StatusCode`]s an embedding host sees.

use netmsg_client::{CallError, ClientError, TransportError};
use thiserror::Error;

use crate::config::ConfigError;

/// Flat status reported across the embedding boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    /// The call succeeded.
    Ok = 0,
    /// A required argument was missing or empty.
    NullPassed = 1,
    /// Host code panicked inside a callback.
    Panic = 2,
    /// Any other failure; the log has the details.
    Failed = 3,
    /// The server could not be reached.
    NotConnect = 4,
}

impl StatusCode {
    /// Status of a facade call result.
    pub fn of<T>(result: &Result<T, BridgeError>) -> Self {
        match result {
            Ok(_) => StatusCode::Ok,
            Err(e) => e.status_code(),
        }
    }

    /// Numeric value of the status.
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Errors from netmsg-bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration text or file rejected.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Missing or empty argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Server unreachable or connection lost.
    #[error("not connected: {0}")]
    NotConnected(String),

    /// Operation not allowed in the session's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Direct-message target is not online.
    #[error("unknown target: {0}")]
    UnknownTarget(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    TransportError(String),

    /// A request ended without an answer.
    #[error("request failed: {0}")]
    CallFailed(String),

    /// The facade's runtime could not be built or used.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Protocol-level error (serialization).
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// A host callback panicked.
    #[error("callback panicked: {0}")]
    Panic(String),
}

impl BridgeError {
    /// Flat status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BridgeError::InvalidArgument(_) => StatusCode::NullPassed,
            BridgeError::Panic(_) => StatusCode::Panic,
            BridgeError::NotConnected(_) => StatusCode::NotConnect,
            _ => StatusCode::Failed,
        }
    }
}

impl From<ClientError> for BridgeError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Config(e) => BridgeError::InvalidConfig(e.to_string()),
            e @ (ClientError::AlreadyInitialized
            | ClientError::InvalidState { .. }
            | ClientError::LoginInProgress
            | ClientError::PingInProgress { .. }
            | ClientError::DuplicateKey(_)) => BridgeError::InvalidState(e.to_string()),
            ClientError::Resource(msg) => BridgeError::Runtime(msg),
            ClientError::Transport(
                e @ (TransportError::ConnectionFailed(_)
                | TransportError::NotConnected
                | TransportError::ConnectionClosed),
            ) => BridgeError::NotConnected(e.to_string()),
            ClientError::Transport(e) => BridgeError::TransportError(e.to_string()),
            ClientError::ConnectionFailed(msg) => BridgeError::NotConnected(msg),
            ClientError::UnknownTarget(name) => BridgeError::UnknownTarget(name),
            ClientError::InvalidArgument(msg) => BridgeError::InvalidArgument(msg),
            ClientError::Serialization(msg) => BridgeError::ProtocolError(msg),
            ClientError::Call(e) => e.into(),
        }
    }
}

impl From<CallError> for BridgeError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Disconnected { reason } => BridgeError::NotConnected(reason),
            e => BridgeError::CallFailed(e.to_string()),
        }
    }
}

impl From<ConfigError> for BridgeError {
    fn from(err: ConfigError) -> Self {
        BridgeError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmsg_client::SessionState;

    #[test]
    fn status_codes_match_host_values() {
        assert_eq!(StatusCode::Ok.code(), 0);
        assert_eq!(StatusCode::NullPassed.code(), 1);
        assert_eq!(StatusCode::Panic.code(), 2);
        assert_eq!(StatusCode::Failed.code(), 3);
        assert_eq!(StatusCode::NotConnect.code(), 4);
    }

    #[test]
    fn status_of_result() {
        let ok: Result<(), BridgeError> = Ok(());
        assert_eq!(StatusCode::of(&ok), StatusCode::Ok);

        let err: Result<(), BridgeError> = Err(BridgeError::NotConnected("refused".into()));
        assert_eq!(StatusCode::of(&err), StatusCode::NotConnect);
    }

    #[test]
    fn invalid_state_maps_to_failed() {
        let err: BridgeError = ClientError::InvalidState {
            state: SessionState::Initialized,
            attempted: "broadcast",
        }
        .into();
        assert!(matches!(err, BridgeError::InvalidState(_)));
        assert_eq!(err.status_code(), StatusCode::Failed);
        assert!(err.to_string().contains("cannot broadcast while initialized"));
    }

    #[test]
    fn unreachable_server_maps_to_not_connect() {
        let err: BridgeError = ClientError::ConnectionFailed("service unavailable".into()).into();
        assert_eq!(err.status_code(), StatusCode::NotConnect);

        let err: BridgeError =
            ClientError::Transport(TransportError::ConnectionFailed("refused".into())).into();
        assert_eq!(err.status_code(), StatusCode::NotConnect);

        let err: BridgeError = ClientError::Call(CallError::Disconnected {
            reason: "server restart".into(),
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::NotConnect);
        assert!(err.to_string().contains("server restart"));
    }

    #[test]
    fn other_transport_errors_map_to_failed() {
        let err: BridgeError = ClientError::Transport(TransportError::Timeout).into();
        assert!(matches!(err, BridgeError::TransportError(_)));
        assert_eq!(err.status_code(), StatusCode::Failed);
    }

    #[test]
    fn empty_argument_maps_to_null_passed() {
        let err: BridgeError = ClientError::InvalidArgument("message is empty".into()).into();
        assert_eq!(err.status_code(), StatusCode::NullPassed);
    }

    #[test]
    fn timeout_maps_to_call_failed() {
        let err: BridgeError = ClientError::Call(CallError::Timeout).into();
        assert!(matches!(err, BridgeError::CallFailed(_)));
        assert_eq!(err.to_string(), "request failed: request timed out");
    }

    #[test]
    fn display_is_human_readable() {
        let err = BridgeError::InvalidConfig("server address is empty".to_string());
        assert_eq!(err.to_string(), "invalid config: server address is empty");

        let err = BridgeError::UnknownTarget("zoe".to_string());
        assert_eq!(err.to_string(), "unknown target: zoe");
    }
}
