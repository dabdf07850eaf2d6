//! Protocol messages for netmsg.
//!
//! [`Request`] travels client → server, [`Event`] travels server → client.
//! Both are encoded as MessagePack maps with a `type` discriminator.

use serde::{Deserialize, Serialize};

use crate::{RequestId, User, WireError};

/// All messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// Reachability probe, answered by [`ConnectivityResult`]
    ConnectTest(ConnectTest),
    /// Log in under a nickname, answered by [`LoginReply`]
    LogOn(LogOn),
    /// Fetch the online directory, answered by [`DirectorySnapshot`]
    GetUsers(GetUsers),
    /// Message to every online user
    Talk(Talk),
    /// Message to one user
    To(To),
    /// Latency probe towards a user, answered by [`PingReply`]
    Ping(Ping),
    /// Answer to another user's [`PingProbe`]
    Pong(Pong),
    /// Graceful disconnect
    Bye(Bye),
}

impl Request {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec_named(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}

/// All messages the server may deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Outcome of a [`ConnectTest`]
    ConnectivityResult(ConnectivityResult),
    /// Outcome of a [`LogOn`]
    LoginReply(LoginReply),
    /// Full list of online users
    DirectorySnapshot(DirectorySnapshot),
    /// A user answered our [`Ping`]
    PingReply(PingReply),
    /// Another user is measuring latency to us
    PingProbe(PingProbe),
    /// A chat message addressed to us or to everyone
    Chat(Chat),
    /// The server is closing the session
    Disconnected(Disconnected),
}

impl Event {
    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec_named(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }

    /// Short name of the variant, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConnectivityResult(_) => "ConnectivityResult",
            Event::LoginReply(_) => "LoginReply",
            Event::DirectorySnapshot(_) => "DirectorySnapshot",
            Event::PingReply(_) => "PingReply",
            Event::PingProbe(_) => "PingProbe",
            Event::Chat(_) => "Chat",
            Event::Disconnected(_) => "Disconnected",
        }
    }
}

/// Reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTest {
    /// Correlates the probe with its result
    pub request_id: RequestId,
    /// Service the client expects to reach
    pub service_name: String,
    /// Shared key the server may check before answering
    pub verify_key: Option<String>,
}

/// Login request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogOn {
    /// Echoed back in the matching [`LoginReply`]
    pub request_id: RequestId,
    /// Requested nickname
    pub nickname: String,
}

/// Directory fetch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetUsers {
    /// Echoed back in the matching [`DirectorySnapshot`]
    pub request_id: RequestId,
}

/// Broadcast chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Talk {
    /// Message text
    pub message: String,
}

/// Direct chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct To {
    /// Recipient nickname
    pub target: String,
    /// Message text
    pub message: String,
}

/// Latency probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Nickname of the user being probed
    pub target: String,
    /// Generation token, echoed in the [`PingReply`]
    pub token: RequestId,
}

/// Answer to a peer's probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Nickname of the user who sent the probe
    pub to: String,
    /// Token copied from the [`PingProbe`]
    pub token: RequestId,
}

/// Graceful disconnect message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bye {
    /// Optional reason for disconnect
    pub reason: Option<String>,
}

/// Result of a reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectivityResult {
    /// Id of the probe being answered
    pub request_id: RequestId,
    /// Whether the server accepts sessions for the requested service
    pub reachable: bool,
}

/// Result of a login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginReply {
    /// Id of the [`LogOn`] being answered
    pub request_id: RequestId,
    /// Whether the nickname was accepted
    pub accepted: bool,
    /// Server explanation, empty on plain success
    pub message: String,
}

/// Online directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Id of the [`GetUsers`] being answered; `None` for unsolicited pushes
    pub request_id: Option<RequestId>,
    /// Every online user, in server order
    pub users: Vec<User>,
}

/// A user answered our probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReply {
    /// Nickname of the user who was probed
    pub target: String,
    /// Token copied from the [`Ping`]
    pub token: RequestId,
}

/// Another user is probing us.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingProbe {
    /// Nickname of the probing user
    pub from: String,
    /// Token to copy into the [`Pong`]
    pub token: RequestId,
}

/// Audience of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatScope {
    /// Sent to everyone online
    Broadcast,
    /// Sent to us only
    Direct,
}

/// Inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Sender nickname
    pub from: String,
    /// Message text
    pub message: String,
    /// Whether it was a broadcast or a direct message
    pub scope: ChatScope,
}

/// Server-initiated session close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnected {
    /// Reason given by the server
    pub reason: String,
}
