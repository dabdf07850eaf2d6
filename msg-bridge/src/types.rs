//! Flat types handed across the bridge.
//!
//! Everything here is owned and plain: no generics, no lifetimes, no
//! shared pointers into session state.

use netmsg_types::{Chat, ChatScope, User};

/// Elapsed value reported to a ping callback when the probe failed.
pub const PING_FAILED: i64 = -1;

/// An online user as reported by `get_users`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeUser {
    /// Display name.
    pub nickname: String,
    /// Server-assigned session id.
    pub session_id: i64,
}

impl From<&User> for BridgeUser {
    fn from(user: &User) -> Self {
        Self {
            nickname: user.nickname.clone(),
            session_id: user.session_id,
        }
    }
}

/// An incoming chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeChat {
    /// Sender nickname.
    pub from: String,
    /// Message text.
    pub message: String,
    /// True when the message was addressed to us alone.
    pub direct: bool,
}

impl From<Chat> for BridgeChat {
    fn from(chat: Chat) -> Self {
        Self {
            from: chat.from,
            message: chat.message,
            direct: chat.scope == ChatScope::Direct,
        }
    }
}
