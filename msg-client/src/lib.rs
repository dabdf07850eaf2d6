//! # netmsg-client
//!
//! Session engine for the netmsg real-time messaging client.
//!
//! This is the library applications use to talk to a message server: log
//! in, keep a directory of who is online, send broadcast and direct
//! messages, and measure latency to other users.
//!
//! ## Features
//!
//! - **Single resolution**: every asynchronous request resolves exactly once,
//!   by reply, timeout, or teardown
//! - **Atomic directory**: readers always see a complete snapshot
//! - **Dispatch boundary**: callbacks run off the receive path by default
//! - **Transport Abstraction**: pluggable transport layer (TCP, mock)
//! - **Pure State Machine**: uses netmsg-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use netmsg_client::{Session, SessionConfig, TcpTransport};
//!
//! let session = Session::create(SessionConfig::new("127.0.0.1:7000"), TcpTransport::new())?;
//! session.initialize()?;
//! session.verify_connectivity().await?;
//! session.login("alice", |outcome| println!("{:?}", outcome)).await?;
//!
//! session.broadcast("hello everyone").await?;
//! session.terminate().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
mod dispatch;
pub mod error;
mod messenger;
mod ping;
pub mod session;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::{ConfigError, DispatchMode, SessionConfig};
pub use dispatch::{DirectoryCallback, LoginCallback, LoginOutcome, MessageHandler, PingCallback};
pub use error::{CallError, ClientError};
pub use session::Session;
pub use transport::{MockTransport, TcpTransport, Transport, TransportError, MAX_MESSAGE_SIZE};

// Re-exported so applications need not depend on the lower crates directly
pub use netmsg_core::{PresenceSnapshot, SessionState};
pub use netmsg_types::{Chat, ChatScope, User};
