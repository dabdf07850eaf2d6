//! # netmsg-types
//!
//! Wire vocabulary for the netmsg real-time messaging client.
//!
//! This crate provides the value types shared by every other netmsg crate:
//! - [`User`] - an online user as reported by the server directory
//! - [`RequestId`] - per-session correlation and generation token
//! - [`Request`] - messages the client sends to the server
//! - [`Event`] - messages the server delivers to the client
//! - [`WireError`] - codec failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;

pub use error::WireError;
pub use ids::{RequestId, User};
pub use messages::{
    Bye, Chat, ChatScope, ConnectTest, ConnectivityResult, DirectorySnapshot, Disconnected,
    Event, GetUsers, LogOn, LoginReply, Ping, PingProbe, PingReply, Pong, Request, Talk, To,
};
