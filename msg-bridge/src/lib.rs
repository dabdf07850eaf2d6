//! # netmsg-bridge
//!
//! Flat embedding facade for the netmsg messaging client.
//!
//! This crate monomorphizes `Session<TcpTransport>` into [`MessageClient`],
//! a blocking handle with owned, lifetime-free arguments that a C ABI shim
//! or another language binding can wrap directly.
//!
//! ## Design
//!
//! - Blocking methods over an owned tokio runtime; no async in the API
//! - `String` and `Vec` values only, no references into session state
//! - Errors flatten to human-readable strings plus a [`StatusCode`]
//! - Thin wrappers: all real logic lives in netmsg-client and netmsg-core

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use client::MessageClient;
pub use config::ConfigError;
pub use error::{BridgeError, StatusCode};
pub use logging::init_logging;
pub use types::{BridgeChat, BridgeUser, PING_FAILED};
