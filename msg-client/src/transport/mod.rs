//! Transport abstraction for netmsg.
//!
//! This module provides a pluggable transport layer that abstracts the
//! underlying connection mechanism (TCP, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented and carries whole
//! frames, one encoded message per frame:
//! - `connect()` establishes a connection
//! - `send()` transmits one encoded request
//! - `recv()` waits for the next encoded event
//! - `close()` gracefully terminates
//!
//! A session calls `recv()` from exactly one task and `send()` from any
//! number of callers, so implementations must allow the two to overlap.
//!
//! # Example
//!
//! ```ignore
//! let transport = TcpTransport::new();
//! transport.connect("127.0.0.1:7000").await?;
//! transport.send(&request.to_bytes()?).await?;
//! let event = Event::from_bytes(&transport.recv().await?)?;
//! ```

mod mock;
mod tcp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Maximum frame size (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Operation did not complete in time.
    #[error("timed out")]
    Timeout,
}

/// Transport trait for sending requests and receiving events.
///
/// Implementations handle the underlying connection mechanism
/// (TCP, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the server at `address`.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one frame.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive one frame.
    ///
    /// Waits until data is available or the connection closes.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully.
    async fn close(&self) -> Result<(), TransportError>;
}
