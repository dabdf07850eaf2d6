//! TcpTransport - length-prefixed frames over a TCP stream.
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes.
//! The stream is split so a pending `recv()` never blocks a `send()`.

use super::{Transport, TransportError, MAX_MESSAGE_SIZE};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Default bound on establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TcpTransport implements the Transport trait over a plain TCP connection.
///
/// # Example
///
/// ```ignore
/// let transport = TcpTransport::new();
/// transport.connect("127.0.0.1:7000").await?;
/// transport.send(&frame).await?;
/// let reply = transport.recv().await?;
/// ```
pub struct TcpTransport {
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create an unconnected transport.
    pub fn new() -> Self {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create an unconnected transport with a custom connect bound.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
            connect_timeout,
        }
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        // Close existing connection if any
        self.close().await.ok();

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::ConnectionFailed(format!("{address}: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| TransportError::ConnectionFailed(format!("Failed to set nodelay: {e}")))?;

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);

        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        // Validate message size
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::SendFailed(format!(
                "Message too large: {} > {}",
                data.len(),
                MAX_MESSAGE_SIZE
            )));
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;

        // One write per frame keeps concurrent senders from interleaving
        let mut frame = Vec::with_capacity(4 + data.len());
        frame.extend_from_slice(&(data.len() as u32).to_be_bytes());
        frame.extend_from_slice(data);

        if let Err(e) = writer.write_all(&frame).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::SendFailed(format!("Failed to write frame: {e}")));
        }

        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;

        // Read length prefix (4 bytes, big-endian)
        let mut len_buf = [0u8; 4];
        if let Err(e) = reader.read_exact(&mut len_buf).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::ConnectionClosed
            } else {
                TransportError::ReceiveFailed(format!("Failed to read length: {e}"))
            });
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        // Validate length
        if len > MAX_MESSAGE_SIZE {
            return Err(TransportError::ReceiveFailed(format!(
                "Message too large: {} > {}",
                len, MAX_MESSAGE_SIZE
            )));
        }

        // Read payload
        let mut data = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut data).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(TransportError::ReceiveFailed(format!(
                "Failed to read data: {e}"
            )));
        }

        Ok(data)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);

        if let Some(mut writer) = self.writer.lock().await.take() {
            // Signal end of stream
            writer.shutdown().await.ok();
        }
        // A pending recv() holds the reader; it ends once the peer closes
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        Ok(())
    }
}
