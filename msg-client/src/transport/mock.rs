//! Mock transport for testing.
//!
//! Captures sent frames, lets tests inject inbound events, and can answer
//! requests automatically through a responder closure.

use super::{Transport, TransportError};
use async_trait::async_trait;
use netmsg_types::{Event, Request};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

type Responder = Arc<dyn Fn(&Request) -> Vec<Event> + Send + Sync>;

enum Inbound {
    Frame(Vec<u8>),
    Fail(String),
    Closed,
}

/// Mock transport for testing.
///
/// `recv()` waits until a frame is injected, like a real connection would.
/// Clones share state, so a test can keep one clone and hand the other to a
/// session.
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<Inbound>>>,
}

#[derive(Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    connect_count: usize,
    sent_messages: Vec<Vec<u8>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    responder: Option<Responder>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
            inbound_tx,
            inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a raw frame to be returned by `recv()`.
    pub fn queue_response(&self, data: Vec<u8>) {
        let _ = self.inbound_tx.send(Inbound::Frame(data));
    }

    /// Queue an encoded event to be returned by `recv()`.
    pub fn push_event(&self, event: &Event) {
        if let Ok(bytes) = event.to_bytes() {
            self.queue_response(bytes);
        }
    }

    /// Answer every decodable request sent from now on with the events
    /// `responder` returns.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&Request) -> Vec<Event> + Send + Sync + 'static,
    {
        self.lock().responder = Some(Arc::new(responder));
    }

    /// Stop answering requests automatically.
    pub fn clear_responder(&self) {
        self.lock().responder = None;
    }

    /// Simulate the server closing the connection.
    pub fn drop_connection(&self) {
        self.lock().connected = false;
        let _ = self.inbound_tx.send(Inbound::Closed);
    }

    /// Get all frames that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        self.lock().sent_messages.clone()
    }

    /// Get the last frame that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        self.lock().sent_messages.last().cloned()
    }

    /// Sent frames decoded as requests; undecodable frames are skipped.
    pub fn sent_requests(&self) -> Vec<Request> {
        self.lock()
            .sent_messages
            .iter()
            .filter_map(|bytes| Request::from_bytes(bytes).ok())
            .collect()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.lock().connected_address.clone()
    }

    /// Number of successful `connect()` calls.
    pub fn connect_count(&self) -> usize {
        self.lock().connect_count
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        let _ = self.inbound_tx.send(Inbound::Fail(error.to_string()));
    }

    /// Clear all state (sent frames, queued frames, connection, responder).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
        if let Ok(mut rx) = self.inbound_rx.try_lock() {
            while rx.try_recv().is_ok() {}
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            inbound_tx: self.inbound_tx.clone(),
            inbound_rx: Arc::clone(&self.inbound_rx),
        }
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MockTransport")
            .field("connected", &inner.connected)
            .field("connected_address", &inner.connected_address)
            .field("sent", &inner.sent_messages.len())
            .field("responder", &inner.responder.is_some())
            .finish()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        inner.connect_count += 1;
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let responder = {
            let mut inner = self.lock();

            if !inner.connected {
                return Err(TransportError::NotConnected);
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_send.take() {
                return Err(TransportError::SendFailed(error));
            }

            inner.sent_messages.push(data.to_vec());
            inner.responder.clone()
        };

        // Responder runs outside the lock so it may inspect the mock
        if let Some(responder) = responder {
            if let Ok(request) = Request::from_bytes(data) {
                for event in responder(&request) {
                    self.push_event(&event);
                }
            }
        }
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let mut rx = self.inbound_rx.lock().await;
        match rx.recv().await {
            Some(Inbound::Frame(data)) => Ok(data),
            Some(Inbound::Fail(error)) => Err(TransportError::ReceiveFailed(error)),
            Some(Inbound::Closed) | None => Err(TransportError::ConnectionClosed),
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.lock().connected = false;
        // Wake a pending recv()
        let _ = self.inbound_tx.send(Inbound::Closed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netmsg_types::{Disconnected, GetUsers, LogOn, LoginReply, RequestId};
    use std::time::Duration;

    fn login_bytes(nickname: &str) -> Vec<u8> {
        Request::LogOn(LogOn {
            request_id: RequestId::new(1),
            nickname: nickname.into(),
        })
        .to_bytes()
        .unwrap()
    }

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_connects() {
        let transport = MockTransport::new();
        assert!(!transport.is_connected());

        transport.connect("chat.local:7000").await.unwrap();

        assert!(transport.is_connected());
        assert_eq!(
            transport.connected_address(),
            Some("chat.local:7000".to_string())
        );
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn mock_transport_sends_messages() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();

        transport.send(b"frame 1").await.unwrap();
        transport.send(b"frame 2").await.unwrap();

        let sent = transport.sent_messages();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], b"frame 1");
        assert_eq!(sent[1], b"frame 2");
    }

    #[tokio::test]
    async fn mock_transport_receives_queued_frames() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();

        transport.queue_response(b"event 1".to_vec());
        transport.queue_response(b"event 2".to_vec());

        assert_eq!(transport.recv().await.unwrap(), b"event 1");
        assert_eq!(transport.recv().await.unwrap(), b"event 2");
    }

    #[tokio::test]
    async fn recv_waits_for_data() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();

        let pending = tokio::time::timeout(Duration::from_millis(30), transport.recv()).await;
        assert!(pending.is_err(), "recv should still be waiting");

        let pusher = transport.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            pusher.queue_response(b"late".to_vec());
        });

        assert_eq!(transport.recv().await.unwrap(), b"late");
    }

    #[tokio::test]
    async fn close_wakes_pending_recv() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();

        let receiver = transport.clone();
        let pending = tokio::spawn(async move { receiver.recv().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        transport.close().await.unwrap();

        let result = pending.await.unwrap();
        assert!(matches!(result, Err(TransportError::ConnectionClosed)));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn drop_connection_ends_recv() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();
        transport.drop_connection();

        assert!(!transport.is_connected());
        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    // ===========================================
    // Error Condition Tests
    // ===========================================

    #[tokio::test]
    async fn send_without_connect_fails() {
        let transport = MockTransport::new();

        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn recv_without_connect_fails() {
        let transport = MockTransport::new();

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn forced_connect_failure() {
        let transport = MockTransport::new();
        transport.fail_next_connect("network unreachable");

        let result = transport.connect("server").await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn forced_send_failure() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();
        transport.fail_next_send("buffer full");

        let result = transport.send(b"data").await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));
        assert!(transport.sent_messages().is_empty());

        // Next send should work
        transport.send(b"data").await.unwrap();
    }

    #[tokio::test]
    async fn forced_recv_failure() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();
        transport.fail_next_recv("reset by peer");
        transport.queue_response(b"data".to_vec());

        let result = transport.recv().await;
        assert!(matches!(result, Err(TransportError::ReceiveFailed(_))));

        // Next recv gets the queued data
        assert_eq!(transport.recv().await.unwrap(), b"data");
    }

    // ===========================================
    // Responder Tests
    // ===========================================

    #[tokio::test]
    async fn responder_answers_requests() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();
        transport.respond_with(|request| match request {
            Request::LogOn(logon) => vec![Event::LoginReply(LoginReply {
                request_id: logon.request_id,
                accepted: true,
                message: String::new(),
            })],
            _ => vec![],
        });

        transport.send(&login_bytes("alice")).await.unwrap();

        let reply = Event::from_bytes(&transport.recv().await.unwrap()).unwrap();
        assert!(matches!(reply, Event::LoginReply(LoginReply { accepted: true, .. })));
    }

    #[tokio::test]
    async fn sent_requests_decodes_frames() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();

        transport.send(&login_bytes("bob")).await.unwrap();
        transport.send(b"not msgpack").await.unwrap();
        transport
            .send(
                &Request::GetUsers(GetUsers {
                    request_id: RequestId::new(2),
                })
                .to_bytes()
                .unwrap(),
            )
            .await
            .unwrap();

        let requests = transport.sent_requests();
        assert_eq!(requests.len(), 2);
        assert!(matches!(&requests[0], Request::LogOn(l) if l.nickname == "bob"));
        assert!(matches!(&requests[1], Request::GetUsers(_)));
    }

    #[tokio::test]
    async fn push_event_encodes() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();
        transport.push_event(&Event::Disconnected(Disconnected {
            reason: "maintenance".into(),
        }));

        let event = Event::from_bytes(&transport.recv().await.unwrap()).unwrap();
        assert_eq!(event.kind(), "Disconnected");
    }

    // ===========================================
    // Clone and Shared State Tests
    // ===========================================

    #[tokio::test]
    async fn mock_transport_clone_shares_state() {
        let transport1 = MockTransport::new();
        let transport2 = transport1.clone();

        transport1.connect("server").await.unwrap();
        assert!(transport2.is_connected());

        transport1.send(b"from t1").await.unwrap();
        transport2.send(b"from t2").await.unwrap();
        assert_eq!(transport1.sent_messages().len(), 2);

        transport2.queue_response(b"shared".to_vec());
        assert_eq!(transport1.recv().await.unwrap(), b"shared");
    }

    #[tokio::test]
    async fn mock_transport_reset_clears_all() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();
        transport.send(b"data").await.unwrap();
        transport.queue_response(b"response".to_vec());

        transport.reset();

        assert!(!transport.is_connected());
        assert!(transport.sent_messages().is_empty());
        assert!(transport.connected_address().is_none());

        transport.connect("server").await.unwrap();
        let pending = tokio::time::timeout(Duration::from_millis(20), transport.recv()).await;
        assert!(pending.is_err(), "queued frame should have been cleared");
    }

    #[tokio::test]
    async fn last_sent_returns_most_recent() {
        let transport = MockTransport::new();
        transport.connect("server").await.unwrap();

        assert!(transport.last_sent().is_none());

        transport.send(b"first").await.unwrap();
        assert_eq!(transport.last_sent(), Some(b"first".to_vec()));

        transport.send(b"second").await.unwrap();
        assert_eq!(transport.last_sent(), Some(b"second".to_vec()));
    }
}
