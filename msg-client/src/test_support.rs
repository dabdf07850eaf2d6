//! Shared fixtures for session tests.

use std::time::Duration;

use netmsg_core::SessionState;
use netmsg_types::{
    ConnectivityResult, DirectorySnapshot, Event, LoginReply, Request, RequestId, User,
};
use tokio::sync::mpsc;

use crate::{MockTransport, Session, SessionConfig};

/// Nickname the test server always rejects.
pub(crate) const TAKEN_NICKNAME: &str = "mallory";

/// Short timeouts so expiry tests finish quickly.
pub(crate) fn fast_config() -> SessionConfig {
    SessionConfig::new("test-server:7000")
        .with_service_name("chat")
        .with_connect_timeout(Duration::from_millis(500))
        .with_request_timeout(Duration::from_millis(300))
        .with_ping_timeout(Duration::from_millis(300))
        .with_send_timeout(Duration::from_millis(500))
        .with_sweep_interval(Duration::from_millis(10))
}

/// A mock server that answers probes, logins and directory fetches.
///
/// Pings are left unanswered so tests control the reply timing.
pub(crate) fn server(users: Vec<User>) -> MockTransport {
    let transport = MockTransport::new();
    transport.respond_with(move |request| match request {
        Request::ConnectTest(probe) => vec![Event::ConnectivityResult(ConnectivityResult {
            request_id: probe.request_id,
            reachable: true,
        })],
        Request::LogOn(logon) => vec![Event::LoginReply(LoginReply {
            request_id: logon.request_id,
            accepted: logon.nickname != TAKEN_NICKNAME,
            message: if logon.nickname == TAKEN_NICKNAME {
                "nickname taken".into()
            } else {
                String::new()
            },
        })],
        Request::GetUsers(get) => vec![Event::DirectorySnapshot(DirectorySnapshot {
            request_id: Some(get.request_id),
            users: users.clone(),
        })],
        _ => vec![],
    });
    transport
}

/// Users the default server reports.
pub(crate) fn roster() -> Vec<User> {
    vec![User::new("alice", 1), User::new("carol", 2), User::new("erin", 3)]
}

/// Create and initialize a session over `transport`.
pub(crate) fn initialized(transport: MockTransport) -> Session<MockTransport> {
    initialized_with(fast_config(), transport)
}

pub(crate) fn initialized_with(
    config: SessionConfig,
    transport: MockTransport,
) -> Session<MockTransport> {
    let session = Session::create(config, transport).unwrap();
    session.initialize().unwrap();
    session
}

/// A session logged in as alice with the directory fetched.
pub(crate) async fn authenticated(transport: MockTransport) -> Session<MockTransport> {
    authenticated_with(fast_config(), transport).await
}

pub(crate) async fn authenticated_with(
    config: SessionConfig,
    transport: MockTransport,
) -> Session<MockTransport> {
    let session = initialized_with(config, transport);
    session.verify_connectivity().await.unwrap();
    session.login("alice", |_| {}).await.unwrap();
    wait_until(|| session.state() == SessionState::Authenticated).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    session
        .refresh_directory(move |result| {
            let _ = tx.send(result);
        })
        .await
        .unwrap();
    next(&mut rx).await.unwrap();
    session
}

/// Poll `condition` until it holds, failing the test after two seconds.
pub(crate) async fn wait_until<F: Fn() -> bool>(condition: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Next value from a callback channel, failing the test after two seconds.
pub(crate) async fn next<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("callback did not fire in time")
        .expect("callback channel closed")
}

/// Assert nothing more arrives on a callback channel for a short while.
pub(crate) async fn assert_silent<T: std::fmt::Debug>(rx: &mut mpsc::UnboundedReceiver<T>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Ok(extra) = rx.try_recv() {
        panic!("callback fired again: {:?}", extra);
    }
}

/// Token of the most recent ping sent to `target`.
pub(crate) fn last_ping_token(transport: &MockTransport, target: &str) -> RequestId {
    transport
        .sent_requests()
        .iter()
        .rev()
        .find_map(|request| match request {
            Request::Ping(ping) if ping.target == target => Some(ping.token),
            _ => None,
        })
        .expect("no ping sent to target")
}

/// Request id of the most recent login.
pub(crate) fn last_login_id(transport: &MockTransport) -> RequestId {
    transport
        .sent_requests()
        .iter()
        .rev()
        .find_map(|request| match request {
            Request::LogOn(logon) => Some(logon.request_id),
            _ => None,
        })
        .expect("no login sent")
}
