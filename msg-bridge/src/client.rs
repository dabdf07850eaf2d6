//! MessageClient: blocking facade over `Session<T>`.
//!
//! Owns a multi-thread tokio runtime and drives the async session on it, so
//! hosts without an async runtime can call straight in. Every method except
//! `ping` blocks until the session has an answer.
//!
//! Methods, and drop, must not run inside an async runtime. Do not destroy
//! or drop the client from inside one of its own callbacks either: teardown
//! waits for running callbacks to return, so that would never finish.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::time::Duration;

use netmsg_client::{ClientError, LoginOutcome, Session, SessionConfig, TcpTransport, Transport};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use crate::error::BridgeError;
use crate::logging::{init_logging, DEFAULT_FILTER};
use crate::types::{BridgeChat, BridgeUser, PING_FAILED};

/// Flat messaging client for embedding hosts.
///
/// Wraps `Session<T>` with blocking methods over owned types. The default
/// transport is [`TcpTransport`].
pub struct MessageClient<T: Transport + 'static = TcpTransport> {
    // Declared before the runtime so the session is dropped first
    session: Session<T>,
    runtime: Runtime,
}

impl MessageClient<TcpTransport> {
    /// Create a client from a JSON configuration string.
    ///
    /// Also installs the default log subscriber if the host has none.
    pub fn new_by_config(config: &str) -> Result<Self, BridgeError> {
        init_logging(DEFAULT_FILTER);
        let config = crate::config::from_json_str(config)?;
        Self::with_tcp(config)
    }

    /// Create a client from a JSON or TOML configuration file.
    pub fn new_by_file(path: &Path) -> Result<Self, BridgeError> {
        init_logging(DEFAULT_FILTER);
        let config = crate::config::from_file(path)?;
        Self::with_tcp(config)
    }

    fn with_tcp(config: SessionConfig) -> Result<Self, BridgeError> {
        let transport = TcpTransport::with_connect_timeout(config.connect_timeout());
        Self::with_transport(config, transport)
    }
}

impl<T: Transport + 'static> MessageClient<T> {
    /// Create a client over an explicit transport.
    pub fn with_transport(config: SessionConfig, transport: T) -> Result<Self, BridgeError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("netmsg-bridge")
            .build()
            .map_err(|e| BridgeError::Runtime(e.to_string()))?;
        let session = Session::create(config, transport)?;

        tracing::info!("Message client created");
        Ok(Self { session, runtime })
    }

    /// Allocate the session's background resources on the owned runtime.
    pub fn init(&self) -> Result<(), BridgeError> {
        let _guard = self.runtime.enter();
        self.session.initialize()?;
        Ok(())
    }

    /// Check that the server is reachable and serves our service.
    ///
    /// Any failure other than calling at the wrong time is reported as
    /// [`BridgeError::NotConnected`].
    pub fn connect_test(&self) -> Result<(), BridgeError> {
        match self.runtime.block_on(self.session.verify_connectivity()) {
            Ok(()) => Ok(()),
            Err(e @ ClientError::InvalidState { .. }) => Err(e.into()),
            Err(e) => {
                tracing::warn!("Connectivity test failed: {}", e);
                Err(BridgeError::NotConnected(e.to_string()))
            }
        }
    }

    /// Log in and hand the server's answer to `callback`.
    ///
    /// `callback` receives `(accepted, message)` on the calling thread and
    /// its return value is passed back. Returns false without calling it if
    /// no answer arrived, or if `callback` panics.
    pub fn login<F>(&self, nickname: &str, callback: F) -> bool
    where
        F: FnOnce(bool, String) -> bool,
    {
        let outcome = match self.login_outcome(nickname) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                return false;
            }
        };
        tracing::debug!("Login answered: accepted={}", outcome.accepted);

        guarded("login", || callback(outcome.accepted, outcome.message)).unwrap_or(false)
    }

    /// Log in and wait for the server's answer.
    pub fn login_outcome(&self, nickname: &str) -> Result<LoginOutcome, BridgeError> {
        self.runtime.block_on(async {
            let (tx, rx) = oneshot::channel();
            self.session
                .login(nickname, move |result| {
                    let _ = tx.send(result);
                })
                .await?;
            let result = rx.await.map_err(|_| answer_lost("login"))?;
            Ok::<_, BridgeError>(result?)
        })
    }

    /// Fetch the online users and hand them to `callback`.
    pub fn get_users<F>(&self, callback: F) -> Result<(), BridgeError>
    where
        F: FnOnce(Vec<BridgeUser>),
    {
        let snapshot = self.runtime.block_on(async {
            let (tx, rx) = oneshot::channel();
            self.session
                .refresh_directory(move |result| {
                    let _ = tx.send(result);
                })
                .await?;
            let result = rx.await.map_err(|_| answer_lost("directory fetch"))?;
            Ok::<_, BridgeError>(result?)
        })?;

        let users = snapshot.iter().map(BridgeUser::from).collect();
        guarded("get_users", || callback(users))
    }

    /// Users from the last directory snapshot, without asking the server.
    pub fn users(&self) -> Vec<BridgeUser> {
        self.session
            .current_directory()
            .iter()
            .map(BridgeUser::from)
            .collect()
    }

    /// Send `msg` to every online user.
    pub fn talk(&self, msg: &str) -> Result<(), BridgeError> {
        self.runtime.block_on(self.session.broadcast(msg))?;
        Ok(())
    }

    /// Send `msg` to the user named `target`.
    pub fn to(&self, target: &str, msg: &str) -> Result<(), BridgeError> {
        self.runtime.block_on(self.session.direct(target, msg))?;
        Ok(())
    }

    /// Ping `target` without waiting for the reply.
    ///
    /// `timeout_ms <= 0` uses the configured ping timeout. `callback` later
    /// receives the target and the round trip in milliseconds, or
    /// [`PING_FAILED`] if the probe timed out or the session ended. It runs
    /// on a session thread, not the caller's.
    pub fn ping<F>(&self, target: &str, timeout_ms: i64, callback: F) -> Result<(), BridgeError>
    where
        F: FnOnce(String, i64) + Send + 'static,
    {
        let timeout = u64::try_from(timeout_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        let report = move |target: String, result: Result<Duration, netmsg_client::CallError>| {
            let elapsed = match result {
                Ok(elapsed) => i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX),
                Err(e) => {
                    tracing::warn!("Ping to {} failed: {}", target, e);
                    PING_FAILED
                }
            };
            callback(target, elapsed);
        };
        self.runtime.block_on(self.session.ping(target, timeout, report))?;
        Ok(())
    }

    /// Receive incoming chat messages.
    ///
    /// Replaces any earlier handler. The handler runs on a session thread.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(BridgeChat) + Send + Sync + 'static,
    {
        self.session.on_message(move |chat| handler(BridgeChat::from(chat)));
    }

    /// Check if the server has accepted our login.
    pub fn is_logged_in(&self) -> bool {
        self.session.state().is_authenticated()
    }

    /// Terminate the session and release the client.
    ///
    /// Outstanding callbacks have run by the time this returns. Because of
    /// that wait, calling this from inside a login, ping or message callback
    /// of the same client deadlocks.
    pub fn destroy(self) {
        drop(self);
    }
}

/// Same as [`MessageClient::destroy`], including the restriction on
/// dropping from inside a callback.
impl<T: Transport + 'static> Drop for MessageClient<T> {
    fn drop(&mut self) {
        if self.session.state().is_terminated() {
            return;
        }
        self.runtime.block_on(self.session.terminate());
        tracing::info!("Message client destroyed");
    }
}

fn answer_lost(what: &str) -> BridgeError {
    BridgeError::CallFailed(format!("{} answer lost", what))
}

/// Run host code, turning a panic into [`BridgeError::Panic`].
fn guarded<R>(label: &str, f: impl FnOnce() -> R) -> Result<R, BridgeError> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("{} callback panicked: {}", label, message);
        BridgeError::Panic(message)
    })
}
