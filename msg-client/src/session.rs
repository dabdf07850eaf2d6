//! Session - the main interface for netmsg.
//!
//! This module provides [`Session`], the stateful handle for one connection
//! to a message server.
//!
//! # Architecture
//!
//! Session uses the pure lifecycle state machine from netmsg-core and
//! interprets its actions to perform the actual I/O via the Transport trait.
//! Two background tasks run per session: the receive loop (started on first
//! connect) and the timeout sweep (started by `initialize`). Both hold only a
//! weak reference, so dropping the `Session` is enough to stop them.
//!
//! ```text
//! Application → Session → Transport → Network
//!                  ↓           ↓
//!            netmsg-core   receive loop → registry → Dispatcher → callbacks
//! ```
//!
//! # Example
//!
//! ```ignore
//! use netmsg_client::{Session, SessionConfig, TcpTransport};
//!
//! let session = Session::create(SessionConfig::new("127.0.0.1:7000"), TcpTransport::new())?;
//! session.initialize()?;
//! session.verify_connectivity().await?;
//! session.login("alice", |result| println!("login: {:?}", result)).await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak};
use std::time::Instant;

use netmsg_core::{
    Action, CallHandle, CallKey, DrainCause, LifecycleEvent, Operation, PendingCall,
    PendingCallRegistry, PresenceDirectory, PresenceSnapshot, Resolution, SessionState,
    StateError,
};
use netmsg_types::{Bye, ConnectTest, Event, GetUsers, LogOn, Pong, Request, RequestId};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::SessionConfig;
use crate::dispatch::{
    Completion, Dispatcher, DirectoryCallback, LoginCallback, LoginOutcome, MessageHandler,
};
use crate::error::{CallError, ClientError};
use crate::transport::{Transport, TransportError};

/// Lock a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<M>(mutex: &Mutex<M>) -> MutexGuard<'_, M> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A client session with one message server.
///
/// Not `Clone`: a session is owned by one place, and dropping it tears it
/// down. Share it behind an `Arc` if several tasks need it.
pub struct Session<T: Transport + 'static> {
    pub(crate) inner: Arc<SessionInner<T>>,
}

pub(crate) struct SessionInner<T: Transport + 'static> {
    pub(crate) config: SessionConfig,
    transport: Arc<T>,
    state: Mutex<SessionState>,
    registry: Mutex<PendingCallRegistry<Completion>>,
    pub(crate) directory: PresenceDirectory,
    dispatcher: Dispatcher,
    tasks: Mutex<Tasks>,
    connect_lock: tokio::sync::Mutex<()>,
    next_request: AtomicU64,
    message_handler: RwLock<Option<MessageHandler>>,
}

#[derive(Default)]
struct Tasks {
    sweeper: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
}

/// Async half of a teardown, decided by the synchronous half.
#[derive(Debug, Default)]
struct Teardown {
    send_bye: bool,
    release_transport: bool,
}

impl<T: Transport + 'static> Session<T> {
    /// Create a session from a validated configuration.
    ///
    /// No I/O happens until the first operation that needs the server.
    pub fn create(config: SessionConfig, transport: T) -> Result<Self, ClientError> {
        config.validate()?;
        tracing::debug!("Session created for {}", config.server_address);

        let dispatcher = Dispatcher::new(config.dispatch);
        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                transport: Arc::new(transport),
                state: Mutex::new(SessionState::new()),
                registry: Mutex::new(PendingCallRegistry::new()),
                directory: PresenceDirectory::new(),
                dispatcher,
                tasks: Mutex::new(Tasks::default()),
                connect_lock: tokio::sync::Mutex::new(()),
                next_request: AtomicU64::new(1),
                message_handler: RwLock::new(None),
            }),
        })
    }

    /// Allocate background resources.
    ///
    /// Must be called from within a tokio runtime; that runtime hosts the
    /// session's tasks and spawned callbacks for the rest of its life.
    pub fn initialize(&self) -> Result<(), ClientError> {
        let runtime = Handle::try_current().map_err(|e| ClientError::Resource(e.to_string()))?;
        let (_, actions) = self.inner.transition(LifecycleEvent::InitializeRequested)?;

        for action in actions {
            if action == Action::AllocateResources {
                self.inner.allocate(runtime.clone());
            }
        }

        tracing::info!("Session initialized");
        Ok(())
    }

    /// Check that the server is reachable and serves the configured service.
    ///
    /// Connects if needed. Bounded by the connect and request timeouts.
    /// Failure leaves the lifecycle state unchanged, so it can be retried.
    pub async fn verify_connectivity(&self) -> Result<(), ClientError> {
        self.inner.permit(Operation::VerifyConnectivity)?;
        self.inner.ensure_connected().await?;

        let request_id = self.inner.next_request_id();
        let (tx, rx) = oneshot::channel();
        let handle = self.inner.register(
            CallKey::Connectivity(request_id),
            request_id,
            self.inner.config.request_timeout(),
            Completion::Connectivity(tx),
            "verify connectivity",
        )?;

        let request = Request::ConnectTest(ConnectTest {
            request_id,
            service_name: self.inner.config.service_name.clone(),
            verify_key: self.inner.config.verify_key.clone(),
        });
        if let Err(e) = self.inner.send(&request).await {
            if self.inner.withdraw(&handle) {
                return Err(e);
            }
            // Already resolved elsewhere; its outcome is waiting in `rx`
        }

        let reachable = match rx.await {
            Ok(result) => result?,
            Err(_) => return Err(CallError::SessionTerminated.into()),
        };
        if !reachable {
            tracing::warn!(
                "Server {} refused service '{}'",
                self.inner.config.server_address,
                self.inner.config.service_name
            );
            return Err(ClientError::ConnectionFailed(format!(
                "server refused service '{}'",
                self.inner.config.service_name
            )));
        }

        self.inner.transition(LifecycleEvent::ConnectivityConfirmed)?;
        tracing::info!("Connectivity verified");
        Ok(())
    }

    /// Log in under `nickname`.
    ///
    /// Returns once the request is sent. `callback` later receives the
    /// server's answer, or a [`CallError`] on timeout, termination or
    /// disconnect. Acceptance moves the session to Authenticated; rejection
    /// or timeout returns it to Initialized so login can be retried.
    pub async fn login<F>(&self, nickname: &str, callback: F) -> Result<(), ClientError>
    where
        F: FnOnce(Result<LoginOutcome, CallError>) + Send + 'static,
    {
        if nickname.is_empty() {
            return Err(ClientError::InvalidArgument("nickname is empty".into()));
        }

        let (_, actions) = self.inner.transition(LifecycleEvent::LoginRequested)?;

        if let Err(e) = self.inner.ensure_connected().await {
            self.inner.abandon_login();
            return Err(e);
        }

        let callback: LoginCallback = Box::new(callback);
        let token = self.inner.next_request_id();
        let handle = match self.inner.register(
            CallKey::Login,
            token,
            self.inner.config.request_timeout(),
            Completion::Login(callback),
            "login",
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.abandon_login();
                return Err(e);
            }
        };

        for action in actions {
            if action != Action::SendLogin {
                continue;
            }
            let request = Request::LogOn(LogOn {
                request_id: token,
                nickname: nickname.to_string(),
            });
            if let Err(e) = self.inner.send(&request).await {
                if self.inner.withdraw(&handle) {
                    self.inner.abandon_login();
                    return Err(e);
                }
            }
        }

        tracing::debug!("Login sent for '{}'", nickname);
        Ok(())
    }

    /// Fetch the online directory.
    ///
    /// Every snapshot the server sends replaces the current directory;
    /// `callback` receives the snapshot that answers this particular request.
    pub async fn refresh_directory<F>(&self, callback: F) -> Result<(), ClientError>
    where
        F: FnOnce(Result<Arc<PresenceSnapshot>, CallError>) + Send + 'static,
    {
        self.inner.permit(Operation::RefreshDirectory)?;

        let callback: DirectoryCallback = Box::new(callback);
        let request_id = self.inner.next_request_id();
        let handle = self.inner.register(
            CallKey::Directory(request_id),
            request_id,
            self.inner.config.request_timeout(),
            Completion::Directory(callback),
            "refresh directory",
        )?;

        let request = Request::GetUsers(GetUsers { request_id });
        if let Err(e) = self.inner.send(&request).await {
            if self.inner.withdraw(&handle) {
                return Err(e);
            }
        }
        Ok(())
    }

    /// The most recent directory snapshot. Empty before the first fetch.
    pub fn current_directory(&self) -> Arc<PresenceSnapshot> {
        self.inner.directory.current()
    }

    /// Install the handler for inbound chat messages, replacing any previous one.
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(netmsg_types::Chat) + Send + Sync + 'static,
    {
        let mut slot = self
            .inner
            .message_handler
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(handler));
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Number of requests awaiting resolution.
    pub fn pending_calls(&self) -> usize {
        lock(&self.inner.registry).len()
    }

    /// Tear the session down.
    ///
    /// Every outstanding request is failed with
    /// [`CallError::SessionTerminated`] and its callback has run by the time
    /// this returns. Afterwards every operation fails with `InvalidState`.
    /// Calling it again does nothing.
    ///
    /// Must not be awaited from inside one of this session's callbacks: it
    /// waits for dispatched callbacks to finish, including that one.
    pub async fn terminate(&self) {
        let teardown = self.inner.shut_down(LifecycleEvent::TerminateRequested, true);
        self.inner.finish_teardown(teardown).await;
    }
}

impl<T: Transport + 'static> Drop for Session<T> {
    fn drop(&mut self) {
        if self.inner.state().is_terminated() {
            return;
        }

        tracing::debug!("Session dropped without terminate; tearing down");
        let teardown = self.inner.shut_down(LifecycleEvent::TerminateRequested, true);
        if !teardown.release_transport {
            return;
        }

        // Never initialized means never connected
        let Some(runtime) = self.inner.dispatcher.runtime() else {
            return;
        };
        let transport = Arc::clone(&self.inner.transport);
        let send_timeout = self.inner.config.send_timeout();
        let bye = if teardown.send_bye {
            Request::Bye(Bye { reason: None }).to_bytes().ok()
        } else {
            None
        };
        runtime.spawn(async move {
            if let Some(bytes) = bye {
                if transport.is_connected() {
                    let _ = tokio::time::timeout(send_timeout, transport.send(&bytes)).await;
                }
            }
            transport.close().await.ok();
        });
    }
}

impl<T: Transport + 'static> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.inner.config.server_address)
            .field("state", &self.inner.state())
            .field("pending", &lock(&self.inner.registry).len())
            .finish()
    }
}

impl<T: Transport + 'static> SessionInner<T> {
    pub(crate) fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    /// Apply a lifecycle event; the state is left untouched on error.
    fn transition(&self, event: LifecycleEvent) -> Result<(SessionState, Vec<Action>), StateError> {
        let mut state = lock(&self.state);
        let (next, actions) = state.on_event(event)?;
        *state = next;
        Ok((next, actions))
    }

    pub(crate) fn permit(&self, operation: Operation) -> Result<(), ClientError> {
        Ok(lock(&self.state).permits(operation)?)
    }

    pub(crate) fn next_request_id(&self) -> RequestId {
        RequestId::new(self.next_request.fetch_add(1, Ordering::Relaxed))
    }

    fn abandon_login(&self) {
        if let Err(e) = self.transition(LifecycleEvent::LoginAbandoned) {
            tracing::debug!("Login abandon ignored: {}", e);
        }
    }

    fn allocate(self: &Arc<Self>, runtime: Handle) {
        self.dispatcher.attach(runtime.clone());
        let sweeper = runtime.spawn(sweep_loop(Arc::downgrade(self)));
        lock(&self.tasks).sweeper = Some(sweeper);
    }

    pub(crate) fn register(
        &self,
        key: CallKey,
        token: RequestId,
        timeout: std::time::Duration,
        completion: Completion,
        attempted: &'static str,
    ) -> Result<CallHandle, ClientError> {
        lock(&self.registry)
            .register(key, token, Instant::now(), timeout, completion)
            .map_err(|e| ClientError::from_registry(e, attempted))
    }

    /// Withdraw a call whose request could not be sent.
    ///
    /// Returns false if something else resolved it first, in which case its
    /// callback has the outcome and the caller must not report an error too.
    pub(crate) fn withdraw(&self, handle: &CallHandle) -> bool {
        lock(&self.registry).cancel(handle).is_some()
    }

    /// Encode and send one request, bounded by the send timeout.
    pub(crate) async fn send(&self, request: &Request) -> Result<(), ClientError> {
        let bytes = request
            .to_bytes()
            .map_err(|e| ClientError::Serialization(e.to_string()))?;

        match tokio::time::timeout(self.config.send_timeout(), self.transport.send(&bytes)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::warn!("Send failed: {}", e);
                Err(e.into())
            }
            Err(_) => {
                tracing::warn!("Send timed out after {:?}", self.config.send_timeout());
                Err(TransportError::Timeout.into())
            }
        }
    }

    /// Connect and start the receive loop unless already done.
    async fn ensure_connected(self: &Arc<Self>) -> Result<(), ClientError> {
        let _guard = self.connect_lock.lock().await;
        if self.transport.is_connected() && lock(&self.tasks).receiver.is_some() {
            return Ok(());
        }

        let runtime = self
            .dispatcher
            .runtime()
            .cloned()
            .ok_or_else(|| ClientError::Resource("session not initialized".into()))?;

        let address = &self.config.server_address;
        tracing::debug!("Connecting to {}", address);
        match tokio::time::timeout(self.config.connect_timeout(), self.transport.connect(address))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!("Connection to {} failed: {}", address, e);
                return Err(ClientError::ConnectionFailed(e.to_string()));
            }
            Err(_) => {
                tracing::warn!("Connection to {} timed out", address);
                return Err(ClientError::ConnectionFailed(format!(
                    "no connection to {} within {:?}",
                    address,
                    self.config.connect_timeout()
                )));
            }
        }

        // terminate() may have run while we were connecting
        let state = self.state();
        if state.is_terminated() {
            self.transport.close().await.ok();
            return Err(ClientError::InvalidState {
                state,
                attempted: "connect",
            });
        }

        let receiver = runtime.spawn(receive_loop(
            Arc::clone(&self.transport),
            Arc::downgrade(self),
        ));
        lock(&self.tasks).receiver = Some(receiver);

        tracing::info!("Connected to {}", address);
        Ok(())
    }

    /// Route one inbound event.
    async fn route(&self, event: Event) {
        tracing::debug!("Routing {}", event.kind());

        match event {
            Event::ConnectivityResult(result) => {
                let key = CallKey::Connectivity(result.request_id);
                match self.take_reply(&key, result.request_id) {
                    Some(call) => self.complete(call, Answer::Connectivity(result.reachable)),
                    None => tracing::debug!(
                        "Ignoring connectivity result #{} with no probe outstanding",
                        result.request_id
                    ),
                }
            }
            Event::LoginReply(reply) => {
                let Some(call) = self.take_reply(&CallKey::Login, reply.request_id) else {
                    tracing::warn!(
                        "Ignoring login reply #{} with no matching login outstanding",
                        reply.request_id
                    );
                    return;
                };

                let event = if reply.accepted {
                    tracing::info!("Login accepted");
                    LifecycleEvent::LoginAccepted
                } else {
                    tracing::warn!("Login rejected: {}", reply.message);
                    LifecycleEvent::LoginRejected
                };
                if let Err(e) = self.transition(event) {
                    tracing::debug!("Login reply arrived after state change: {}", e);
                }

                self.complete(
                    call,
                    Answer::Login(LoginOutcome {
                        accepted: reply.accepted,
                        message: reply.message,
                    }),
                );
            }
            Event::DirectorySnapshot(snapshot) => {
                let current = self
                    .directory
                    .replace(PresenceSnapshot::new(snapshot.users));
                tracing::debug!("Directory replaced ({} users)", current.len());

                if let Some(request_id) = snapshot.request_id {
                    match self.take_reply(&CallKey::Directory(request_id), request_id) {
                        Some(call) => self.complete(call, Answer::Directory(current)),
                        None => tracing::debug!(
                            "Directory fetch #{} already resolved; snapshot applied only",
                            request_id
                        ),
                    }
                }
            }
            Event::PingReply(reply) => {
                let key = CallKey::Ping(reply.target.clone());
                match self.take_reply(&key, reply.token) {
                    Some(call) => {
                        let elapsed = call.elapsed_at(Instant::now());
                        tracing::debug!("Ping to {} answered in {:?}", reply.target, elapsed);
                        self.complete(call, Answer::Ping(elapsed));
                    }
                    None => tracing::warn!(
                        "Ignoring late or stale ping reply from {} (token {})",
                        reply.target,
                        reply.token
                    ),
                }
            }
            Event::PingProbe(probe) => {
                let pong = Request::Pong(Pong {
                    to: probe.from,
                    token: probe.token,
                });
                if let Err(e) = self.send(&pong).await {
                    tracing::warn!("Failed to answer ping probe: {}", e);
                }
            }
            Event::Chat(chat) => {
                let handler = self
                    .message_handler
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                match handler {
                    Some(handler) => self.dispatcher.chat_received(handler, chat),
                    None => tracing::debug!("No message handler; dropping chat from {}", chat.from),
                }
            }
            // Handled by the receive loop
            Event::Disconnected(_) => {}
        }
    }

    /// Hand a resolved call its answer.
    fn complete(&self, call: PendingCall<Completion>, answer: Answer) {
        match (call.callback, answer) {
            (Completion::Connectivity(tx), Answer::Connectivity(reachable)) => {
                let _ = tx.send(Ok(reachable));
            }
            (Completion::Login(callback), Answer::Login(outcome)) => {
                self.dispatcher.login_answered(callback, outcome)
            }
            (Completion::Directory(callback), Answer::Directory(snapshot)) => {
                self.dispatcher.directory_answered(callback, snapshot)
            }
            (Completion::Ping(callback), Answer::Ping(elapsed)) => {
                let target = match call.key {
                    CallKey::Ping(target) => target,
                    _ => String::new(),
                };
                self.dispatcher.ping_answered(callback, target, elapsed)
            }
            // Keys and completions are paired at registration; route never crosses them
            (_, answer) => {
                tracing::error!("Dropping {} answer for pending {}", answer.kind(), call.key);
            }
        }
    }

    /// Take the call a reply answers, if it is still waiting for one.
    ///
    /// A reply that lands after the call's deadline loses to the timeout
    /// even when the sweep has not run yet.
    fn take_reply(&self, key: &CallKey, token: RequestId) -> Option<PendingCall<Completion>> {
        let resolution = lock(&self.registry).resolve_token(key, token, Instant::now());
        match resolution? {
            Resolution::OnTime(call) => Some(call),
            Resolution::Overdue(call) => {
                tracing::warn!("Reply for {} arrived after its deadline", call.key);
                self.time_out(call);
                None
            }
        }
    }

    /// Expire every call whose deadline has passed.
    fn sweep(&self, now: Instant) {
        let overdue = lock(&self.registry).expired(now);
        for call in overdue {
            self.time_out(call);
        }
    }

    fn time_out(&self, call: PendingCall<Completion>) {
        tracing::warn!("{} timed out", call.key);
        if call.key == CallKey::Login {
            self.abandon_login();
        }
        self.dispatcher.fail(call, CallError::Timeout);
    }

    /// Synchronous half of teardown: state change, draining, task shutdown.
    fn shut_down(&self, event: LifecycleEvent, abort_receiver: bool) -> Teardown {
        let actions = match self.transition(event) {
            Ok((_, actions)) => actions,
            Err(e) => {
                tracing::debug!("Teardown skipped: {}", e);
                Vec::new()
            }
        };

        let mut teardown = Teardown::default();
        for action in actions {
            match action {
                Action::SendBye => teardown.send_bye = true,
                Action::DrainPending(cause) => self.drain(cause),
                Action::ReleaseTransport => {
                    self.stop_tasks(abort_receiver);
                    teardown.release_transport = true;
                }
                Action::AllocateResources | Action::SendLogin => {}
            }
        }
        teardown
    }

    fn drain(&self, cause: DrainCause) {
        let error = match cause {
            DrainCause::Terminated => CallError::SessionTerminated,
            DrainCause::Disconnected { reason } => CallError::Disconnected { reason },
        };

        let calls = lock(&self.registry).drain_all();
        if !calls.is_empty() {
            tracing::info!("Failing {} outstanding request(s): {}", calls.len(), error);
        }
        for call in calls {
            self.dispatcher.fail(call, error.clone());
        }
    }

    fn stop_tasks(&self, abort_receiver: bool) {
        let mut tasks = lock(&self.tasks);
        if let Some(sweeper) = tasks.sweeper.take() {
            sweeper.abort();
        }
        if let Some(receiver) = tasks.receiver.take() {
            if abort_receiver {
                receiver.abort();
            }
        }
    }

    /// Async half of teardown: goodbye, close, wait for callbacks.
    async fn finish_teardown(&self, teardown: Teardown) {
        if teardown.send_bye && self.transport.is_connected() {
            let bye = Request::Bye(Bye { reason: None });
            if let Err(e) = self.send(&bye).await {
                tracing::debug!("Goodbye not delivered: {}", e);
            }
        }
        if teardown.release_transport {
            if let Err(e) = self.transport.close().await {
                tracing::debug!("Transport close failed: {}", e);
            }
            tracing::info!("Session terminated");
        }
        self.dispatcher.flush().await;
    }

    /// The connection is gone; called from the receive loop.
    async fn connection_lost(&self, reason: String) {
        tracing::warn!("Connection lost: {}", reason);
        let teardown = self.shut_down(LifecycleEvent::ConnectionLost { reason }, false);
        self.finish_teardown(teardown).await;
    }
}

/// Successful answer for a pending call.
enum Answer {
    Connectivity(bool),
    Login(LoginOutcome),
    Directory(Arc<PresenceSnapshot>),
    Ping(std::time::Duration),
}

impl Answer {
    fn kind(&self) -> &'static str {
        match self {
            Answer::Connectivity(_) => "connectivity",
            Answer::Login(_) => "login",
            Answer::Directory(_) => "directory",
            Answer::Ping(_) => "ping",
        }
    }
}

/// Read frames until the connection ends or the session goes away.
async fn receive_loop<T: Transport + 'static>(transport: Arc<T>, session: Weak<SessionInner<T>>) {
    loop {
        let received = transport.recv().await;
        let Some(inner) = session.upgrade() else {
            return;
        };
        if inner.state().is_terminated() {
            return;
        }

        match received {
            Ok(bytes) => match Event::from_bytes(&bytes) {
                Ok(Event::Disconnected(disconnected)) => {
                    inner.connection_lost(disconnected.reason).await;
                    return;
                }
                Ok(event) => inner.route(event).await,
                Err(e) => {
                    tracing::warn!("Dropping malformed event ({} bytes): {}", bytes.len(), e);
                }
            },
            Err(e) => {
                inner.connection_lost(e.to_string()).await;
                return;
            }
        }
    }
}

/// Periodically expire overdue calls.
async fn sweep_loop<T: Transport + 'static>(session: Weak<SessionInner<T>>) {
    let period = match session.upgrade() {
        Some(inner) => inner.config.sweep_interval(),
        None => return,
    };
    tracing::debug!("Timeout sweep started (interval: {:?})", period);

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        timer.tick().await;
        let Some(inner) = session.upgrade() else {
            return;
        };
        inner.sweep(Instant::now());
    }
}
