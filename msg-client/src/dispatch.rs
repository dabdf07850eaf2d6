//! Callback dispatch boundary.
//!
//! Results are decided on the delivery path (receive loop, timeout sweep,
//! teardown) while holding no lock; the [`Dispatcher`] then decides where the
//! user callback actually runs. In [`DispatchMode::Spawned`] each callback
//! gets its own blocking-pool thread, so a callback that sleeps or blocks
//! cannot hold up other resolutions or the receive loop. In
//! [`DispatchMode::Inline`] callbacks run on the calling thread.
//!
//! A panicking callback is caught and logged in both modes.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use netmsg_core::{CallKey, PendingCall, PresenceSnapshot};
use netmsg_types::Chat;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::DispatchMode;
use crate::error::CallError;

/// Outcome of a login the server answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    /// Whether the nickname was accepted.
    pub accepted: bool,
    /// Server explanation, empty on plain success.
    pub message: String,
}

/// Login callback.
pub type LoginCallback = Box<dyn FnOnce(Result<LoginOutcome, CallError>) + Send + 'static>;

/// Directory refresh callback.
pub type DirectoryCallback =
    Box<dyn FnOnce(Result<Arc<PresenceSnapshot>, CallError>) + Send + 'static>;

/// Ping callback, receiving the target and the round-trip time.
pub type PingCallback = Box<dyn FnOnce(String, Result<Duration, CallError>) + Send + 'static>;

/// Handler for inbound chat messages. Called once per message.
pub type MessageHandler = Arc<dyn Fn(Chat) + Send + Sync + 'static>;

/// What a pending call resolves into.
pub(crate) enum Completion {
    /// A caller is awaiting the probe result directly.
    Connectivity(oneshot::Sender<Result<bool, CallError>>),
    Login(LoginCallback),
    Directory(DirectoryCallback),
    Ping(PingCallback),
}

/// Runs callbacks according to the configured [`DispatchMode`].
///
/// Until a runtime is attached every callback runs inline.
pub(crate) struct Dispatcher {
    mode: DispatchMode,
    runtime: OnceLock<Handle>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub(crate) fn new(mode: DispatchMode) -> Self {
        Self {
            mode,
            runtime: OnceLock::new(),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Attach the runtime spawned callbacks run on. Only the first call wins.
    pub(crate) fn attach(&self, runtime: Handle) {
        let _ = self.runtime.set(runtime);
    }

    /// Runtime the session was initialized on.
    pub(crate) fn runtime(&self) -> Option<&Handle> {
        self.runtime.get()
    }

    /// Run `callback` at the dispatch boundary.
    pub(crate) fn deliver<F>(&self, label: &'static str, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match (self.mode, self.runtime.get()) {
            (DispatchMode::Spawned, Some(runtime)) => {
                let handle = runtime.spawn_blocking(move || run_guarded(label, callback));
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                in_flight.retain(|h| !h.is_finished());
                in_flight.push(handle);
            }
            _ => run_guarded(label, callback),
        }
    }

    /// Wait for every callback spawned so far to finish.
    pub(crate) async fn flush(&self) {
        loop {
            let pending: Vec<_> = {
                let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                in_flight.drain(..).collect()
            };
            if pending.is_empty() {
                return;
            }
            for handle in pending {
                let _ = handle.await;
            }
        }
    }

    /// Hand a login reply to its callback.
    pub(crate) fn login_answered(&self, callback: LoginCallback, outcome: LoginOutcome) {
        self.deliver("login", move || callback(Ok(outcome)));
    }

    /// Hand the matching snapshot to a directory callback.
    pub(crate) fn directory_answered(
        &self,
        callback: DirectoryCallback,
        snapshot: Arc<PresenceSnapshot>,
    ) {
        self.deliver("directory", move || callback(Ok(snapshot)));
    }

    /// Hand a measured round trip to a ping callback.
    pub(crate) fn ping_answered(&self, callback: PingCallback, target: String, elapsed: Duration) {
        self.deliver("ping", move || callback(target, Ok(elapsed)));
    }

    /// Hand an inbound chat message to the application handler.
    pub(crate) fn chat_received(&self, handler: MessageHandler, chat: Chat) {
        self.deliver("message", move || handler(chat));
    }

    /// Resolve `call` with `error`.
    pub(crate) fn fail(&self, call: PendingCall<Completion>, error: CallError) {
        match call.callback {
            Completion::Connectivity(tx) => {
                // The waiting caller may have given up; nothing else to notify
                let _ = tx.send(Err(error));
            }
            Completion::Login(callback) => self.deliver("login", move || callback(Err(error))),
            Completion::Directory(callback) => {
                self.deliver("directory", move || callback(Err(error)))
            }
            Completion::Ping(callback) => {
                let target = match call.key {
                    CallKey::Ping(target) => target,
                    _ => String::new(),
                };
                self.deliver("ping", move || callback(target, Err(error)))
            }
        }
    }
}

fn run_guarded<F: FnOnce()>(label: &'static str, callback: F) {
    let started = Instant::now();
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        let reason = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::error!("{} callback panicked: {}", label, reason);
        return;
    }
    tracing::trace!("{} callback finished in {:?}", label, started.elapsed());
}
