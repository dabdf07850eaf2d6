//! Latency prober.
//!
//! A ping is keyed by its target, so at most one probe per target is in
//! flight. The request id sent with it is echoed in the reply; a reply with
//! an older id belongs to a probe that already finished and is ignored.

use std::time::Duration;

use netmsg_core::{CallKey, Operation};
use netmsg_types::{Ping, Request};

use crate::dispatch::{Completion, PingCallback};
use crate::error::{CallError, ClientError};
use crate::session::Session;
use crate::transport::Transport;

impl<T: Transport + 'static> Session<T> {
    /// Measure the round trip to `target`.
    ///
    /// `callback` receives the target and either the elapsed time or a
    /// [`CallError`]; a probe that gets no reply within `timeout` (the
    /// configured ping timeout when `None`) reports [`CallError::Timeout`].
    pub async fn ping<F>(
        &self,
        target: &str,
        timeout: Option<Duration>,
        callback: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(String, Result<Duration, CallError>) + Send + 'static,
    {
        if target.is_empty() {
            return Err(ClientError::InvalidArgument("ping target is empty".into()));
        }
        let timeout = match timeout {
            Some(timeout) if timeout.is_zero() => {
                return Err(ClientError::InvalidArgument("ping timeout is zero".into()));
            }
            Some(timeout) => timeout,
            None => self.inner.config.ping_timeout(),
        };
        self.inner.permit(Operation::Ping)?;

        let callback: PingCallback = Box::new(callback);
        let token = self.inner.next_request_id();
        let handle = self.inner.register(
            CallKey::Ping(target.to_string()),
            token,
            timeout,
            Completion::Ping(callback),
            "ping",
        )?;

        let request = Request::Ping(Ping {
            target: target.to_string(),
            token,
        });
        if let Err(e) = self.inner.send(&request).await {
            if self.inner.withdraw(&handle) {
                return Err(e);
            }
        }

        tracing::debug!("Ping to {} sent (token {})", target, token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use netmsg_core::SessionState;
    use netmsg_types::{Event, PingReply};
    use tokio::sync::mpsc;

    type Outcome = (String, Result<Duration, CallError>);

    fn reporter() -> (impl Fn() -> PingCallback, mpsc::UnboundedReceiver<Outcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let make = move || {
            let tx = tx.clone();
            Box::new(move |target: String, result: Result<Duration, CallError>| {
                let _ = tx.send((target, result));
            }) as PingCallback
        };
        (make, rx)
    }

    fn reply(transport: &crate::MockTransport, target: &str) {
        let token = last_ping_token(transport, target);
        transport.push_event(&Event::PingReply(PingReply {
            target: target.into(),
            token,
        }));
    }

    #[tokio::test]
    async fn reply_resolves_with_elapsed() {
        let transport = server(roster());
        let session = authenticated(transport.clone()).await;
        let (callback, mut rx) = reporter();

        session.ping("carol", None, callback()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        reply(&transport, "carol");

        let (target, result) = next(&mut rx).await;
        assert_eq!(target, "carol");
        assert!(result.unwrap() >= Duration::from_millis(20));
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn distinct_targets_resolve_independently() {
        let transport = server(roster());
        let session = authenticated(transport.clone()).await;
        let (callback, mut rx) = reporter();

        session.ping("carol", None, callback()).await.unwrap();
        session.ping("erin", None, callback()).await.unwrap();
        assert_eq!(session.pending_calls(), 2);

        reply(&transport, "erin");
        let (target, result) = next(&mut rx).await;
        assert_eq!(target, "erin");
        assert!(result.is_ok());
        assert_eq!(session.pending_calls(), 1);

        reply(&transport, "carol");
        let (target, result) = next(&mut rx).await;
        assert_eq!(target, "carol");
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn second_ping_to_same_target_is_refused() {
        let transport = server(roster());
        let session = authenticated(transport.clone()).await;
        let (callback, mut rx) = reporter();

        session.ping("carol", None, callback()).await.unwrap();
        let result = session.ping("carol", None, callback()).await;

        assert!(matches!(
            result,
            Err(ClientError::PingInProgress { ref target }) if target == "carol"
        ));
        reply(&transport, "carol");
        assert!(next(&mut rx).await.1.is_ok());
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn same_target_can_be_pinged_again_after_reply() {
        let transport = server(roster());
        let session = authenticated(transport.clone()).await;
        let (callback, mut rx) = reporter();

        session.ping("carol", None, callback()).await.unwrap();
        reply(&transport, "carol");
        assert!(next(&mut rx).await.1.is_ok());

        session.ping("carol", None, callback()).await.unwrap();
        reply(&transport, "carol");
        assert!(next(&mut rx).await.1.is_ok());
    }

    // ===========================================
    // Timeouts
    // ===========================================

    #[tokio::test]
    async fn unanswered_ping_times_out_once() {
        let transport = server(roster());
        let session = authenticated(transport.clone()).await;
        let (callback, mut rx) = reporter();

        session
            .ping("carol", Some(Duration::from_millis(100)), callback())
            .await
            .unwrap();

        let (target, result) = next(&mut rx).await;
        assert_eq!(target, "carol");
        assert_eq!(result, Err(CallError::Timeout));

        // A reply after the deadline changes nothing
        reply(&transport, "carol");
        assert_silent(&mut rx).await;
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn reply_after_deadline_loses_before_sweep_runs() {
        // The sweep ticks once at start and not again for a second
        let config = fast_config().with_sweep_interval(Duration::from_secs(1));
        let transport = server(roster());
        let session = authenticated_with(config, transport.clone()).await;
        let (callback, mut rx) = reporter();

        session
            .ping("carol", Some(Duration::from_millis(100)), callback())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(session.pending_calls(), 1);

        reply(&transport, "carol");
        let (target, result) = next(&mut rx).await;
        assert_eq!(target, "carol");
        assert_eq!(result, Err(CallError::Timeout));
        assert_eq!(session.pending_calls(), 0);
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn stale_token_is_ignored() {
        let transport = server(roster());
        let session = authenticated(transport.clone()).await;
        let (callback, mut rx) = reporter();

        session
            .ping("carol", Some(Duration::from_millis(50)), callback())
            .await
            .unwrap();
        let stale = last_ping_token(&transport, "carol");
        assert_eq!(next(&mut rx).await.1, Err(CallError::Timeout));

        session.ping("carol", None, callback()).await.unwrap();
        transport.push_event(&Event::PingReply(PingReply {
            target: "carol".into(),
            token: stale,
        }));
        assert_silent(&mut rx).await;
        assert_eq!(session.pending_calls(), 1);

        reply(&transport, "carol");
        assert!(next(&mut rx).await.1.is_ok());
    }

    // ===========================================
    // Refusals
    // ===========================================

    #[tokio::test]
    async fn ping_before_login_is_invalid_state() {
        let transport = server(roster());
        let session = initialized(transport.clone());
        let (callback, _rx) = reporter();

        let result = session.ping("carol", None, callback()).await;

        assert!(matches!(
            result,
            Err(ClientError::InvalidState {
                state: SessionState::Initialized,
                ..
            })
        ));
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn bad_arguments_are_rejected() {
        let session = authenticated(server(roster())).await;
        let (callback, _rx) = reporter();

        assert!(matches!(
            session.ping("", None, callback()).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            session.ping("carol", Some(Duration::ZERO), callback()).await,
            Err(ClientError::InvalidArgument(_))
        ));
        assert_eq!(session.pending_calls(), 0);
    }

    #[tokio::test]
    async fn send_failure_withdraws_the_probe() {
        let transport = server(roster());
        let session = authenticated(transport.clone()).await;
        let (callback, mut rx) = reporter();

        transport.fail_next_send("broken pipe");
        let result = session.ping("carol", None, callback()).await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        assert_eq!(session.pending_calls(), 0);
        assert_silent(&mut rx).await;

        // Nothing is left behind to block the next probe
        session.ping("carol", None, callback()).await.unwrap();
    }

    #[tokio::test]
    async fn terminate_fails_outstanding_ping() {
        let session = authenticated(server(roster())).await;
        let (callback, mut rx) = reporter();

        session.ping("carol", None, callback()).await.unwrap();
        session.terminate().await;

        let (target, result) = rx.try_recv().unwrap();
        assert_eq!(target, "carol");
        assert_eq!(result, Err(CallError::SessionTerminated));
    }
}
