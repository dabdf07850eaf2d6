//! Broadcast and direct messaging.
//!
//! Both are fire-and-forget: success means the transport accepted the frame,
//! not that anyone received it.

use netmsg_core::Operation;
use netmsg_types::{Request, Talk, To};

use crate::error::ClientError;
use crate::session::Session;
use crate::transport::Transport;

impl<T: Transport + 'static> Session<T> {
    /// Send `message` to every online user.
    pub async fn broadcast(&self, message: &str) -> Result<(), ClientError> {
        if message.is_empty() {
            return Err(ClientError::InvalidArgument("message is empty".into()));
        }
        self.inner.permit(Operation::Broadcast)?;

        self.inner
            .send(&Request::Talk(Talk {
                message: message.to_string(),
            }))
            .await
    }

    /// Send `message` to the user named `target`.
    ///
    /// `target` must appear in the current directory snapshot; otherwise
    /// this fails with [`ClientError::UnknownTarget`] without touching the
    /// transport. Refresh the directory first if it may be stale.
    pub async fn direct(&self, target: &str, message: &str) -> Result<(), ClientError> {
        if target.is_empty() {
            return Err(ClientError::InvalidArgument("target is empty".into()));
        }
        if message.is_empty() {
            return Err(ClientError::InvalidArgument("message is empty".into()));
        }
        self.inner.permit(Operation::Direct)?;

        if !self.inner.directory.current().contains_nickname(target) {
            tracing::debug!("Direct message to '{}' refused: not in directory", target);
            return Err(ClientError::UnknownTarget(target.to_string()));
        }

        self.inner
            .send(&Request::To(To {
                target: target.to_string(),
                message: message.to_string(),
            }))
            .await
    }
}
