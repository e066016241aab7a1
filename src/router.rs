//! Message router
//!
//! Broadcast and point-to-point delivery on top of the registry.
//! Recipients are resolved under the registry lock; the sends happen
//! after it is released, so one slow peer never stalls the lock.
//! Each delivery waits at most the send timeout for queue space. A closed
//! or still-full queue means the peer is gone: its entry is dropped and its
//! connection shut down.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::client::ClientHandle;
use crate::error::{AppError, SendError};
use crate::message::ServerMessage;
use crate::registry::Registry;
use crate::types::Nickname;

/// Routes server messages to registered identities
#[derive(Debug, Clone)]
pub struct Router {
    registry: Arc<Registry>,
    send_timeout: Duration,
}

/// Default wait for queue space before a recipient counts as gone
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

impl Router {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Deliver `msg` to every identity not in `exclude`
    ///
    /// Returns the number of successful deliveries.
    pub async fn broadcast(&self, msg: ServerMessage, exclude: &[&Nickname]) -> usize {
        let recipients = self.registry.recipients(exclude);
        let mut delivered = 0;

        for (nick, handle) in recipients {
            match handle.deliver(msg.clone(), self.send_timeout).await {
                Ok(()) => delivered += 1,
                Err(e) => self.drop_client(&nick, &handle, e),
            }
        }

        debug!("Broadcast delivered to {} client(s)", delivered);
        delivered
    }

    /// Send a `SYSTEM:` notice
    pub async fn broadcast_system(&self, text: impl Into<String>, exclude: &[&Nickname]) -> usize {
        self.broadcast(ServerMessage::System(text.into()), exclude)
            .await
    }

    /// Broadcast a chat line from `from` to everyone, the sender's echo included
    pub async fn broadcast_message(&self, from: &Nickname, text: &str) -> usize {
        let msg = ServerMessage::Broadcast {
            from: from.clone(),
            text: text.to_string(),
        };
        self.broadcast(msg, &[]).await
    }

    /// Deliver a direct message and confirm it to the sender
    ///
    /// The destination gets `FROM <from> [dm]`, the sender gets `TO @<to> [dm]`.
    pub async fn direct_message(&self, from: &Nickname, to: &str, text: &str) -> Result<(), AppError> {
        let (sender, target) = self.registry.lookup_pair(from.as_str(), to);

        let Some(sender) = sender else {
            return Err(AppError::NotRegistered(from.to_string()));
        };
        let Some(target) = target else {
            return Err(AppError::UserNotFound(to.to_string()));
        };

        // `to` resolved, so it is a registered (valid) name.
        let dest = Nickname::parse(to)?;

        let delivery = ServerMessage::DirectFrom {
            from: from.clone(),
            text: text.to_string(),
        };
        if let Err(e) = target.deliver(delivery, self.send_timeout).await {
            self.drop_client(&dest, &target, e);
            return Err(AppError::UserNotFound(dest.to_string()));
        }

        let confirmation = ServerMessage::DirectTo {
            to: dest,
            text: text.to_string(),
        };
        sender.send(confirmation).await?;
        Ok(())
    }

    /// Treat a failed delivery as a disconnect of that client
    fn drop_client(&self, nick: &Nickname, handle: &ClientHandle, err: SendError) {
        warn!("Dropping client {} ({}): {}", nick, handle.addr(), err);
        self.registry.unregister(nick.as_str(), handle.id());
        handle.disconnect();
    }
}
