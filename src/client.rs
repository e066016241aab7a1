//! Client handle definition
//!
//! A cheap, cloneable reference to one connection's outbound channel.
//! The registry stores these for routing; the owning session keeps its own.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ClientId;

/// Routing handle for a connected client
///
/// Dropping a handle never closes the connection, it only releases one
/// sender of the outbound channel. [`ClientHandle::disconnect`] is the only
/// way a handle ends the connection.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    addr: SocketAddr,
    /// Server → Client message channel, drained by the connection's writer
    sender: mpsc::Sender<ServerMessage>,
    /// Cancelling stops the connection's writer and session
    closed: CancellationToken,
}

impl ClientHandle {
    pub fn new(
        id: ClientId,
        addr: SocketAddr,
        sender: mpsc::Sender<ServerMessage>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id,
            addr,
            sender,
            closed,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queue a message for this client, waiting for queue space
    ///
    /// Used by the owning session for its own replies.
    /// Returns an error if the channel is closed (client disconnected).
    pub async fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Queue a message on behalf of another client
    ///
    /// Waits at most `limit` for queue space; a client that stays full
    /// that long is not reading and counts as gone.
    pub async fn deliver(&self, msg: ServerMessage, limit: Duration) -> Result<(), SendError> {
        self.sender
            .send_timeout(msg, limit)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => SendError::Timeout,
                SendTimeoutError::Closed(_) => SendError::ChannelClosed,
            })
    }

    /// Stop the connection's writer and unblock its session
    pub fn disconnect(&self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
pub(crate) fn test_handle_with_token() -> (
    ClientHandle,
    mpsc::Receiver<ServerMessage>,
    CancellationToken,
) {
    let (tx, rx) = mpsc::channel(32);
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let closed = CancellationToken::new();
    let handle = ClientHandle::new(ClientId::new(), addr, tx, closed.clone());
    (handle, rx, closed)
}

#[cfg(test)]
pub(crate) fn test_handle() -> (ClientHandle, mpsc::Receiver<ServerMessage>) {
    let (handle, rx, _) = test_handle_with_token();
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_send_delivers_in_order() {
        let (handle, mut rx) = test_handle();

        handle.send(ServerMessage::System("one".into())).await.unwrap();
        handle.deliver(ServerMessage::Bye, LIMIT).await.unwrap();

        assert_eq!(rx.recv().await, Some(ServerMessage::System("one".into())));
        assert_eq!(rx.recv().await, Some(ServerMessage::Bye));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (handle, rx) = test_handle();
        drop(rx);

        assert!(matches!(
            handle.send(ServerMessage::Bye).await,
            Err(SendError::ChannelClosed)
        ));
        assert!(matches!(
            handle.deliver(ServerMessage::Bye, LIMIT).await,
            Err(SendError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_deliver_times_out_on_full_queue() {
        let (handle, _rx) = test_handle();
        for _ in 0..32 {
            handle.deliver(ServerMessage::Bye, LIMIT).await.unwrap();
        }

        assert!(matches!(
            handle.deliver(ServerMessage::Bye, LIMIT).await,
            Err(SendError::Timeout)
        ));
    }

    #[test]
    fn test_disconnect_cancels_token() {
        let (handle, _rx, closed) = test_handle_with_token();
        assert!(!closed.is_cancelled());

        handle.clone().disconnect();

        assert!(closed.is_cancelled());
    }
}
