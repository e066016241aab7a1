//! TCP connection handler
//!
//! Splits an accepted socket into a line reader driven by the session
//! and a writer task draining the connection's outbound channel, then
//! guarantees cleanup on every exit path.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::SinkExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClientHandle;
use crate::codec::LineCodec;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::router::Router;
use crate::session::Session;
use crate::types::ClientId;

/// Per-connection settings shared by every session
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Text following `WELCOME `
    pub welcome: String,
    /// Longest accepted line in bytes
    pub max_line_length: usize,
    /// Outbound lines queued per connection before senders wait
    pub outbound_buffer: usize,
    /// Close clients silent for this long
    pub idle_timeout: Option<Duration>,
}

/// Handle a new TCP connection
///
/// Runs the session to completion, then unregisters and announces the
/// departure, waits for queued lines to be flushed and closes the socket.
/// Cancelling `shutdown` stops the writer immediately and unblocks the reader.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: Router,
    settings: SessionSettings,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    let codec = LineCodec::new(settings.max_line_length);
    let (read_half, write_half) = stream.into_split();

    // Create channel for server -> client messages
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(settings.outbound_buffer);
    let closed = shutdown.child_token();

    let write_task = tokio::spawn(write_loop(
        client_id,
        FramedWrite::new(write_half, codec.clone()),
        msg_rx,
        closed.clone(),
    ));

    let outbox = ClientHandle::new(client_id, peer_addr, msg_tx, closed.clone());
    let mut session = Session::new(
        FramedRead::new(read_half, codec),
        outbox,
        router,
        closed,
        settings.idle_timeout,
    );

    let result = session.run(&settings.welcome).await;
    if let Err(e) = &result {
        debug!("Session {} ended with error: {}", client_id, e);
    }
    session.close().await;

    // Dropping the session drops the read half and our sender; the writer
    // finishes once the last routing handle is gone.
    drop(session);
    if let Err(e) = write_task.await {
        warn!("Write task for {} failed: {}", client_id, e);
    }

    info!("Client {} disconnected", client_id);
    result
}

/// Drain queued messages onto the socket
///
/// Ends when every sender is dropped, when `closed` is cancelled (shutdown
/// or the router giving up on this client), or on a write error. A write
/// stuck on a peer that stopped reading is abandoned on cancellation.
/// Cancels `closed` on exit so the session stops reading.
async fn write_loop(
    client_id: ClientId,
    mut sink: FramedWrite<OwnedWriteHalf, LineCodec>,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    closed: CancellationToken,
) {
    let drained = loop {
        let msg = tokio::select! {
            msg = msg_rx.recv() => msg,
            _ = closed.cancelled() => break false,
        };
        let Some(msg) = msg else {
            break true;
        };

        let sent = tokio::select! {
            sent = sink.send(msg.to_string()) => sent,
            _ = closed.cancelled() => break false,
        };
        if let Err(e) = sent {
            debug!("Write failed for {}: {}", client_id, e);
            break false;
        }
    };

    msg_rx.close();
    closed.cancel();
    if drained {
        if let Err(e) = SinkExt::<String>::close(&mut sink).await {
            debug!("Shutdown failed for {}: {}", client_id, e);
        }
    }
    debug!("Write task ended for {}", client_id);
}
