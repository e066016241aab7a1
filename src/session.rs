//! Connection session state machine
//!
//! One session per accepted connection: registration handshake first,
//! then command dispatch until the client quits or the transport fails.
//! Protocol errors are answered with an `ERR` line and the session keeps
//! going; transport errors end it.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_util::codec::LinesCodecError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::ClientHandle;
use crate::error::AppError;
use crate::message::{Command, ServerMessage};
use crate::router::Router;
use crate::types::Nickname;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, welcome not yet sent
    Connected,
    /// Waiting for a valid, unique `NICK`
    AwaitingName,
    /// Registered, dispatching commands
    Active,
    /// Finished; no further lines are read
    Closed,
}

/// Server-side state of one client connection
///
/// `R` yields decoded lines; in production it is a `FramedRead` over the
/// socket's read half.
pub struct Session<R> {
    reader: R,
    outbox: ClientHandle,
    router: Router,
    nick: Option<Nickname>,
    state: SessionState,
    /// Cancelled on server shutdown or when the writer dies
    closed: CancellationToken,
    idle_timeout: Option<Duration>,
}

impl<R> Session<R>
where
    R: Stream<Item = Result<String, LinesCodecError>> + Unpin,
{
    pub fn new(
        reader: R,
        outbox: ClientHandle,
        router: Router,
        closed: CancellationToken,
        idle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            reader,
            outbox,
            router,
            nick: None,
            state: SessionState::Connected,
            closed,
            idle_timeout,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn nick(&self) -> Option<&Nickname> {
        self.nick.as_ref()
    }

    /// Drive the session until quit, end-of-stream or a fatal error
    ///
    /// Does not clean up; callers must follow with [`Session::close`].
    pub async fn run(&mut self, welcome: &str) -> Result<(), AppError> {
        self.outbox
            .send(ServerMessage::Welcome(welcome.to_string()))
            .await?;
        self.state = SessionState::AwaitingName;

        while self.state != SessionState::Closed {
            let Some(line) = self.next_line().await? else {
                debug!("Client {} reached end of stream", self.outbox.id());
                break;
            };

            let result = match self.state {
                SessionState::AwaitingName => self.handle_registration(&line).await,
                _ => self.handle_command(&line).await,
            };

            if let Err(err) = result {
                let Some(code) = err.code() else {
                    return Err(err);
                };
                debug!("Client {} protocol error: {}", self.outbox.id(), err);
                self.outbox.send(ServerMessage::Error(code)).await?;
            }
        }

        Ok(())
    }

    /// Release the identity and announce the departure
    ///
    /// Idempotent: only the first call unregisters and broadcasts. No
    /// departure is announced if the name already belongs to a newer
    /// connection.
    pub async fn close(&mut self) {
        self.state = SessionState::Closed;
        let Some(nick) = self.nick.take() else {
            return;
        };

        if !self.router.registry().release(nick.as_str(), self.outbox.id()) {
            debug!("{} was taken over before client {} closed", nick, self.outbox.id());
            return;
        }
        info!("User {} left ({})", nick, self.outbox.addr());
        self.router
            .broadcast_system(format!("User {nick} left"), &[])
            .await;
    }

    async fn next_line(&mut self) -> Result<Option<String>, AppError> {
        let reader = &mut self.reader;
        let idle_timeout = self.idle_timeout;
        let read = async move {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, reader.next())
                    .await
                    .map_err(|_| AppError::IdleTimeout),
                None => Ok(reader.next().await),
            }
        };

        tokio::select! {
            next = read => match next? {
                Some(line) => Ok(Some(line?)),
                None => Ok(None),
            },
            _ = self.closed.cancelled() => Ok(None),
        }
    }

    async fn handle_registration(&mut self, line: &str) -> Result<(), AppError> {
        let Ok(Command::Nick(candidate)) = Command::parse(line) else {
            return Err(AppError::IdentifyFirst);
        };

        let nick = Nickname::parse(&candidate)?;
        self.router
            .registry()
            .try_register(nick.clone(), self.outbox.clone())?;
        self.nick = Some(nick.clone());
        self.state = SessionState::Active;
        info!("Client {} registered as {}", self.outbox.id(), nick);

        self.outbox
            .send(ServerMessage::NickAccepted(nick.clone()))
            .await?;
        self.router
            .broadcast_system(format!("User {nick} joined"), &[&nick])
            .await;
        Ok(())
    }

    async fn handle_command(&mut self, line: &str) -> Result<(), AppError> {
        let Some(nick) = self.nick.clone() else {
            return Err(AppError::IdentifyFirst);
        };

        match Command::parse(line)? {
            Command::Empty => {}
            Command::Msg(text) => {
                self.router.broadcast_message(&nick, &text).await;
            }
            Command::Direct { to, text } => {
                self.router.direct_message(&nick, &to, &text).await?;
            }
            Command::Who => {
                let users = self.router.registry().list_all();
                self.outbox.send(ServerMessage::Users(users)).await?;
            }
            Command::Quit => {
                self.outbox.send(ServerMessage::Bye).await?;
                self.state = SessionState::Closed;
            }
            Command::Nick(_) | Command::Unknown(_) => return Err(AppError::UnknownCommand),
        }
        Ok(())
    }
}
