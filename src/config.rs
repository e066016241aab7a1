//! Command line and environment configuration
//!
//! `ServerConfig` for the `minichat` server, `ClientConfig` for the
//! terminal client. Both are clap parsers; every server option can also
//! be set through a `MINICHAT_*` environment variable.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use clap::{ArgAction, Parser};
use tokio::net::lookup_host;

use crate::codec::DEFAULT_MAX_LINE_LENGTH;
use crate::handler::SessionSettings;

/// Default port shared by server and client
pub const DEFAULT_PORT: u16 = 5000;

/// Mini chat TCP server
#[derive(Parser, Debug, Clone)]
#[command(name = "minichat", version, about = "Multi-user line protocol chat server")]
pub struct ServerConfig {
    /// Host or address to bind
    #[arg(long, env = "MINICHAT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "MINICHAT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Pending connection backlog
    #[arg(long, env = "MINICHAT_BACKLOG", default_value_t = 1024)]
    pub backlog: u32,

    /// Set SO_REUSEADDR on the listening socket
    #[arg(long, env = "MINICHAT_REUSE_ADDRESS", default_value_t = true, action = ArgAction::Set)]
    pub reuse_address: bool,

    /// Longest accepted line in bytes
    #[arg(long, env = "MINICHAT_MAX_LINE_LENGTH", default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    pub max_line_length: usize,

    /// Lines queued per connection before senders wait
    #[arg(long, env = "MINICHAT_OUTBOUND_BUFFER", default_value_t = 32)]
    pub outbound_buffer: usize,

    /// Milliseconds a delivery waits on a full queue before the recipient is dropped
    #[arg(long, env = "MINICHAT_SEND_TIMEOUT_MS", default_value_t = 2000)]
    pub send_timeout_ms: u64,

    /// Disconnect clients silent for this many seconds
    #[arg(long, env = "MINICHAT_IDLE_TIMEOUT_SECS")]
    pub idle_timeout_secs: Option<u64>,

    /// Greeting sent after `WELCOME`
    #[arg(long, env = "MINICHAT_WELCOME", default_value = "Choose a nickname with: NICK <name>")]
    pub welcome: String,
}

impl ServerConfig {
    /// Resolve `host:port` to the first matching socket address
    pub async fn resolve_addr(&self) -> io::Result<SocketAddr> {
        lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::AddrNotAvailable,
                    format!("no address for {}:{}", self.host, self.port),
                )
            })
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            welcome: self.welcome.clone(),
            max_line_length: self.max_line_length,
            outbound_buffer: self.outbound_buffer.max(1),
            idle_timeout: self.idle_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// Mini chat terminal client
#[derive(Parser, Debug, Clone)]
#[command(name = "minichat-client", version, about = "Terminal client for minichat")]
pub struct ClientConfig {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Nickname to register (prompted for when absent)
    #[arg(long)]
    pub nick: Option<String>,
}
