//! Multi-user Line Chat Server Library
//!
//! A TCP chat service speaking a newline-delimited text protocol.
//! Clients register a unique nickname, then exchange broadcast and
//! direct messages.
//!
//! # Features
//! - Nickname registration with uniqueness enforcement
//! - Broadcast messages (echoed back to the sender)
//! - Direct messages with send confirmation
//! - Presence listing
//! - Join/leave notices
//! - Graceful shutdown of every live connection
//!
//! # Architecture
//! - `ChatServer` accepts connections and supervises one task per client
//! - Each connection runs a `Session` reading lines, plus a writer task
//!   draining an `mpsc` channel, so writes to a socket never interleave
//! - `Registry` is the only shared state: a mutex-guarded
//!   nickname → `ClientHandle` map with a narrow insert/remove/lookup/list API
//! - `Router` resolves recipients under the registry lock and sends after
//!   releasing it
//!
//! # Example
//! ```ignore
//! use clap::Parser;
//! use minichat::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::parse();
//!     let server = ChatServer::bind(&config).await?;
//!
//!     let shutdown = server.shutdown_token();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.cancel();
//!     });
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use client::ClientHandle;
pub use codec::LineCodec;
pub use config::{ClientConfig, ServerConfig};
pub use error::{AppError, SendError};
pub use handler::{handle_connection, SessionSettings};
pub use message::{Command, ErrorCode, ServerMessage};
pub use registry::Registry;
pub use router::Router;
pub use server::ChatServer;
pub use session::{Session, SessionState};
pub use types::{ClientId, Nickname};
