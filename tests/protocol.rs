//! End-to-end protocol tests against a real server on a loopback port.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;

use minichat::{AppError, ChatServer, ServerConfig};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);
const SILENCE: Duration = Duration::from_millis(200);

struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), AppError>>,
}

async fn start_server() -> TestServer {
    start_server_with(|_| {}).await
}

async fn start_server_with(configure: impl FnOnce(&mut ServerConfig)) -> TestServer {
    let mut config = ServerConfig::parse_from(["minichat"]);
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    configure(&mut config);

    let server = ChatServer::bind(&config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let shutdown = server.shutdown_token();
    let task = tokio::spawn(server.run());

    TestServer {
        addr,
        shutdown,
        task,
    }
}

struct TestClient {
    framed: Framed<TcpStream, LinesCodec>,
}

impl TestClient {
    /// Connect and consume the WELCOME line
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut client = Self {
            framed: Framed::new(stream, LinesCodec::new()),
        };
        let welcome = client.recv().await;
        assert!(welcome.starts_with("WELCOME "), "unexpected greeting: {welcome}");
        client
    }

    /// Connect and register `nick`
    async fn register(addr: SocketAddr, nick: &str) -> Self {
        let mut client = Self::connect(addr).await;
        client.send(&format!("NICK {nick}")).await;
        assert_eq!(client.recv().await, format!("OK nick {nick}"));
        client
    }

    async fn send(&mut self, line: &str) {
        self.framed.send(line).await.unwrap();
    }

    async fn recv(&mut self) -> String {
        timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for a line")
            .expect("connection closed")
            .unwrap()
    }

    async fn expect(&mut self, line: &str) {
        assert_eq!(self.recv().await, line);
    }

    /// Assert nothing arrives within a short window
    async fn expect_silence(&mut self) {
        if let Ok(next) = timeout(SILENCE, self.framed.next()).await {
            panic!("expected silence, got {next:?}");
        }
    }

    /// Wait for the server to close the connection
    async fn expect_closed(&mut self) {
        let next = timeout(RECV_TIMEOUT, self.framed.next())
            .await
            .expect("timed out waiting for close");
        assert!(next.is_none(), "expected close, got {next:?}");
    }
}

/// Connect alice, bob and carol, consuming the join notices
async fn three_users(addr: SocketAddr) -> (TestClient, TestClient, TestClient) {
    let mut alice = TestClient::register(addr, "alice").await;
    let mut bob = TestClient::register(addr, "bob").await;
    alice.expect("SYSTEM: User bob joined").await;
    let carol = TestClient::register(addr, "carol").await;
    alice.expect("SYSTEM: User carol joined").await;
    bob.expect("SYSTEM: User carol joined").await;
    (alice, bob, carol)
}

#[tokio::test]
async fn test_registration_errors() {
    let server = start_server().await;
    let _bob = TestClient::register(server.addr, "bob").await;
    let mut client = TestClient::connect(server.addr).await;

    client.send("MSG hello").await;
    client.expect("ERR identify_with_NICK_first").await;
    client.send("NICK ab").await;
    client.expect("ERR invalid_nick").await;
    client.send("NICK bad name!").await;
    client.expect("ERR invalid_nick").await;
    client.send("NICK bob").await;
    client.expect("ERR nickname_in_use").await;
    client.send("nick alice").await;
    client.expect("OK nick alice").await;
}

#[tokio::test]
async fn test_concurrent_registration_single_winner() {
    let server = start_server().await;
    let mut first = TestClient::connect(server.addr).await;
    let mut second = TestClient::connect(server.addr).await;

    tokio::join!(first.send("NICK alice"), second.send("NICK alice"));
    let (reply_a, reply_b) = tokio::join!(first.recv(), second.recv());

    let mut replies = vec![reply_a, reply_b];
    replies.sort();
    assert_eq!(replies, vec!["ERR nickname_in_use", "OK nick alice"]);
}

#[tokio::test]
async fn test_broadcast_round_trip() {
    let server = start_server().await;
    let (mut alice, mut bob, mut carol) = three_users(server.addr).await;

    alice.send("MSG hello").await;

    alice.expect("FROM alice [all]: hello").await;
    bob.expect("FROM alice [all]: hello").await;
    carol.expect("FROM alice [all]: hello").await;
    alice.expect_silence().await;
    bob.expect_silence().await;
    carol.expect_silence().await;
}

#[tokio::test]
async fn test_direct_message() {
    let server = start_server().await;
    let (mut alice, mut bob, mut carol) = three_users(server.addr).await;

    alice.send("MSG @bob hi").await;

    bob.expect("FROM alice [dm]: hi").await;
    alice.expect("TO @bob [dm]: hi").await;
    carol.expect_silence().await;
    bob.expect_silence().await;
}

#[tokio::test]
async fn test_direct_message_errors() {
    let server = start_server().await;
    let (mut alice, mut bob, _carol) = three_users(server.addr).await;

    alice.send("MSG @ghost hi").await;
    alice.expect("ERR user_not_found").await;
    alice.send("MSG @bob").await;
    alice.expect("ERR invalid_dm_format").await;
    bob.expect_silence().await;
}

#[tokio::test]
async fn test_presence_sorted() {
    let server = start_server().await;
    let mut carol = TestClient::register(server.addr, "carol").await;
    let mut alice = TestClient::register(server.addr, "alice").await;
    carol.expect("SYSTEM: User alice joined").await;
    let mut bob = TestClient::register(server.addr, "bob").await;
    carol.expect("SYSTEM: User bob joined").await;
    alice.expect("SYSTEM: User bob joined").await;

    for client in [&mut alice, &mut bob, &mut carol] {
        client.send("WHO").await;
        client.expect("USERS alice, bob, carol").await;
    }
}

#[tokio::test]
async fn test_stalled_reader_does_not_block_others() {
    let server = start_server_with(|config| {
        config.outbound_buffer = 4;
        config.send_timeout_ms = 200;
    })
    .await;
    let alice = TestClient::register(server.addr, "alice").await;
    let mut bob = TestClient::register(server.addr, "bob").await;
    bob.send("WHO").await;
    bob.expect("USERS alice, bob").await;
    // bob stays connected but never reads again
    let _bob = bob;

    let (mut sink, mut stream) = alice.framed.split();
    let reader = tokio::spawn(async move {
        while let Some(line) = stream.next().await {
            let line = line.unwrap();
            if line.starts_with("USERS ") {
                return line;
            }
        }
        panic!("connection closed before the user list arrived");
    });

    let text = "x".repeat(4000);
    let writer = async {
        for _ in 0..6000 {
            sink.send(format!("MSG {text}")).await.unwrap();
        }
        sink.send("WHO".to_string()).await.unwrap();
    };

    let users = timeout(Duration::from_secs(20), async {
        writer.await;
        reader.await.unwrap()
    })
    .await
    .expect("traffic stalled behind a client that stopped reading");
    assert_eq!(users, "USERS alice");
}

#[tokio::test]
async fn test_unknown_command() {
    let server = start_server().await;
    let mut alice = TestClient::register(server.addr, "alice").await;

    alice.send("DANCE").await;
    alice.expect("ERR unknown_command").await;
    alice.send("").await;
    alice.send("who").await;
    alice.expect("USERS alice").await;
}

#[tokio::test]
async fn test_quit_cleanup() {
    let server = start_server().await;
    let (mut alice, mut bob, mut carol) = three_users(server.addr).await;

    alice.send("QUIT").await;
    alice.expect("BYE").await;
    alice.expect_closed().await;

    bob.expect("SYSTEM: User alice left").await;
    carol.expect("SYSTEM: User alice left").await;

    bob.send("WHO").await;
    bob.expect("USERS bob, carol").await;
    carol.expect_silence().await;
}

#[tokio::test]
async fn test_dropped_connection_cleanup() {
    let server = start_server().await;
    let (alice, mut bob, mut carol) = three_users(server.addr).await;

    drop(alice);

    bob.expect("SYSTEM: User alice left").await;
    carol.expect("SYSTEM: User alice left").await;
    carol.send("WHO").await;
    carol.expect("USERS bob, carol").await;
    bob.expect_silence().await;
}

#[tokio::test]
async fn test_nickname_reusable_after_quit() {
    let server = start_server().await;
    let mut alice = TestClient::register(server.addr, "alice").await;
    alice.send("QUIT").await;
    alice.expect("BYE").await;
    alice.expect_closed().await;

    let mut again = TestClient::register(server.addr, "alice").await;
    again.send("WHO").await;
    again.expect("USERS alice").await;
}

#[tokio::test]
async fn test_invalid_utf8_closes_session() {
    let server = start_server().await;
    let mut bob = TestClient::register(server.addr, "bob").await;

    let mut raw = TcpStream::connect(server.addr).await.unwrap();
    let mut greeting = [0u8; 256];
    let n = raw.read(&mut greeting).await.unwrap();
    assert!(greeting[..n].starts_with(b"WELCOME "));

    raw.write_all(b"NICK alice\n").await.unwrap();
    bob.expect("SYSTEM: User alice joined").await;

    raw.write_all(b"MSG \xff\xfe\n").await.unwrap();
    bob.expect("SYSTEM: User alice left").await;

    bob.send("WHO").await;
    bob.expect("USERS bob").await;
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let server = start_server().await;
    let mut alice = TestClient::register(server.addr, "alice").await;
    let mut waiting = TestClient::connect(server.addr).await;

    server.shutdown.cancel();

    alice.expect_closed().await;
    waiting.expect_closed().await;
    timeout(RECV_TIMEOUT, server.task)
        .await
        .expect("server did not stop")
        .unwrap()
        .unwrap();

    assert!(TcpStream::connect(server.addr).await.is_err());
}
