//! Mini Chat Client - Entry Point
//!
//! Thin terminal client: registers a nickname, prints every server
//! line and forwards stdin lines to the server.

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, FramedRead, LinesCodec};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use minichat::{ClientConfig, ErrorCode, LineCodec};

const HELP: &str = "Commands: MSG <text> | MSG @nick <text> | WHO | QUIT | HELP";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("minichat=warn")),
        )
        .init();

    let config = ClientConfig::parse();

    let stream = match TcpStream::connect((config.host.as_str(), config.port)).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!(
                "Could not connect to {}:{} ({}). Is the server running?",
                config.host, config.port, e
            );
            return Err(e.into());
        }
    };
    debug!("Connected to {}:{}", config.host, config.port);

    let (mut sink, mut lines) = Framed::new(stream, LineCodec::default()).split();
    let mut stdin = FramedRead::new(tokio::io::stdin(), LinesCodec::new());

    if let Some(welcome) = lines.next().await.transpose()? {
        println!("{welcome}");
    }

    // Registration
    let mut nick = config.nick.clone();
    loop {
        let candidate = match nick.take() {
            Some(candidate) => candidate,
            None => {
                println!("Choose your nickname (3-20 letters, digits, _ or -):");
                match stdin.next().await.transpose()? {
                    Some(line) => line.trim().to_string(),
                    None => return Ok(()),
                }
            }
        };
        if candidate.is_empty() {
            println!("Nickname cannot be empty");
            continue;
        }

        sink.send(format!("NICK {candidate}")).await?;
        let Some(reply) = lines.next().await.transpose()? else {
            println!("Connection closed by server");
            return Ok(());
        };
        println!("{reply}");

        if reply.starts_with("OK ") {
            break;
        }
        let retry = [ErrorCode::NicknameInUse, ErrorCode::InvalidNick]
            .iter()
            .any(|code| reply == format!("ERR {code}"));
        if !retry {
            return Err(format!("registration failed: {reply}").into());
        }
    }

    println!("{HELP}");

    let mut receiver = tokio::spawn(async move {
        while let Some(line) = lines.next().await {
            match line {
                Ok(line) if line.is_empty() => {}
                Ok(line) => println!("{line}"),
                Err(e) => {
                    warn!("Receive error: {}", e);
                    break;
                }
            }
        }
        println!("Connection closed by server");
    });

    loop {
        tokio::select! {
            _ = &mut receiver => return Ok(()),
            line = stdin.next() => {
                let line = match line.transpose()? {
                    Some(line) => line.trim().to_string(),
                    None => "QUIT".to_string(),
                };
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("HELP") {
                    println!("{HELP}");
                    continue;
                }

                let quit = line.to_ascii_uppercase().starts_with("QUIT");
                sink.send(line).await?;
                if quit {
                    break;
                }
            }
        }
    }

    // Wait for BYE and the server closing the connection.
    let _ = receiver.await;
    Ok(())
}
