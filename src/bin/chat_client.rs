use anyhow::{Context, Result};
use dotenv::dotenv;
use futures::{SinkExt, StreamExt};
use horizon_chat::identity::{FileStore, GuestNameGenerator, KeyValueStore, UsernameService};
use horizon_chat::Settings;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Say(String),
    Rename(String),
    Forget,
    Quit,
}

fn parse_command(line: &str) -> Command {
    let line = line.trim_end_matches(['\r', '\n']);
    match line.split_once(' ') {
        Some(("/name", name)) => Command::Rename(name.trim().to_string()),
        _ if line == "/forget" => Command::Forget,
        _ if line == "/quit" => Command::Quit,
        _ => Command::Say(line.to_string()),
    }
}

/// Cached username, or a fresh guest name that is persisted for next time.
async fn resolve_username<S: KeyValueStore>(identity: &UsernameService<S>) -> Result<String> {
    if let Some(name) = identity.get_username().await {
        return Ok(name);
    }

    let name = GuestNameGenerator::new().generate_unique_name();
    identity
        .set_username(&name)
        .await
        .context("storing generated guest name")?;
    Ok(name)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let settings = Settings::new().context("loading settings")?;
    let identity = UsernameService::new(FileStore::new(&settings.identity.storage_path));
    let mut username = resolve_username(&identity).await?;

    let url = Url::parse(&settings.websocket_url()).context("building websocket url")?;
    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("connecting to {}", url))?;
    let (mut write, mut read) = ws_stream.split();

    println!("Connected to {} as {}", url, username);
    println!("Commands: /name <new name>, /forget, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut closing = false;

    loop {
        tokio::select! {
            line = lines.next_line(), if !closing => {
                let command = match line? {
                    Some(line) => parse_command(&line),
                    None => Command::Quit,
                };

                match command {
                    Command::Say(text) => {
                        write.send(Message::Text(format!("{}: {}", username, text))).await?;
                    }
                    Command::Rename(name) => match identity.set_username(&name).await {
                        Ok(()) => {
                            username = name;
                            println!("Now chatting as {}", username);
                        }
                        Err(e) => println!("Could not rename: {}", e),
                    },
                    Command::Forget => {
                        identity.clear_username().await;
                        println!("Stored name cleared; a new guest name is picked next launch");
                    }
                    Command::Quit => {
                        closing = true;
                        write
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "bye".into(),
                            })))
                            .await?;
                    }
                }
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => println!("< {}", text),
                Some(Ok(Message::Close(frame))) => {
                    debug!("Server closed the connection: {:?}", frame);
                    println!("Disconnected");
                    break;
                }
                Some(Ok(other)) => debug!("Ignoring {:?}", other),
                Some(Err(e)) => {
                    warn!("Connection error: {}", e);
                    break;
                }
                None => break,
            },
        }
    }

    Ok(())
}
