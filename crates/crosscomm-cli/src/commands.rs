//! Command handlers for the CrossComm CLI

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crosscomm_client::{ClientConfig, CrossCommClient, ListenerFilter, PeerList};
use crosscomm_core::{Content, Envelope, MessageKind};

use crate::cli::{Cli, Commands, SendKind};
use crate::error::{CliError, Result};
use crate::interactive::{InteractiveCommand, HELP};

/// Seconds the interactive mode waits for a peer list
const INTERACTIVE_PEERS_TIMEOUT: Duration = Duration::from_secs(5);

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against a freshly built client
    pub async fn execute(cli: Cli, config: ClientConfig) -> Result<()> {
        let client = CrossCommClient::new(config)?;
        info!("Client id: {}", client.client_id());

        match cli.command {
            Commands::Listen { downloads } => Self::handle_listen_command(client, &downloads).await,
            Commands::Send { kind, to, content } => {
                Self::handle_send_command(client, kind, to, content).await
            }
            Commands::Peers { all, timeout } => {
                Self::handle_peers_command(client, all, Duration::from_secs(timeout)).await
            }
            Commands::Interactive { downloads } => {
                Self::handle_interactive_command(client, &downloads).await
            }
        }
    }

    /// Print incoming messages until Ctrl+C
    async fn handle_listen_command(client: CrossCommClient, downloads: &Path) -> Result<()> {
        register_printers(&client, downloads).await;
        connect(&client).await?;
        println!("Listening as {}. Press Ctrl+C to exit.", client.client_id());

        tokio::signal::ctrl_c().await?;
        println!("\nStopping...");
        client.disconnect().await;
        Ok(())
    }

    /// Send one message and disconnect
    async fn handle_send_command(
        client: CrossCommClient,
        kind: SendKind,
        to: String,
        content: String,
    ) -> Result<()> {
        connect(&client).await?;

        let kind = MessageKind::from(kind);
        let content = match kind {
            MessageKind::Json => Content::JsonText(content),
            MessageKind::Text => Content::Text(content),
            _ => Content::Path(content.into()),
        };
        let result = client.try_send(content, kind, &to).await;
        client.disconnect().await;

        let envelope = result.map_err(|e| CliError::SendFailed(e.to_string()))?;
        println!("Sent {} message {} to {}", kind, envelope.id(), to);
        Ok(())
    }

    /// Query the relay's client list
    async fn handle_peers_command(
        client: CrossCommClient,
        all: bool,
        timeout: Duration,
    ) -> Result<()> {
        connect(&client).await?;
        let peers = client.list_peers(!all, timeout).await;
        client.disconnect().await;

        let peers = peers.ok_or(CliError::PeerListFailed)?;
        print_peers(&peers);
        Ok(())
    }

    /// Read line commands from stdin while printing incoming messages
    async fn handle_interactive_command(client: CrossCommClient, downloads: &Path) -> Result<()> {
        register_printers(&client, downloads).await;
        connect(&client).await?;
        println!("Connected as {}. Type 'help' for commands.", client.client_id());

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                break;
            };

            let command = match InteractiveCommand::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };

            match command {
                InteractiveCommand::Quit => break,
                InteractiveCommand::Empty => {}
                InteractiveCommand::Help => println!("{}", HELP),
                InteractiveCommand::Peers { all } => {
                    match client.list_peers(!all, INTERACTIVE_PEERS_TIMEOUT).await {
                        Some(peers) => print_peers(&peers),
                        None => println!("{}", CliError::PeerListFailed),
                    }
                }
                InteractiveCommand::Text { to, message } => {
                    report_send(client.send_text(message, &to).await, MessageKind::Text, &to);
                }
                InteractiveCommand::Json { to, document } => {
                    report_send(client.send_json_str(document, &to).await, MessageKind::Json, &to);
                }
                InteractiveCommand::Transfer { kind, to, path } => {
                    let sent = client.send(Content::Path(path), kind, &to).await;
                    report_send(sent, kind, &to);
                }
            }

            if !client.is_connected().await {
                warn!("Connection to relay lost");
                return Err(CliError::ConnectFailed(client.config().server_url()));
            }
        }

        client.disconnect().await;
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

async fn connect(client: &CrossCommClient) -> Result<()> {
    if client.connect().await {
        Ok(())
    } else {
        Err(CliError::ConnectFailed(client.config().server_url()))
    }
}

/// One listener per user-visible kind; transfers land under `downloads`
async fn register_printers(client: &CrossCommClient, downloads: &Path) {
    for kind in [
        MessageKind::Text,
        MessageKind::Json,
        MessageKind::Dict,
        MessageKind::Bytes,
    ] {
        client
            .add_listener(ListenerFilter::any().kind(kind), print_envelope)
            .await;
    }

    for (kind, dir) in [
        (MessageKind::File, "files"),
        (MessageKind::Image, "images"),
        (MessageKind::Folder, "folders"),
    ] {
        let filter = ListenerFilter::any()
            .kind(kind)
            .download_dir(downloads.join(dir));
        client.add_listener(filter, print_envelope).await;
    }
}

async fn print_envelope(envelope: Envelope) {
    println!("{}", describe(&envelope));
}

fn describe(envelope: &Envelope) -> String {
    let body = match envelope.decode_content() {
        Ok(Content::Text(text)) | Ok(Content::JsonText(text)) => text,
        Ok(Content::Json(value)) => value.to_string(),
        Ok(Content::Dict(map)) => serde_json::Value::Object(map).to_string(),
        Ok(Content::Bytes(bytes)) => format!("<{} bytes>", bytes.len()),
        Ok(Content::Path(path)) => path.display().to_string(),
        Err(_) => envelope.payload().to_string(),
    };
    format!(
        "[{}] {} -> {}: {}",
        envelope.kind(),
        envelope.from_client_id(),
        envelope.to_client_id(),
        body
    )
}

fn print_peers(peers: &PeerList) {
    println!("{} client(s):", peers.total_count());
    for peer in peers.clients() {
        match peer.online {
            Some(true) => println!("  {} (online)", peer.client_id),
            Some(false) => println!("  {} (offline)", peer.client_id),
            None => println!("  {}", peer.client_id),
        }
    }
}

fn report_send(sent: bool, kind: MessageKind, to: &str) {
    if sent {
        println!("Sent {} to {}", kind, to);
    } else {
        println!("Failed to send {} to {}", kind, to);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_inline_kinds() {
        let text = Envelope::new(
            &crosscomm_core::ClientId::new("desk"),
            "laptop",
            MessageKind::Text,
            "hello".to_string(),
        );
        assert_eq!(describe(&text), "[text] desk -> laptop: hello");

        let bytes = Envelope::new(
            &crosscomm_core::ClientId::new("desk"),
            "all",
            MessageKind::Bytes,
            crosscomm_core::encode(&Content::Bytes(vec![1, 2, 3]), MessageKind::Bytes).unwrap(),
        );
        assert_eq!(describe(&bytes), "[bytes] desk -> all: <3 bytes>");
    }
}
