//! Line commands accepted by the interactive mode

use std::path::PathBuf;

use crosscomm_core::MessageKind;

use crate::error::{CliError, Result};

pub const HELP: &str = "\
Commands:
  text <to> <message>     send a text message
  json <to> <document>    send a JSON document
  file <to> <path>        upload and send a file
  image <to> <path>       upload and send an image
  folder <to> <path>      upload and send a folder
  peers [all]             list online (or all) clients
  help                    show this help
  quit                    disconnect and exit";

/// One parsed stdin line
#[derive(Debug, Clone, PartialEq)]
pub enum InteractiveCommand {
    Text { to: String, message: String },
    Json { to: String, document: String },
    Transfer { kind: MessageKind, to: String, path: PathBuf },
    Peers { all: bool },
    Help,
    Quit,
    Empty,
}

impl InteractiveCommand {
    /// Parse a line of the form `<command> [<to> <rest...>]`
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Empty);
        }

        let (command, rest) = split_word(line);
        match command {
            "quit" | "exit" => Ok(Self::Quit),
            "help" => Ok(Self::Help),
            "peers" => Ok(Self::Peers { all: rest == "all" }),
            "text" => {
                let (to, message) = target_and_rest(command, rest)?;
                Ok(Self::Text { to, message })
            }
            "json" => {
                let (to, document) = target_and_rest(command, rest)?;
                Ok(Self::Json { to, document })
            }
            "file" | "image" | "folder" => {
                let (to, path) = target_and_rest(command, rest)?;
                let kind = match command {
                    "file" => MessageKind::File,
                    "image" => MessageKind::Image,
                    _ => MessageKind::Folder,
                };
                Ok(Self::Transfer {
                    kind,
                    to,
                    path: PathBuf::from(path),
                })
            }
            other => Err(CliError::InvalidCommand(format!(
                "unknown command '{}', type 'help'",
                other
            ))),
        }
    }
}

fn split_word(input: &str) -> (&str, &str) {
    match input.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim_start()),
        None => (input, ""),
    }
}

fn target_and_rest(command: &str, rest: &str) -> Result<(String, String)> {
    let (to, body) = split_word(rest);
    if to.is_empty() || body.is_empty() {
        return Err(CliError::InvalidCommand(format!(
            "usage: {} <to> <content>",
            command
        )));
    }
    Ok((to.to_string(), body.to_string()))
}
