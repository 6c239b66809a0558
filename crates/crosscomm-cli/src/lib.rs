//! CrossComm CLI library
//!
//! Argument parsing, configuration loading and the command handlers behind
//! the `crosscomm` binary.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod interactive;

pub use cli::{Cli, Commands, SendKind};
pub use commands::CommandDispatcher;
pub use config::load_configuration;
pub use error::{CliError, Result};
pub use interactive::InteractiveCommand;
