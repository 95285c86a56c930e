//! CLI interface for Tannoy
//!
//! This module provides the command-line interface using clap's derive API.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tannoy announcement bot
///
/// Delivers recurring announcements into Telegram forum topics, configured
/// through an in-chat button menu.
#[derive(Parser, Debug)]
#[command(name = "tannoy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bot in the foreground
    Run,

    /// Print a summary of the persisted announcements
    Status,

    /// Print the configuration file path
    ConfigPath,
}
