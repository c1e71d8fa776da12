//! Clap CLI definitions for Tether.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1;36mExamples:\x1b[0m
  tether start                  Run the bridge server (peers on /ws, MCP on /mcp)
  tether mcp                    Serve MCP over stdio with the bridge in the background
  tether status --json          Query a running bridge";

/// Tether: bridge between tool-calling clients and live editor peers.
#[derive(Parser)]
#[command(name = "tether", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/WebSocket bridge server until Ctrl+C.
    Start,
    /// Serve MCP over stdin/stdout; the peer server runs alongside.
    Mcp,
    /// Show the status of a running bridge.
    Status {
        /// Print the raw JSON response.
        #[arg(long)]
        json: bool,
    },
}
