//! CLI module for Svar.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Svar - Live voice Q&A for narrated presentations
///
/// Serves live listening sessions where a listener can interrupt playback,
/// ask a question, and hear an answer grounded in the content's knowledge
/// base. The name "Svar" comes from the Norwegian word for "answer."
#[derive(Parser, Debug)]
#[command(name = "svar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Svar and verify configuration
    Init,

    /// Check API keys, directories, and configuration
    Doctor,

    /// List the voices available on the configured TTS providers
    Voices,

    /// Start the live listening server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}
