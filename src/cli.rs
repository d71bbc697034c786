//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// quorum - multi-model consensus runner
#[derive(Parser)]
#[command(
    name = "quorum",
    about = "Ask several LLM workers in parallel and pick one answer by consensus",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a prompt through all configured workers
    Run {
        /// The prompt to answer
        prompt: String,

        /// Print the full result as JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// IDE integration
    Ide {
        #[command(subcommand)]
        command: IdeCommand,
    },
}

/// IDE subcommands
#[derive(Debug, Subcommand)]
pub enum IdeCommand {
    /// Start the IDE integration server
    Connect,

    /// Show IDE integration status
    Status,
}
