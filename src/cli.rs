use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mkvmux")]
#[command(author, version, about = "Matroska muxer back end driven by packet scripts")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mux the packets of a JSON packet script into Matroska files
    Mux {
        /// Packet script to mux
        #[arg(required = true)]
        script: PathBuf,

        /// Output file; numbered when splitting
        #[arg(short, long)]
        output: PathBuf,

        /// Print the mux report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
