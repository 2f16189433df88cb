use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "addrlist")]
#[command(about = "Builds a ranked address book from the envelopes in your mail folders")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Look up stored addresses matching every word of QUERY
    Find {
        /// Words to match against names, mailboxes and domains
        query: String,
    },
}
