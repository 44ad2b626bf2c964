//! Command-line interface definitions and parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Record database path, overrides the configuration file
    #[arg(short, long, global = true)]
    pub records: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve service discovery requests
    Serve {
        /// Address to listen on
        #[arg(short, long)]
        listen: Option<String>,
        /// MTU assumed for every connection
        #[arg(long)]
        mtu: Option<u16>,
        /// Inactivity timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Include error descriptions in error responses
        #[arg(long)]
        error_text: bool,
    },
    /// Validate the configuration and record database, then exit
    Check,
    /// List the records of the database
    Records,
}
