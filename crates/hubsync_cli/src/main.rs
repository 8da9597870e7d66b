//! HubSync CLI
//!
//! Offline tools for working with change envelopes and snapshots.
//!
//! # Commands
//!
//! - `apply` - Apply a change envelope to a snapshot file
//! - `inspect` - Summarize a change envelope
//! - `route` - Resolve a feed path against subscription keys

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// HubSync command-line tools.
#[derive(Parser)]
#[command(name = "hubsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a change envelope to a snapshot file
    Apply {
        /// Snapshot file (JSON array of records)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Envelope file (JSON array of change sets)
        #[arg(short, long)]
        envelope: PathBuf,

        /// Feed key of the snapshot (defaults to the envelope's first feed)
        #[arg(long)]
        feed: Option<String>,

        /// Primary identifier field
        #[arg(long, default_value = "id")]
        primary_key: String,

        /// Alternate identifier field
        #[arg(long, default_value = "Id")]
        alternate_key: String,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Summarize a change envelope
    Inspect {
        /// Envelope file (JSON array of change sets)
        #[arg(short, long)]
        envelope: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Resolve a feed path against subscription keys
    Route {
        /// Feed path to resolve
        #[arg(short, long)]
        path: String,

        /// Subscription keys
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Apply {
            snapshot,
            envelope,
            feed,
            primary_key,
            alternate_key,
            format,
        } => {
            let options = commands::apply::ApplyOptions {
                snapshot: &snapshot,
                envelope: &envelope,
                feed: feed.as_deref(),
                primary_key: &primary_key,
                alternate_key: &alternate_key,
            };
            commands::apply::run(&options, &format)?;
        }
        Commands::Inspect { envelope, format } => {
            commands::inspect::run(&envelope, &format)?;
        }
        Commands::Route { path, keys } => {
            commands::route::run(&path, &keys)?;
        }
        Commands::Version => {
            println!("HubSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
