//! CLI argument parsing for RMap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "rmap",
    about = "Administer an event-sourced RMap store",
    version = env!("CARGO_PKG_VERSION"),
    after_help = "Logs are written to: ~/.local/share/rmap/logs/rmap.log"
)]
pub struct Cli {
    /// Path to the directory holding .rmap (default: current directory)
    #[arg(short = 'd', long, global = true)]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Initialize a new store in the current directory
    Init,

    /// Register an Agent that creates itself
    CreateAgent {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// Identity provider IRI
        #[arg(long)]
        idp: String,

        /// User id at the identity provider
        #[arg(long)]
        auth_id: String,

        /// Agent id (minted when omitted)
        #[arg(long)]
        id: Option<String>,
    },

    /// Show the status of a DiSCO or Agent
    Status {
        id: String,
    },

    /// Print a DiSCO, Agent or Event
    Show {
        id: String,
    },

    /// List the versions in a DiSCO's lineage
    Versions {
        id: String,

        /// Include DiSCOs derived by other Agents
        #[arg(long)]
        derivatives: bool,
    },

    /// List Events related to a DiSCO or Agent
    Events {
        id: String,
    },

    /// Check a lineage walk against the progenitor index
    Verify {
        id: String,
    },

    /// Tombstone a DiSCO
    Tombstone {
        id: String,

        /// Requesting Agent
        #[arg(short, long)]
        agent: String,
    },

    /// Delete a DiSCO's statements
    Delete {
        id: String,

        /// Requesting Agent
        #[arg(short, long)]
        agent: String,
    },
}
