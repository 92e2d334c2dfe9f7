//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Backend;

#[derive(Parser)]
#[command(name = "deadlock-server-picker")]
#[command(author, version)]
#[command(about = "Block or unblock Deadlock game-server relays via the host firewall")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Simulate firewall operations without making changes
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Don't prefix firewall commands with sudo
    #[arg(long, global = true)]
    pub no_sudo: bool,

    /// Firewall backend override (auto, iptables, nftables)
    #[arg(long, global = true, value_name = "BACKEND")]
    pub backend: Option<Backend>,

    /// Use the clustered server view
    #[arg(short, long, global = true)]
    pub clustered: bool,

    /// Custom configuration directory
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List available servers
    List {
        /// Ping servers to show latency
        #[arg(long, short)]
        ping: bool,

        /// Only show blocked servers
        #[arg(long, short)]
        blocked: bool,
    },

    /// Block specified servers
    Block {
        /// Server names or codes to block
        #[arg(required = true)]
        servers: Vec<String>,
    },

    /// Unblock specified servers
    Unblock {
        /// Server names or codes to unblock
        servers: Vec<String>,

        /// Unblock all servers
        #[arg(long, short)]
        all: bool,
    },

    /// Block all servers
    BlockAll,

    /// Block all servers except the specified ones
    BlockExcept {
        /// Servers to keep unblocked
        #[arg(required = true)]
        servers: Vec<String>,
    },

    /// Ping servers to measure latency
    Ping {
        /// Specific servers to ping (all if omitted)
        servers: Vec<String>,
    },

    /// Manage presets
    Preset {
        #[command(subcommand)]
        action: PresetAction,
    },

    /// Show current status
    Status,

    /// Flush all firewall rules (the container is kept)
    Reset,

    /// Apply config preferences (for the system service)
    Apply,

    /// List available region presets
    Regions,

    /// List servers in a region
    ListRegion {
        /// Region name or alias (e.g. na, eu, asia)
        region: String,

        /// Ping servers to show latency
        #[arg(long, short)]
        ping: bool,
    },

    /// Allow only the specified region (block all others)
    AllowRegion {
        /// Region name or alias
        region: String,
    },

    /// Block all servers in a region
    BlockRegion {
        /// Region name or alias
        region: String,
    },

    /// Unblock all servers in a region
    UnblockRegion {
        /// Region name or alias
        region: String,
    },

    /// Launch the interactive session (rules are cleaned up on exit)
    Interactive,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version
    Version,
}

#[derive(Subcommand)]
pub enum PresetAction {
    /// List saved presets
    List,
    /// Create (or replace) a preset
    Create {
        /// Preset name
        name: String,
        /// Servers to include
        #[arg(required = true)]
        servers: Vec<String>,
    },
    /// Delete a preset
    Delete {
        /// Preset name
        name: String,
    },
    /// Apply a preset (unblock its servers)
    Apply {
        /// Preset name
        name: String,
        /// Also block every server not in the preset
        #[arg(long)]
        block_others: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Value to set
        value: String,
    },
    /// Reset configuration to defaults
    Reset,
    /// Show the configuration file path
    Path,
}
