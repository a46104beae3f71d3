//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Edge gateway trust propagation: user tokens at the edge, robot tokens inside
#[derive(Parser, Debug)]
#[command(name = "edge-trust")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "EDGE_TRUST_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on (overrides server.port)
    #[arg(short, long, env = "EDGE_TRUST_PORT", global = true)]
    pub port: Option<u16>,

    /// Host to bind to (overrides server.host)
    #[arg(long, env = "EDGE_TRUST_HOST", global = true)]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "EDGE_TRUST_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "EDGE_TRUST_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Role to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the edge gateway
    Gateway,

    /// Run the authorization service (login endpoint)
    Auth,

    /// Run a generic internal service behind the robot-token gate
    Service,

    /// Load the configuration and check it for a role
    CheckConfig {
        /// Role to check: gateway, auth or service
        #[arg(long, default_value = "gateway")]
        role: String,
    },

    /// Print shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}
