// src/cli.rs

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use netgaze::output::OutputFormat;

/// Network info gathering tool: DNS, ping, traceroute, WHOIS, ASN,
/// geolocation and optionally ports and TLS for one target.
#[derive(Debug, Parser)]
#[command(name = "netgaze", version, about, args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub scan: ScanArgs,
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    /// IP address, domain or URL to inspect
    pub target: Option<String>,

    /// Scan common TCP ports and inspect the certificate on 443 when open
    #[arg(long)]
    pub ports: bool,

    /// Report format
    #[arg(long, short, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Never emit terminal colors
    #[arg(long)]
    pub no_style: bool,

    /// Overall timeout in seconds (1-300); defaults to the configured value or 15
    #[arg(long, short)]
    pub timeout: Option<u64>,

    /// Report ports whose connect timed out as filtered instead of closed
    #[arg(long)]
    pub separate_filtered: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show or change persisted defaults
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Run a traceroute alone and save the hops as JSON
    Trace {
        target: String,
        /// Output file (default: traceroute-<target>-<timestamp>.json)
        #[arg(long, short)]
        out: Option<PathBuf>,
        /// Timeout in seconds
        #[arg(long, short)]
        timeout: Option<u64>,
    },
    /// Run a traceroute and compare it with a saved baseline
    TraceDiff {
        target: String,
        /// Baseline file (default: newest traceroute-<target>-*.json here)
        #[arg(long, short)]
        base: Option<PathBuf>,
        /// Where to write the new traceroute (default: traceroute-new.json)
        #[arg(long, short)]
        new: Option<PathBuf>,
        /// Also write the comparison to this file
        #[arg(long, short)]
        diff: Option<PathBuf>,
        /// Timeout in seconds
        #[arg(long, short)]
        timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Delete the configuration file
    Clear,
    /// Change persisted defaults
    Set {
        /// Default overall timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Scan ports by default
        #[arg(long)]
        ports: Option<bool>,
    },
}
