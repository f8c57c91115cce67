//! Clap derive structures for the `tuyabridge` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// tuyabridge -- list, watch and control Tuya cloud devices
#[derive(Debug, Parser)]
#[command(
    name = "tuyabridge",
    version,
    about = "Bridge Tuya cloud devices to the command line",
    long_about = "Talks to the Tuya OpenAPI with your cloud project credentials.\n\n\
        Lists devices, sends commands, and follows realtime device events\n\
        over the encrypted MQTT channel.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "TUYABRIDGE_CONFIG_FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Request timeout in seconds (overrides config)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List devices, or show one device in detail
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Connect and print device events until interrupted
    Watch,

    /// Send a command to a device
    Send(SendArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Device id to show in detail
    pub id: Option<String>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Device id
    pub device: String,

    /// Function code (e.g. switch_1)
    pub code: String,

    /// Value as JSON (true, 42, "white"); anything else is sent as a string
    pub value: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path in use
    Path,
}
