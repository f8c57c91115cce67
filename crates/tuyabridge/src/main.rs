mod cli;
mod commands;
mod error;
mod output;

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use tuyabridge_core::{Bridge, BridgeConfig};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands never need credentials
        Command::Config(args) => commands::config_cmd::handle(&args, &cli.global),

        cmd => {
            let bridge = Bridge::new(build_bridge_config(&cli.global)?)?;
            tracing::debug!(command = ?cmd, "dispatching command");

            match cmd {
                Command::Devices(args) => {
                    commands::devices::handle(&args, &bridge, &cli.global).await
                }
                Command::Watch => commands::watch::handle(&bridge).await,
                Command::Send(args) => commands::send::handle(&args, &bridge, &cli.global).await,
                Command::Config(_) => Ok(()),
            }
        }
    }
}

/// Load settings from the config file and environment, then apply CLI
/// overrides.
fn build_bridge_config(global: &GlobalOpts) -> Result<BridgeConfig, CliError> {
    let mut config = tuyabridge_config::load_config(global.config.as_deref())?.to_bridge_config()?;

    if let Some(secs) = global.timeout {
        if secs == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be greater than zero".into(),
            });
        }
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}
