//! `config` subcommands. These never touch the network.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

#[allow(clippy::unnecessary_wraps)]
pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            let path = global
                .config
                .clone()
                .unwrap_or_else(tuyabridge_config::config_path);
            output::print_output(&path.display().to_string());
            Ok(())
        }
    }
}
