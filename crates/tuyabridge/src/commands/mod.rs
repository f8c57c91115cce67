//! Command handlers, one module per subcommand.

pub mod config_cmd;
pub mod devices;
pub mod send;
pub mod watch;
