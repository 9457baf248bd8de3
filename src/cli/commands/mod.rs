pub mod logs;
pub mod server;

pub use logs::LogsCommand;
pub use server::ServerCommand;

use crate::config;
use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the kubelet runtime API on top of hyperd
    Server(ServerCommand),
    /// Print the version of the hyperd behind the shim
    Version(VersionCommand),
    /// Print or follow a container's logs
    Logs(LogsCommand),
}

impl Commands {
    /// Configuration overrides given to the selected subcommand.
    pub fn config_args(&self) -> &config::Args {
        match self {
            Commands::Server(cmd) => &cmd.config,
            Commands::Version(cmd) => &cmd.config,
            Commands::Logs(cmd) => &cmd.config,
        }
    }
}

#[derive(Args)]
pub struct VersionCommand {
    #[command(flatten)]
    pub config: config::Args,
}
