//! hyperlet binary.
//!
//! Entry point for the hyperlet runtime shim, which serves the kubelet
//! container runtime API on top of the hyperd hypervisor container engine.

use anyhow::Context;
use clap::Parser;
use hyperlet_core::{
    cli::commands::Commands,
    cli::handlers::{handle_logs, handle_server, handle_version, init_logging},
    config::Settings,
};
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.command.config_args()).context("Failed to load configuration")?;
    let _guard = init_logging(&settings.logging)?;

    info!("hyperlet {} starting up", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Server(cmd) => handle_server(cmd, settings).await?,
        Commands::Version(_) => handle_version(settings).await?,
        Commands::Logs(cmd) => handle_logs(cmd, settings).await?,
    }

    Ok(())
}
