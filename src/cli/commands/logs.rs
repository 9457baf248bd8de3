use crate::config;
use clap::Args;

#[derive(Args)]
pub struct LogsCommand {
    /// Container name or id
    pub container: String,

    /// Keep streaming new output until interrupted
    #[arg(short, long)]
    pub follow: bool,

    #[command(flatten)]
    pub config: config::Args,
}
