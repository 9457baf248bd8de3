use crate::config;
use clap::Args;

#[derive(Args)]
pub struct ServerCommand {
    /// Listen address in host:port format
    #[arg(long, value_name = "HOST:PORT")]
    pub listen: Option<String>,

    #[command(flatten)]
    pub config: config::Args,
}
