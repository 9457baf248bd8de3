//! Configuration management for the hyperlet shim.
//!
//! Settings are loaded from several sources, later ones overriding earlier:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/hyperlet/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `HYPERLET__`, e.g.
//!    `HYPERLET__HYPER__ENDPOINT`)
//! 5. Command-line arguments

use crate::error::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line overrides shared by every subcommand that talks to hyperd.
#[derive(Debug, Clone, Default, Parser)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// hyperd gRPC endpoint (host:port)
    #[arg(long = "hyper-endpoint", value_name = "HOST:PORT")]
    pub hyper_endpoint: Option<String>,

    /// Per-call timeout against hyperd, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Additional tracing filter directives
    #[arg(long)]
    pub log_filter: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Resolved settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub hyper: HyperSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Where the kubelet-facing server listens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub listen: String,
}

/// How to reach hyperd.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HyperSettings {
    /// `host:port` of the hyperd gRPC API
    pub endpoint: String,
    /// Deadline applied to each call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            filter: None,
            file: None,
        }
    }
}

impl Settings {
    /// Load settings from all sources.
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("/etc/hyperlet/config.toml").required(false));

        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HYPERLET")
                .prefix_separator("__")
                .separator("__"),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_args(args);
        Ok(settings)
    }

    fn apply_args(&mut self, args: &Args) {
        if let Some(endpoint) = &args.hyper_endpoint {
            self.hyper.endpoint = endpoint.clone();
        }
        if let Some(timeout) = args.timeout {
            self.hyper.timeout_secs = timeout;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(filter) = &args.log_filter {
            self.logging.filter = Some(filter.clone());
        }
        if let Some(file) = &args.log_file {
            self.logging.file = Some(file.clone());
        }
    }

    /// Per-call deadline against hyperd.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.hyper.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}
