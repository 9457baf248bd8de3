//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Serving the kubelet runtime API
//! - Querying the hyperd version
//! - Reading container logs

pub mod commands;
pub mod handlers;

pub use handlers::{handle_logs, handle_server, handle_version, init_logging};
