//! hyperlet: a kubelet container runtime shim backed by hyperd.
//!
//! The crate serves the kubelet runtime API (`RuntimeService` and
//! `ImageService`) and satisfies every call by translating it onto the hyperd
//! PublicAPI. The pieces, leaves first:
//!
//! - [`proto`]: generated bindings for both gRPC APIs
//! - [`convert`]: pure translation between the two API domains
//! - [`hyper`]: the hyperd client, including the interactive exec relay
//! - [`manager`]: the kubelet-facing service adapter
//! - [`cli`]: command-line entry points and logging bootstrap

pub mod cli;
pub mod config;
pub mod convert;
pub mod error;
pub mod hyper;
pub mod manager;
pub mod proto;

pub use config::Settings;
pub use error::{Error, Result};
pub use hyper::HyperClient;
pub use manager::KubeHyperManager;
