//! Kubelet runtime service backed by hyperd.
//!
//! [`KubeHyperManager`] implements both kubelet gRPC services
//! (`RuntimeService` and `ImageService`) by translating each call onto a
//! [`HyperClient`]. The manager keeps no state of its own beyond the client
//! and a shutdown token that exec sessions hang off.
//!
//! # Example
//!
//! ```rust,ignore
//! let client = HyperClient::new("127.0.0.1:22318", Duration::from_secs(15))?;
//! let manager = KubeHyperManager::new(client).await?;
//! manager.serve("127.0.0.1:10238".parse()?).await?;
//! ```

mod exec;
mod image;
mod runtime;

use crate::error::{Error, Result};
use crate::hyper::HyperClient;
use crate::proto::kubeapi::image_service_server::ImageServiceServer;
use crate::proto::kubeapi::runtime_service_server::RuntimeServiceServer;
use semver::Version;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Router;
use tonic::transport::Server;
use tonic::{Response, Status};
use tracing::{debug, error, info};

/// Runtime name reported to the kubelet.
pub const RUNTIME_NAME: &str = "hyper";
/// Kubelet runtime API version implemented.
pub const RUNTIME_API_VERSION: &str = "0.1.0";
/// Oldest hyperd release the shim works with.
pub const MINIMUM_HYPER_VERSION: &str = "0.6.0";

/// Serves the kubelet runtime API on top of hyperd.
#[derive(Debug, Clone)]
pub struct KubeHyperManager {
    client: HyperClient,
    shutdown: CancellationToken,
}

impl KubeHyperManager {
    /// Creates a manager after checking that hyperd is recent enough.
    pub async fn new(client: HyperClient) -> Result<Self> {
        let version = client.version().await?;
        debug!("Got hyperd version: {}", version.version);
        check_version(&version.version)?;

        Ok(Self {
            client,
            shutdown: CancellationToken::new(),
        })
    }

    /// Ties the manager to an external shutdown token. Cancelling it stops
    /// the server and every running exec session.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Both kubelet services, ready to be served.
    pub fn router(&self) -> Router {
        Server::builder()
            .add_service(RuntimeServiceServer::new(self.clone()))
            .add_service(ImageServiceServer::new(self.clone()))
    }

    /// Serves on `addr` until the shutdown token is cancelled.
    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        info!("Starting hyperlet on {}", addr);
        let shutdown = self.shutdown.clone();
        self.router()
            .serve_with_shutdown(addr, shutdown.cancelled_owned())
            .await?;
        info!("hyperlet stopped");
        Ok(())
    }
}

/// Checks that hyperd's version is at least [`MINIMUM_HYPER_VERSION`].
pub fn check_version(version: &str) -> Result<()> {
    let found = Version::parse(version).map_err(|e| Error::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })?;
    let minimum = Version::new(0, 6, 0);

    if found < minimum {
        return Err(Error::UnsupportedVersion {
            found: version.to_string(),
            minimum: MINIMUM_HYPER_VERSION,
        });
    }
    Ok(())
}

/// Turns an adapter result into a gRPC response, logging the failure once.
fn respond<T>(operation: &str, result: Result<T>) -> std::result::Result<Response<T>, Status> {
    match result {
        Ok(message) => Ok(Response::new(message)),
        Err(err) if err.is_unimplemented() => {
            debug!("{} is not implemented", operation);
            Err(err.into())
        }
        Err(err) => {
            error!("{} failed: {}", operation, err);
            Err(err.into())
        }
    }
}

/// Returns a required string field or [`Error::MissingField`].
fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str> {
    value.as_deref().ok_or(Error::MissingField(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_version() {
        assert!(check_version("0.6.0").is_ok());
        assert!(check_version("0.8.1").is_ok());
        assert!(check_version("1.0.0").is_ok());
        assert!(matches!(
            check_version("0.5.9"),
            Err(Error::UnsupportedVersion { .. })
        ));
        assert!(matches!(
            check_version("v0.6"),
            Err(Error::InvalidVersion { .. })
        ));
    }

    #[test]
    fn test_required() {
        assert_eq!(required(&Some("pod".into()), "pod_sandbox_id").unwrap(), "pod");
        assert!(matches!(
            required(&None, "pod_sandbox_id"),
            Err(Error::MissingField("pod_sandbox_id"))
        ));
    }
}
