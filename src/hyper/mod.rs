//! gRPC client for the hyperd PublicAPI.
//!
//! [`HyperClient`] exposes one method per hyperd action. Each method makes a
//! single attempt bounded by the configured timeout; a backend status is
//! returned unchanged as [`Error::Backend`].

pub mod exec;

pub use exec::{ExecSession, ExecStreams, InputSource, OutputSink};

use crate::error::{Error, Result};
use crate::proto::hyperd::{self, public_api_client::PublicApiClient};
use async_stream::try_stream;
use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::{Channel, Endpoint};
use tracing::debug;

/// Buffered stdin chunks per exec session.
const EXEC_CHANNEL_CAPACITY: usize = 16;

/// Version strings reported by hyperd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: String,
    pub api_version: String,
}

/// Outcome of a pod stop, as reported by hyperd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStopResult {
    pub code: i32,
    pub cause: String,
}

/// Client for the hyperd PublicAPI.
///
/// Cloning is cheap: clones share the same lazily connected channel.
#[derive(Debug, Clone)]
pub struct HyperClient {
    client: PublicApiClient<Channel>,
    timeout: Duration,
}

impl HyperClient {
    /// Creates a client for `endpoint` (`host:port` or a full URI).
    ///
    /// The connection is established on first use, so this only fails when
    /// the endpoint is not a valid URI.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let uri = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };

        debug!(uri = %uri, "Creating hyperd client");

        let channel = Endpoint::from_shared(uri)
            .map_err(|e| Error::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?
            .connect_lazy();

        Ok(Self {
            client: PublicApiClient::new(channel),
            timeout,
        })
    }

    /// The deadline applied to each call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn deadline<T, F>(&self, operation: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation,
                duration: self.timeout,
            }),
        }
    }

    pub async fn version(&self) -> Result<VersionInfo> {
        let mut client = self.client.clone();
        let resp = self
            .deadline("version", async move {
                Ok(client.version(hyperd::VersionRequest {}).await?.into_inner())
            })
            .await?;
        Ok(VersionInfo {
            version: resp.version,
            api_version: resp.api_version,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pods
    // ─────────────────────────────────────────────────────────────────────

    /// Gets pod info by pod id. hyperd answers an unknown id with an error.
    pub async fn pod_info(&self, pod_id: &str) -> Result<hyperd::PodInfo> {
        let mut client = self.client.clone();
        let request = hyperd::PodInfoRequest {
            pod_id: pod_id.to_string(),
        };
        let resp = self
            .deadline("pod info", async move { Ok(client.pod_info(request).await?.into_inner()) })
            .await?;
        resp.pod_info.ok_or(Error::StreamClosed("pod info"))
    }

    pub async fn pod_list(&self) -> Result<Vec<hyperd::PodListResult>> {
        let mut client = self.client.clone();
        let resp = self
            .deadline("pod list", async move {
                Ok(client
                    .pod_list(hyperd::PodListRequest::default())
                    .await?
                    .into_inner())
            })
            .await?;
        Ok(resp.pod_list)
    }

    /// Creates a pod and returns the id hyperd assigned.
    pub async fn create_pod(&self, spec: hyperd::UserPod) -> Result<String> {
        let mut client = self.client.clone();
        let request = hyperd::PodCreateRequest {
            pod_spec: Some(spec),
        };
        let resp = self
            .deadline("pod create", async move { Ok(client.pod_create(request).await?.into_inner()) })
            .await?;
        debug!(pod_id = %resp.pod_id, "Created pod");
        Ok(resp.pod_id)
    }

    /// Starts a pod: sends one message naming it and waits for exactly one
    /// acknowledgement. The send direction stays open until the ack arrives.
    pub async fn start_pod(&self, pod_id: &str) -> Result<()> {
        let mut client = self.client.clone();
        let request = hyperd::PodStartMessage {
            pod_id: pod_id.to_string(),
            data: Vec::new(),
        };

        self.deadline("pod start", async move {
            let (tx, rx) = mpsc::channel(1);
            tx.send(request)
                .await
                .map_err(|_| Error::StreamClosed("pod start request"))?;

            let mut inbound = client.pod_start(ReceiverStream::new(rx)).await?.into_inner();
            let ack = inbound.message().await?;
            drop(tx);

            match ack {
                Some(_) => Ok(()),
                None => Err(Error::StreamClosed("pod start acknowledgement")),
            }
        })
        .await
    }

    /// Stops a pod. The code and cause are returned verbatim; a non-zero
    /// code is not turned into an error here.
    pub async fn stop_pod(&self, pod_id: &str) -> Result<PodStopResult> {
        let mut client = self.client.clone();
        let request = hyperd::PodStopRequest {
            pod_id: pod_id.to_string(),
        };
        let resp = self
            .deadline("pod stop", async move { Ok(client.pod_stop(request).await?.into_inner()) })
            .await?;
        Ok(PodStopResult {
            code: resp.code,
            cause: resp.cause,
        })
    }

    pub async fn remove_pod(&self, pod_id: &str) -> Result<()> {
        let mut client = self.client.clone();
        let request = hyperd::PodRemoveRequest {
            pod_id: pod_id.to_string(),
        };
        self.deadline("pod remove", async move {
            client.pod_remove(request).await?;
            Ok(())
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Containers
    // ─────────────────────────────────────────────────────────────────────

    /// Lists containers. `auxiliary` includes hyperd's own helper containers.
    pub async fn container_list(&self, auxiliary: bool) -> Result<Vec<hyperd::ContainerListResult>> {
        let mut client = self.client.clone();
        let request = hyperd::ContainerListRequest {
            auxiliary,
            ..Default::default()
        };
        let resp = self
            .deadline("container list", async move {
                Ok(client.container_list(request).await?.into_inner())
            })
            .await?;
        Ok(resp.container_list)
    }

    /// Gets container info by container name or id.
    pub async fn container_info(&self, container: &str) -> Result<hyperd::ContainerInfo> {
        let mut client = self.client.clone();
        let request = hyperd::ContainerInfoRequest {
            container: container.to_string(),
        };
        let resp = self
            .deadline("container info", async move {
                Ok(client.container_info(request).await?.into_inner())
            })
            .await?;
        resp.container_info
            .ok_or(Error::StreamClosed("container info"))
    }

    /// Waits for a process in a container and returns its exit code. An
    /// empty `process_id` names the container's init process. With
    /// `no_hang`, hyperd answers at once instead of blocking.
    pub async fn wait(&self, container: &str, process_id: &str, no_hang: bool) -> Result<i32> {
        let mut client = self.client.clone();
        let request = hyperd::WaitRequest {
            container: container.to_string(),
            process_id: process_id.to_string(),
            no_hang,
        };
        let resp = self
            .deadline("wait", async move { Ok(client.wait(request).await?.into_inner()) })
            .await?;
        Ok(resp.exit_code)
    }

    /// Creates a container in a pod and returns its id.
    pub async fn create_container(&self, pod_id: &str, spec: hyperd::UserContainer) -> Result<String> {
        let mut client = self.client.clone();
        let request = hyperd::ContainerCreateRequest {
            container_spec: Some(spec),
            pod_id: pod_id.to_string(),
        };
        let resp = self
            .deadline("container create", async move {
                Ok(client.container_create(request).await?.into_inner())
            })
            .await?;
        Ok(resp.container_id)
    }

    pub async fn start_container(&self, container_id: &str) -> Result<()> {
        debug!(container_id, "start container has no hyperd call");
        Err(Error::Unimplemented {
            operation: "StartContainer",
        })
    }

    pub async fn stop_container(&self, container_id: &str, timeout_secs: i64) -> Result<()> {
        debug!(container_id, timeout_secs, "stop container has no hyperd call");
        Err(Error::Unimplemented {
            operation: "StopContainer",
        })
    }

    pub async fn remove_container(&self, container_id: &str) -> Result<()> {
        debug!(container_id, "remove container has no hyperd call");
        Err(Error::Unimplemented {
            operation: "RemoveContainer",
        })
    }

    /// Runs an interactive command in a container.
    ///
    /// The deadline bounds establishing the call only; the session itself
    /// runs until hyperd ends it, a stream fails, or `cancel` fires.
    pub async fn container_exec(
        &self,
        session: &ExecSession,
        streams: ExecStreams,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut client = self.client.clone();
        let (tx, rx) = mpsc::channel(EXEC_CHANNEL_CAPACITY);
        tx.send(session.initial_request())
            .await
            .map_err(|_| Error::StreamClosed("exec request"))?;

        debug!(
            container_id = %session.container_id,
            tag = %session.tag,
            tty = session.tty,
            "Starting exec session"
        );

        let inbound = self
            .deadline("container exec", async move {
                Ok(client.container_exec(ReceiverStream::new(rx)).await?.into_inner())
            })
            .await?;

        exec::relay(tx, inbound, streams, cancel).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Logs
    // ─────────────────────────────────────────────────────────────────────

    fn logs_request(container: &str, follow: bool) -> hyperd::ContainerLogsRequest {
        hyperd::ContainerLogsRequest {
            container: container.to_string(),
            follow,
            timestamps: false,
            tail: String::new(),
            since: String::new(),
            stdout: true,
            stderr: true,
        }
    }

    /// Fetches everything a container has logged so far as one buffer.
    pub async fn container_logs(&self, container: &str) -> Result<Vec<u8>> {
        let mut client = self.client.clone();
        let request = Self::logs_request(container, false);
        self.deadline("container logs", async move {
            let mut inbound = client.container_logs(request).await?.into_inner();
            let mut logs = Vec::new();
            while let Some(chunk) = inbound.message().await? {
                logs.extend_from_slice(&chunk.log);
            }
            Ok(logs)
        })
        .await
    }

    /// Follows a container's logs. The returned stream yields chunks as
    /// hyperd sends them; drop it to stop following.
    pub async fn follow_container_logs(
        &self,
        container: &str,
    ) -> Result<impl Stream<Item = Result<Bytes>> + Send + 'static> {
        let mut client = self.client.clone();
        let request = Self::logs_request(container, true);
        let mut inbound = self
            .deadline("container logs", async move {
                Ok(client.container_logs(request).await?.into_inner())
            })
            .await?;

        Ok(try_stream! {
            while let Some(chunk) = inbound.message().await? {
                yield Bytes::from(chunk.log);
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Images
    // ─────────────────────────────────────────────────────────────────────

    pub async fn image_list(&self) -> Result<Vec<hyperd::ImageInfo>> {
        let mut client = self.client.clone();
        let resp = self
            .deadline("image list", async move {
                Ok(client
                    .image_list(hyperd::ImageListRequest::default())
                    .await?
                    .into_inner())
            })
            .await?;
        Ok(resp.image_list)
    }

    /// Pulls an image. Progress chunks go to `progress` when given; a sink
    /// that accepts fewer bytes than offered fails the pull.
    pub async fn pull_image(
        &self,
        image: &str,
        tag: &str,
        auth: Option<hyperd::AuthConfig>,
        mut progress: Option<&mut (dyn AsyncWrite + Send + Unpin)>,
    ) -> Result<()> {
        let mut client = self.client.clone();
        let request = hyperd::ImagePullRequest {
            image: image.to_string(),
            tag: tag.to_string(),
            auth,
        };
        debug!(image, tag, "Pulling image");

        self.deadline("image pull", async move {
            let mut inbound = client.image_pull(request).await?.into_inner();
            while let Some(chunk) = inbound.message().await? {
                if let Some(sink) = progress.as_deref_mut() {
                    exec::write_payload(sink, &chunk.data).await?;
                }
            }
            Ok(())
        })
        .await
    }

    pub async fn remove_image(&self, image: &str) -> Result<()> {
        let mut client = self.client.clone();
        let request = hyperd::ImageRemoveRequest {
            image: image.to_string(),
            ..Default::default()
        };
        self.deadline("image remove", async move {
            client.image_remove(request).await?;
            Ok(())
        })
        .await
    }
}
