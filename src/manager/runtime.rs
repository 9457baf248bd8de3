use super::{required, respond, KubeHyperManager, RUNTIME_API_VERSION, RUNTIME_NAME};
use crate::convert::{container, pod};
use crate::error::{self, Error};
use crate::proto::kubeapi::runtime_service_server::RuntimeService;
use crate::proto::kubeapi::*;
use tonic::{Request, Response, Status, Streaming};
use tracing::{debug, warn};

#[tonic::async_trait]
impl RuntimeService for KubeHyperManager {
    type ExecStream = super::exec::ExecResponseStream;

    async fn version(
        &self,
        _request: Request<VersionRequest>,
    ) -> Result<Response<VersionResponse>, Status> {
        let result = self.client.version().await.map(|v| VersionResponse {
            version: Some(RUNTIME_API_VERSION.to_string()),
            runtime_name: Some(RUNTIME_NAME.to_string()),
            runtime_version: Some(v.version),
            runtime_api_version: Some(v.api_version),
        });
        respond("Version", result)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Pod sandboxes
    // ─────────────────────────────────────────────────────────────────────

    async fn create_pod_sandbox(
        &self,
        request: Request<CreatePodSandboxRequest>,
    ) -> Result<Response<CreatePodSandboxResponse>, Status> {
        let req = request.into_inner();
        debug!("CreatePodSandbox with request {:?}", req);

        let result: error::Result<_> = async {
            let config = req.config.ok_or(Error::MissingField("config"))?;
            let pod_id = self.client.create_pod(pod::user_pod(&config)).await?;

            if let Err(err) = self.client.start_pod(&pod_id).await {
                if let Err(cleanup) = self.client.remove_pod(&pod_id).await {
                    warn!("Remove pod {} after failed start: {}", pod_id, cleanup);
                }
                return Err(err);
            }

            Ok(CreatePodSandboxResponse {
                pod_sandbox_id: Some(pod_id),
            })
        }
        .await;
        respond("CreatePodSandbox", result)
    }

    async fn stop_pod_sandbox(
        &self,
        request: Request<StopPodSandboxRequest>,
    ) -> Result<Response<StopPodSandboxResponse>, Status> {
        let req = request.into_inner();
        debug!("StopPodSandbox with request {:?}", req);

        let result: error::Result<_> = async {
            let pod_id = required(&req.pod_sandbox_id, "pod_sandbox_id")?;
            let stopped = self.client.stop_pod(pod_id).await?;
            if stopped.code != 0 {
                return Err(Error::PodStop {
                    pod_id: pod_id.to_string(),
                    code: stopped.code,
                    cause: stopped.cause,
                });
            }
            Ok(StopPodSandboxResponse {})
        }
        .await;
        respond("StopPodSandbox", result)
    }

    async fn delete_pod_sandbox(
        &self,
        request: Request<DeletePodSandboxRequest>,
    ) -> Result<Response<DeletePodSandboxResponse>, Status> {
        let req = request.into_inner();
        debug!("DeletePodSandbox with request {:?}", req);

        let result: error::Result<_> = async {
            let pod_id = required(&req.pod_sandbox_id, "pod_sandbox_id")?;
            self.client.remove_pod(pod_id).await?;
            Ok(DeletePodSandboxResponse {})
        }
        .await;
        respond("DeletePodSandbox", result)
    }

    async fn pod_sandbox_status(
        &self,
        request: Request<PodSandboxStatusRequest>,
    ) -> Result<Response<PodSandboxStatusResponse>, Status> {
        let req = request.into_inner();
        debug!("PodSandboxStatus with request {:?}", req);

        let result: error::Result<_> = async {
            let pod_id = required(&req.pod_sandbox_id, "pod_sandbox_id")?;
            let info = self.client.pod_info(pod_id).await?;
            Ok(PodSandboxStatusResponse {
                status: Some(pod::pod_sandbox_status(&info)),
            })
        }
        .await;
        respond("PodSandboxStatus", result)
    }

    async fn list_pod_sandbox(
        &self,
        request: Request<ListPodSandboxRequest>,
    ) -> Result<Response<ListPodSandboxResponse>, Status> {
        let req = request.into_inner();
        debug!("ListPodSandbox with request {:?}", req);

        let result = self.client.pod_list().await.map(|pods| {
            let items = pods
                .iter()
                .map(pod::pod_sandbox)
                .filter(|sandbox| {
                    req.filter
                        .as_ref()
                        .map_or(true, |filter| pod::sandbox_matches(filter, sandbox))
                })
                .collect();
            ListPodSandboxResponse { items }
        });
        respond("ListPodSandbox", result)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Containers
    // ─────────────────────────────────────────────────────────────────────

    async fn create_container(
        &self,
        request: Request<CreateContainerRequest>,
    ) -> Result<Response<CreateContainerResponse>, Status> {
        let req = request.into_inner();
        debug!("CreateContainer with request {:?}", req);

        let result: error::Result<_> = async {
            let pod_id = required(&req.pod_sandbox_id, "pod_sandbox_id")?;
            let config = req.config.as_ref().ok_or(Error::MissingField("config"))?;
            let container_id = self
                .client
                .create_container(pod_id, container::user_container(config))
                .await?;
            Ok(CreateContainerResponse {
                container_id: Some(container_id),
            })
        }
        .await;
        respond("CreateContainer", result)
    }

    async fn start_container(
        &self,
        request: Request<StartContainerRequest>,
    ) -> Result<Response<StartContainerResponse>, Status> {
        let req = request.into_inner();
        let result: error::Result<_> = async {
            let container_id = required(&req.container_id, "container_id")?;
            self.client.start_container(container_id).await?;
            Ok(StartContainerResponse {})
        }
        .await;
        respond("StartContainer", result)
    }

    async fn stop_container(
        &self,
        request: Request<StopContainerRequest>,
    ) -> Result<Response<StopContainerResponse>, Status> {
        let req = request.into_inner();
        let result: error::Result<_> = async {
            let container_id = required(&req.container_id, "container_id")?;
            self.client.stop_container(container_id, req.timeout()).await?;
            Ok(StopContainerResponse {})
        }
        .await;
        respond("StopContainer", result)
    }

    async fn remove_container(
        &self,
        request: Request<RemoveContainerRequest>,
    ) -> Result<Response<RemoveContainerResponse>, Status> {
        let req = request.into_inner();
        let result: error::Result<_> = async {
            let container_id = required(&req.container_id, "container_id")?;
            self.client.remove_container(container_id).await?;
            Ok(RemoveContainerResponse {})
        }
        .await;
        respond("RemoveContainer", result)
    }

    async fn list_containers(
        &self,
        request: Request<ListContainersRequest>,
    ) -> Result<Response<ListContainersResponse>, Status> {
        let req = request.into_inner();
        debug!("ListContainers with request {:?}", req);

        let result = self.client.container_list(false).await.map(|list| {
            let containers = list
                .iter()
                .map(container::kube_container)
                .filter(|c| {
                    req.filter
                        .as_ref()
                        .map_or(true, |filter| container::container_matches(filter, c))
                })
                .collect();
            ListContainersResponse { containers }
        });
        respond("ListContainers", result)
    }

    async fn container_status(
        &self,
        request: Request<ContainerStatusRequest>,
    ) -> Result<Response<ContainerStatusResponse>, Status> {
        let req = request.into_inner();
        debug!("ContainerStatus with request {:?}", req);

        let result: error::Result<_> = async {
            let container_id = required(&req.container_id, "container_id")?;
            let info = self.client.container_info(container_id).await?;
            Ok(ContainerStatusResponse {
                status: Some(container::container_status(&info)),
            })
        }
        .await;
        respond("ContainerStatus", result)
    }

    async fn exec(
        &self,
        request: Request<Streaming<ExecRequest>>,
    ) -> Result<Response<Self::ExecStream>, Status> {
        let result = self.start_exec(request.into_inner()).await;
        respond("Exec", result)
    }
}
