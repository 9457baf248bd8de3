//! Common test utilities: an in-process hyperd stand-in and a shim server
//! wired to it.

#![allow(dead_code)]

use async_stream::stream;
use futures::Stream;
use hyperlet_core::hyper::HyperClient;
use hyperlet_core::manager::KubeHyperManager;
use hyperlet_core::proto::hyperd::public_api_server::{PublicApi, PublicApiServer};
use hyperlet_core::proto::hyperd::*;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status, Streaming};

type BoxStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send + 'static>>;

/// Timeout used by clients in tests that do not exercise deadlines.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Behaviour knobs and call recorders for [`MockHyperd`].
pub struct MockState {
    pub version: String,
    pub images: Vec<ImageInfo>,
    /// Reject every pod start.
    pub fail_pod_start: bool,
    /// Delay pod info answers long enough to trip short deadlines.
    pub slow: bool,

    pub created_pods: Mutex<Vec<UserPod>>,
    pub started_pods: Mutex<Vec<String>>,
    pub removed_pods: Mutex<Vec<String>>,
    pub created_containers: Mutex<Vec<(String, UserContainer)>>,
    pub exec_requests: Mutex<Vec<ContainerExecRequest>>,
    pub waits: Mutex<Vec<WaitRequest>>,
    pub pulls: Mutex<Vec<ImagePullRequest>>,
    pub removed_images: Mutex<Vec<String>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            version: "0.8.1".to_string(),
            images: vec![
                image("sha256:aaa", &["busybox:latest"], 1024),
                image("sha256:bbb", &["nginx:1.11", "nginx:latest"], 4096),
                image("sha256:ccc", &[], -1),
            ],
            fail_pod_start: false,
            slow: false,
            created_pods: Mutex::default(),
            started_pods: Mutex::default(),
            removed_pods: Mutex::default(),
            created_containers: Mutex::default(),
            exec_requests: Mutex::default(),
            waits: Mutex::default(),
            pulls: Mutex::default(),
            removed_images: Mutex::default(),
        }
    }
}

pub fn image(id: &str, tags: &[&str], size: i64) -> ImageInfo {
    ImageInfo {
        id: id.to_string(),
        created: 0,
        repo_tags: tags.iter().map(|t| t.to_string()).collect(),
        repo_digests: Vec::new(),
        virtual_size: size,
    }
}

#[derive(Clone)]
pub struct MockHyperd {
    pub state: Arc<MockState>,
}

#[tonic::async_trait]
impl PublicApi for MockHyperd {
    type PodStartStream = BoxStream<PodStartMessage>;
    type ContainerExecStream = BoxStream<ContainerExecResponse>;
    type ContainerLogsStream = BoxStream<ContainerLogsResponse>;
    type ImagePullStream = BoxStream<ImagePullResponse>;

    async fn pod_info(&self, request: Request<PodInfoRequest>) -> Result<Response<PodInfoResponse>, Status> {
        if self.state.slow {
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
        let pod_id = request.into_inner().pod_id;
        if pod_id == "missing" {
            return Err(Status::not_found(format!("pod {} not found", pod_id)));
        }

        Ok(Response::new(PodInfoResponse {
            pod_info: Some(PodInfo {
                pod_id,
                pod_name: "nginx_default_1234_0".to_string(),
                vm: "vm-1".to_string(),
                spec: Some(PodSpec {
                    labels: HashMap::from([
                        ("app".to_string(), "web".to_string()),
                        ("io.kubernetes.hyperlet.name".to_string(), "nginx".to_string()),
                    ]),
                    hostname: "web-0".to_string(),
                }),
                status: Some(PodStatus {
                    phase: "running".to_string(),
                    pod_ip: vec!["10.0.0.2".to_string()],
                    start_time: String::new(),
                }),
                created_at: 100,
            }),
        }))
    }

    async fn pod_list(&self, _request: Request<PodListRequest>) -> Result<Response<PodListResponse>, Status> {
        Ok(Response::new(PodListResponse {
            pod_list: vec![
                PodListResult {
                    pod_id: "pod-a".to_string(),
                    pod_name: "web".to_string(),
                    vm: "vm-a".to_string(),
                    status: "running".to_string(),
                    labels: HashMap::from([("app".to_string(), "web".to_string())]),
                    created_at: 1,
                },
                PodListResult {
                    pod_id: "pod-b".to_string(),
                    pod_name: "db".to_string(),
                    vm: "vm-b".to_string(),
                    status: "pending".to_string(),
                    labels: HashMap::from([("app".to_string(), "db".to_string())]),
                    created_at: 2,
                },
            ],
        }))
    }

    async fn pod_create(&self, request: Request<PodCreateRequest>) -> Result<Response<PodCreateResponse>, Status> {
        let spec = request
            .into_inner()
            .pod_spec
            .ok_or_else(|| Status::invalid_argument("missing pod spec"))?;
        self.state.created_pods.lock().await.push(spec);
        Ok(Response::new(PodCreateResponse {
            pod_id: "pod-1".to_string(),
        }))
    }

    async fn pod_start(
        &self,
        request: Request<Streaming<PodStartMessage>>,
    ) -> Result<Response<Self::PodStartStream>, Status> {
        let mut inbound = request.into_inner();
        let message = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("no pod start message"))?;

        if self.state.fail_pod_start {
            return Err(Status::internal("vm boot failed"));
        }
        self.state.started_pods.lock().await.push(message.pod_id.clone());

        let ack = PodStartMessage {
            pod_id: message.pod_id,
            data: Vec::new(),
        };
        Ok(Response::new(Box::pin(futures::stream::iter([Ok(ack)]))))
    }

    async fn pod_stop(&self, request: Request<PodStopRequest>) -> Result<Response<PodStopResponse>, Status> {
        let pod_id = request.into_inner().pod_id;
        let resp = if pod_id == "stuck" {
            PodStopResponse {
                code: 1,
                cause: "vm did not shut down".to_string(),
            }
        } else {
            PodStopResponse {
                code: 0,
                cause: String::new(),
            }
        };
        Ok(Response::new(resp))
    }

    async fn pod_remove(&self, request: Request<PodRemoveRequest>) -> Result<Response<PodRemoveResponse>, Status> {
        self.state.removed_pods.lock().await.push(request.into_inner().pod_id);
        Ok(Response::new(PodRemoveResponse {
            code: 0,
            cause: String::new(),
        }))
    }

    async fn container_list(
        &self,
        _request: Request<ContainerListRequest>,
    ) -> Result<Response<ContainerListResponse>, Status> {
        Ok(Response::new(ContainerListResponse {
            container_list: vec![
                ContainerListResult {
                    container_id: "c-1".to_string(),
                    container_name: "/web_0".to_string(),
                    pod_id: "pod-a".to_string(),
                    status: "running".to_string(),
                },
                ContainerListResult {
                    container_id: "c-2".to_string(),
                    container_name: "/db_1".to_string(),
                    pod_id: "pod-b".to_string(),
                    status: "failed".to_string(),
                },
            ],
        }))
    }

    async fn container_info(
        &self,
        request: Request<ContainerInfoRequest>,
    ) -> Result<Response<ContainerInfoResponse>, Status> {
        let container = request.into_inner().container;
        if container == "missing" {
            return Err(Status::not_found(format!("container {} not found", container)));
        }

        Ok(Response::new(ContainerInfoResponse {
            container_info: Some(ContainerInfo {
                container: Some(Container {
                    name: "/web_0".to_string(),
                    container_id: container.clone(),
                    image: "nginx:1.11".to_string(),
                    image_id: "sha256:bbb".to_string(),
                    ..Default::default()
                }),
                pod_id: "pod-a".to_string(),
                status: Some(ContainerStatus {
                    container_id: container,
                    phase: "running".to_string(),
                    running: Some(ContainerRunning {
                        started_at: "1970-01-01T00:00:05Z".to_string(),
                    }),
                    ..Default::default()
                }),
                created_at: 3,
            }),
        }))
    }

    async fn container_create(
        &self,
        request: Request<ContainerCreateRequest>,
    ) -> Result<Response<ContainerCreateResponse>, Status> {
        let req = request.into_inner();
        let spec = req
            .container_spec
            .ok_or_else(|| Status::invalid_argument("missing container spec"))?;
        self.state.created_containers.lock().await.push((req.pod_id, spec));
        Ok(Response::new(ContainerCreateResponse {
            container_id: "c-new".to_string(),
        }))
    }

    /// Echoes stdin back as stdout until the client closes its side. The
    /// command `stderr` instead writes one stderr chunk and ends.
    async fn container_exec(
        &self,
        request: Request<Streaming<ContainerExecRequest>>,
    ) -> Result<Response<Self::ContainerExecStream>, Status> {
        let mut inbound = request.into_inner();
        let first = inbound
            .message()
            .await?
            .ok_or_else(|| Status::invalid_argument("no exec request"))?;
        self.state.exec_requests.lock().await.push(first.clone());

        let to_stderr = first.command.first().map(String::as_str) == Some("stderr");
        let output = stream! {
            if to_stderr {
                yield Ok::<_, Status>(ContainerExecResponse {
                    stdout: Vec::new(),
                    stderr: b"err-output".to_vec(),
                });
                return;
            }
            loop {
                match inbound.message().await {
                    Ok(Some(message)) if message.stdin.is_empty() => {}
                    Ok(Some(message)) => {
                        yield Ok(ContainerExecResponse {
                            stdout: message.stdin,
                            stderr: Vec::new(),
                        });
                    }
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(status);
                        break;
                    }
                }
            }
        };
        Ok(Response::new(Box::pin(output)))
    }

    /// Sends `a`, `b`, `c`. In follow mode the stream then stays open.
    async fn container_logs(
        &self,
        request: Request<ContainerLogsRequest>,
    ) -> Result<Response<Self::ContainerLogsStream>, Status> {
        let follow = request.into_inner().follow;
        let output = stream! {
            for chunk in ["a", "b", "c"] {
                yield Ok::<_, Status>(ContainerLogsResponse {
                    log: chunk.as_bytes().to_vec(),
                });
            }
            if follow {
                futures::future::pending::<()>().await;
            }
        };
        Ok(Response::new(Box::pin(output)))
    }

    /// Exit code 0 for `c-1`, 137 for anything else. `missing` is unknown.
    async fn wait(&self, request: Request<WaitRequest>) -> Result<Response<WaitResponse>, Status> {
        let req = request.into_inner();
        if req.container == "missing" {
            return Err(Status::not_found(format!("container {} not found", req.container)));
        }
        let exit_code = if req.container == "c-1" { 0 } else { 137 };
        self.state.waits.lock().await.push(req);
        Ok(Response::new(WaitResponse { exit_code }))
    }

    async fn image_list(&self, _request: Request<ImageListRequest>) -> Result<Response<ImageListResponse>, Status> {
        Ok(Response::new(ImageListResponse {
            image_list: self.state.images.clone(),
        }))
    }

    async fn image_pull(
        &self,
        request: Request<ImagePullRequest>,
    ) -> Result<Response<Self::ImagePullStream>, Status> {
        self.state.pulls.lock().await.push(request.into_inner());
        let progress = [b"Pulling fs layer\n".to_vec(), b"Download complete\n".to_vec()]
            .into_iter()
            .map(|data| Ok(ImagePullResponse { data }));
        Ok(Response::new(Box::pin(futures::stream::iter(progress))))
    }

    async fn image_remove(
        &self,
        request: Request<ImageRemoveRequest>,
    ) -> Result<Response<ImageRemoveResponse>, Status> {
        let image = request.into_inner().image;
        if image == "missing" {
            return Err(Status::not_found(format!("image {} not found", image)));
        }
        self.state.removed_images.lock().await.push(image);
        Ok(Response::new(ImageRemoveResponse {}))
    }

    async fn version(&self, _request: Request<VersionRequest>) -> Result<Response<VersionResponse>, Status> {
        Ok(Response::new(VersionResponse {
            version: self.state.version.clone(),
            api_version: "1.24".to_string(),
        }))
    }
}

/// Starts a mock hyperd on an ephemeral port and returns its state and
/// `host:port` endpoint.
pub async fn start_mock_hyperd(state: MockState) -> (Arc<MockState>, String) {
    let state = Arc::new(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let service = PublicApiServer::new(MockHyperd {
        state: state.clone(),
    });
    let incoming = TcpListenerStream::new(listener);
    tokio::spawn(async move {
        Server::builder()
            .add_service(service)
            .serve_with_incoming(incoming)
            .await
            .unwrap();
    });

    (state, addr.to_string())
}

/// Client for a running mock hyperd.
pub fn hyper_client(endpoint: &str) -> HyperClient {
    HyperClient::new(endpoint, TEST_TIMEOUT).unwrap()
}

/// Starts the kubelet-facing shim against a mock hyperd and returns the
/// shim's `http://` endpoint.
pub async fn start_shim(state: MockState) -> (Arc<MockState>, String) {
    let (state, hyperd) = start_mock_hyperd(state).await;
    let manager = KubeHyperManager::new(hyper_client(&hyperd)).await.unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let incoming = TcpListenerStream::new(listener);
    tokio::spawn(async move {
        manager.router().serve_with_incoming(incoming).await.unwrap();
    });

    (state, format!("http://{}", addr))
}
