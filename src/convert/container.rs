//! Container translation.

use super::{labels_match, merge_labels, rfc3339_to_nanos, seconds_to_nanos, split_labels};
use super::{LABEL_ATTEMPT, LABEL_NAME};
use crate::proto::{hyperd, kubeapi};
use std::collections::HashMap;

/// Builds the hyperd container name from kubelet metadata: `<name>_<attempt>`.
pub fn container_name(metadata: &kubeapi::ContainerMetadata) -> String {
    format!("{}_{}", metadata.name(), metadata.attempt())
}

/// Splits a hyperd container name back into kubelet metadata. Names not in
/// `<name>_<attempt>` form are taken whole with attempt 0.
fn parse_container_name(name: &str) -> kubeapi::ContainerMetadata {
    let name = name.trim_start_matches('/');
    if let Some((base, attempt)) = name.rsplit_once('_') {
        if let Ok(attempt) = attempt.parse() {
            return kubeapi::ContainerMetadata {
                name: Some(base.to_string()),
                attempt: Some(attempt),
            };
        }
    }
    kubeapi::ContainerMetadata {
        name: Some(name.to_string()),
        attempt: Some(0),
    }
}

/// Translates a kubelet container config into a hyperd container spec.
///
/// The kubelet `command` overrides the image entrypoint and `args` become the
/// hyperd command, following the usual image semantics.
pub fn user_container(config: &kubeapi::ContainerConfig) -> hyperd::UserContainer {
    let mut labels = merge_labels(&config.labels, &config.annotations);
    let mut name = String::new();
    if let Some(metadata) = &config.metadata {
        name = container_name(metadata);
        labels.insert(LABEL_NAME.to_string(), metadata.name().to_string());
        labels.insert(LABEL_ATTEMPT.to_string(), metadata.attempt().to_string());
    }

    hyperd::UserContainer {
        name,
        image: config
            .image
            .as_ref()
            .map(|spec| spec.image().to_string())
            .unwrap_or_default(),
        workdir: config.working_dir().to_string(),
        command: config.args.clone(),
        entrypoint: config.command.clone(),
        envs: config
            .envs
            .iter()
            .map(|kv| hyperd::EnvironmentVar {
                env: kv.key().to_string(),
                value: kv.value().to_string(),
            })
            .collect(),
        volumes: config
            .mounts
            .iter()
            .map(|mount| hyperd::UserVolumeReference {
                path: mount.container_path().to_string(),
                volume: mount.name().to_string(),
                read_only: mount.readonly(),
            })
            .collect(),
        labels,
        tty: config.tty(),
        stdin: config.stdin(),
        readonly_rootfs: config.readonly_rootfs(),
        log_path: config.log_path().to_string(),
    }
}

/// Maps a hyperd container phase onto a kubelet container state.
pub fn container_state(phase: &str) -> kubeapi::ContainerState {
    match phase.to_ascii_lowercase().as_str() {
        "running" => kubeapi::ContainerState::ContainerRunning,
        "pending" => kubeapi::ContainerState::ContainerCreated,
        "failed" | "succeeded" => kubeapi::ContainerState::ContainerExited,
        _ => kubeapi::ContainerState::ContainerUnknown,
    }
}

/// Translates one hyperd container list entry.
pub fn kube_container(result: &hyperd::ContainerListResult) -> kubeapi::Container {
    kubeapi::Container {
        id: Some(result.container_id.clone()),
        pod_sandbox_id: Some(result.pod_id.clone()),
        metadata: Some(parse_container_name(&result.container_name)),
        image: None,
        image_ref: None,
        state: Some(container_state(&result.status) as i32),
        labels: HashMap::new(),
        annotations: HashMap::new(),
    }
}

/// Translates hyperd container info into a kubelet container status.
pub fn container_status(info: &hyperd::ContainerInfo) -> kubeapi::ContainerStatus {
    let container = info.container.clone().unwrap_or_default();
    let status = info.status.clone().unwrap_or_default();
    let (labels, annotations) = split_labels(&container.labels);

    let metadata = match container.labels.get(LABEL_NAME) {
        Some(name) => kubeapi::ContainerMetadata {
            name: Some(name.clone()),
            attempt: container.labels.get(LABEL_ATTEMPT).and_then(|a| a.parse().ok()),
        },
        None => parse_container_name(&container.name),
    };

    let mut started_at = 0;
    let mut finished_at = 0;
    let mut exit_code = 0;
    let mut reason = String::new();
    if let Some(running) = &status.running {
        started_at = rfc3339_to_nanos(&running.started_at);
    }
    if let Some(terminated) = &status.terminated {
        started_at = rfc3339_to_nanos(&terminated.started_at);
        finished_at = rfc3339_to_nanos(&terminated.finished_at);
        exit_code = terminated.exit_code;
        reason = terminated.reason.clone();
    } else if let Some(waiting) = &status.waiting {
        reason = waiting.reason.clone();
    }

    kubeapi::ContainerStatus {
        id: Some(container.container_id.clone()),
        metadata: Some(metadata),
        state: Some(container_state(&status.phase) as i32),
        created_at: Some(seconds_to_nanos(info.created_at)),
        started_at: Some(started_at),
        finished_at: Some(finished_at),
        exit_code: Some(exit_code),
        image: Some(kubeapi::ImageSpec {
            image: Some(container.image.clone()),
        }),
        image_ref: Some(container.image_id.clone()),
        reason: Some(reason),
        labels,
        annotations,
        mounts: container
            .volume_mounts
            .iter()
            .map(|vm| kubeapi::Mount {
                name: Some(vm.name.clone()),
                container_path: Some(vm.mount_path.clone()),
                host_path: None,
                readonly: Some(vm.read_only),
            })
            .collect(),
    }
}

/// Applies a kubelet container filter. Unset filter fields match everything.
pub fn container_matches(filter: &kubeapi::ContainerFilter, container: &kubeapi::Container) -> bool {
    if let Some(id) = &filter.id {
        if container.id.as_ref() != Some(id) {
            return false;
        }
    }
    if let Some(pod) = &filter.pod_sandbox_id {
        if container.pod_sandbox_id.as_ref() != Some(pod) {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        let actual = container.metadata.as_ref().and_then(|m| m.name.as_ref());
        if actual != Some(name) {
            return false;
        }
    }
    if let Some(state) = filter.state {
        if container.state != Some(state) {
            return false;
        }
    }
    labels_match(&filter.label_selector, &container.labels)
}
