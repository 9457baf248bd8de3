//! Pod sandbox translation.

use super::{labels_match, merge_labels, seconds_to_nanos, split_labels};
use super::{LABEL_ATTEMPT, LABEL_NAME, LABEL_NAMESPACE, LABEL_UID};
use crate::proto::{hyperd, kubeapi};
use std::collections::HashMap;

/// vCPUs given to a sandbox VM when the kubelet does not say otherwise.
pub const DEFAULT_VCPU: i32 = 1;
/// Memory in MiB given to a sandbox VM when the kubelet does not say otherwise.
pub const DEFAULT_MEMORY_MB: i32 = 64;

/// hyperd pod phase meaning the VM is up.
const PHASE_RUNNING: &str = "running";

/// Builds the hyperd pod name from kubelet metadata:
/// `<name>_<namespace>_<uid>_<attempt>`.
pub fn sandbox_name(metadata: &kubeapi::PodSandboxMetadata) -> String {
    format!(
        "{}_{}_{}_{}",
        metadata.name(),
        metadata.namespace(),
        metadata.uid(),
        metadata.attempt()
    )
}

/// Translates a sandbox config into a container-less hyperd pod spec.
pub fn user_pod(config: &kubeapi::PodSandboxConfig) -> hyperd::UserPod {
    let mut labels = merge_labels(&config.labels, &config.annotations);
    let mut id = String::new();
    if let Some(metadata) = &config.metadata {
        id = sandbox_name(metadata);
        labels.extend(metadata_labels(metadata));
    }

    let (dns, dns_search, dns_options) = match &config.dns_options {
        Some(opts) => (opts.servers.clone(), opts.searches.clone(), opts.options.clone()),
        None => Default::default(),
    };

    hyperd::UserPod {
        id,
        hostname: config.hostname().to_string(),
        containers: Vec::new(),
        resource: Some(hyperd::UserResource {
            vcpu: DEFAULT_VCPU,
            memory: DEFAULT_MEMORY_MB,
        }),
        dns,
        dns_search,
        dns_options,
        portmappings: config.port_mappings.iter().map(port_mapping).collect(),
        labels,
        log_directory: config.log_directory().to_string(),
    }
}

fn port_mapping(mapping: &kubeapi::PortMapping) -> hyperd::PortMapping {
    let protocol = match mapping.protocol() {
        kubeapi::Protocol::Tcp => "tcp",
        kubeapi::Protocol::Udp => "udp",
    };
    hyperd::PortMapping {
        container_port: mapping.container_port(),
        host_port: mapping.host_port(),
        protocol: protocol.to_string(),
    }
}

fn metadata_labels(metadata: &kubeapi::PodSandboxMetadata) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_NAME.to_string(), metadata.name().to_string()),
        (LABEL_NAMESPACE.to_string(), metadata.namespace().to_string()),
        (LABEL_UID.to_string(), metadata.uid().to_string()),
        (LABEL_ATTEMPT.to_string(), metadata.attempt().to_string()),
    ])
}

/// Recovers sandbox metadata from hyperd labels, falling back to the hyperd
/// pod name when the labels were not written by us.
fn sandbox_metadata(labels: &HashMap<String, String>, pod_name: &str) -> kubeapi::PodSandboxMetadata {
    kubeapi::PodSandboxMetadata {
        name: Some(labels.get(LABEL_NAME).map_or(pod_name, String::as_str).to_string()),
        uid: labels.get(LABEL_UID).cloned(),
        namespace: labels.get(LABEL_NAMESPACE).cloned(),
        attempt: labels.get(LABEL_ATTEMPT).and_then(|a| a.parse().ok()),
    }
}

fn sandbox_state(phase: &str) -> kubeapi::PodSandboxState {
    if phase.eq_ignore_ascii_case(PHASE_RUNNING) {
        kubeapi::PodSandboxState::SandboxReady
    } else {
        kubeapi::PodSandboxState::SandboxNotready
    }
}

/// Translates hyperd pod info into a sandbox status.
pub fn pod_sandbox_status(info: &hyperd::PodInfo) -> kubeapi::PodSandboxStatus {
    let stored = info.spec.as_ref().map(|s| s.labels.clone()).unwrap_or_default();
    let (labels, annotations) = split_labels(&stored);

    let (phase, ip) = match &info.status {
        Some(status) => (status.phase.as_str(), status.pod_ip.first().cloned()),
        None => ("", None),
    };

    kubeapi::PodSandboxStatus {
        id: Some(info.pod_id.clone()),
        metadata: Some(sandbox_metadata(&stored, &info.pod_name)),
        state: Some(sandbox_state(phase) as i32),
        created_at: Some(seconds_to_nanos(info.created_at)),
        network: Some(kubeapi::PodSandboxNetworkStatus { ip }),
        labels,
        annotations,
    }
}

/// Translates one hyperd pod list entry into a sandbox.
pub fn pod_sandbox(result: &hyperd::PodListResult) -> kubeapi::PodSandbox {
    let (labels, _) = split_labels(&result.labels);
    kubeapi::PodSandbox {
        id: Some(result.pod_id.clone()),
        metadata: Some(sandbox_metadata(&result.labels, &result.pod_name)),
        state: Some(sandbox_state(&result.status) as i32),
        created_at: Some(seconds_to_nanos(result.created_at)),
        labels,
    }
}

/// Applies a kubelet sandbox filter. Unset filter fields match everything.
pub fn sandbox_matches(filter: &kubeapi::PodSandboxFilter, sandbox: &kubeapi::PodSandbox) -> bool {
    if let Some(id) = &filter.id {
        if sandbox.id.as_ref() != Some(id) {
            return false;
        }
    }
    if let Some(name) = &filter.name {
        let actual = sandbox.metadata.as_ref().and_then(|m| m.name.as_ref());
        if actual != Some(name) {
            return false;
        }
    }
    if let Some(state) = filter.state {
        if sandbox.state != Some(state) {
            return false;
        }
    }
    labels_match(&filter.label_selector, &sandbox.labels)
}
