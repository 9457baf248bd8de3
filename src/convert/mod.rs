//! Translation between the kubelet runtime API and the hyperd PublicAPI.
//!
//! Everything here is pure: no I/O, no errors. Fields that are absent on one
//! side are left at the other side's defaults.

pub mod container;
pub mod image;
pub mod pod;

use std::collections::HashMap;

/// Label carrying the sandbox or container name.
pub const LABEL_NAME: &str = "io.kubernetes.hyperlet.name";
/// Label carrying the pod namespace.
pub const LABEL_NAMESPACE: &str = "io.kubernetes.hyperlet.namespace";
/// Label carrying the pod uid.
pub const LABEL_UID: &str = "io.kubernetes.hyperlet.uid";
/// Label carrying the creation attempt counter.
pub const LABEL_ATTEMPT: &str = "io.kubernetes.hyperlet.attempt";
/// Prefix under which kubelet annotations are stored as hyperd labels.
pub const ANNOTATION_PREFIX: &str = "io.kubernetes.hyperlet.annotation/";

/// Returns true when every selector entry is present in `labels`.
pub fn labels_match(selector: &HashMap<String, String>, labels: &HashMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

/// Splits hyperd labels back into user labels and annotations, dropping the
/// metadata keys written on create.
pub(crate) fn split_labels(
    stored: &HashMap<String, String>,
) -> (HashMap<String, String>, HashMap<String, String>) {
    let mut labels = HashMap::new();
    let mut annotations = HashMap::new();
    for (key, value) in stored {
        if let Some(name) = key.strip_prefix(ANNOTATION_PREFIX) {
            annotations.insert(name.to_string(), value.clone());
        } else if !is_metadata_key(key) {
            labels.insert(key.clone(), value.clone());
        }
    }
    (labels, annotations)
}

/// Merges user labels and annotations into the single hyperd label map.
pub(crate) fn merge_labels(
    labels: &HashMap<String, String>,
    annotations: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = labels.clone();
    for (key, value) in annotations {
        merged.insert(format!("{}{}", ANNOTATION_PREFIX, key), value.clone());
    }
    merged
}

fn is_metadata_key(key: &str) -> bool {
    matches!(key, LABEL_NAME | LABEL_NAMESPACE | LABEL_UID | LABEL_ATTEMPT)
}

/// Parses an RFC 3339 timestamp into Unix nanoseconds. Empty or malformed
/// input yields 0.
pub fn rfc3339_to_nanos(timestamp: &str) -> i64 {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .ok()
        .and_then(|t| t.timestamp_nanos_opt())
        .unwrap_or(0)
}

/// Converts a hyperd creation time in seconds to nanoseconds.
pub(crate) fn seconds_to_nanos(seconds: i64) -> i64 {
    seconds.saturating_mul(1_000_000_000)
}
