//! Error types for the hyperlet runtime shim.

use std::result;
use std::time::Duration;
use tonic::Status;

/// A specialized Result type for hyperlet operations.
pub type Result<T> = result::Result<T, Error>;

/// The error type for hyperlet operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────────────
    // Adapter Errors
    // ─────────────────────────────────────────────────────────────────────
    /// The operation has no translation onto the backend yet.
    #[error("{operation} is not implemented")]
    Unimplemented { operation: &'static str },

    /// A required request field was not set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    // ─────────────────────────────────────────────────────────────────────
    // Backend Errors
    // ─────────────────────────────────────────────────────────────────────
    /// The backend rejected the call. The status is kept verbatim.
    #[error("hyperd error: {}", .0.message())]
    Backend(#[from] Status),

    /// The backend did not answer within the configured deadline.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// The backend closed a stream before sending the expected message.
    #[error("hyperd closed the stream before {0}")]
    StreamClosed(&'static str),

    /// The backend reported a non-zero code while stopping a pod.
    #[error("stop pod {pod_id} failed with code {code}: {cause}")]
    PodStop {
        pod_id: String,
        code: i32,
        cause: String,
    },

    // ─────────────────────────────────────────────────────────────────────
    // Stream Relay Errors
    // ─────────────────────────────────────────────────────────────────────
    /// A local sink accepted fewer bytes than it was handed.
    #[error("short write: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// The session was cancelled by its owner.
    #[error("exec session cancelled")]
    Cancelled,

    /// Local I/O failure while relaying a stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────────────
    // Startup Errors
    // ─────────────────────────────────────────────────────────────────────
    /// The backend endpoint could not be turned into a URI.
    #[error("invalid hyperd endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// The backend reported a version string that is not semver.
    #[error("invalid hyperd version {version}: {reason}")]
    InvalidVersion { version: String, reason: String },

    /// The backend is older than the oldest supported release.
    #[error("hyperd version {found} is older than {minimum}")]
    UnsupportedVersion { found: String, minimum: &'static str },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Returns true if the error marks an operation that has no backend
    /// translation, as opposed to a genuine failure.
    pub fn is_unimplemented(&self) -> bool {
        matches!(self, Error::Unimplemented { .. })
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::Unimplemented { operation } => {
                Status::unimplemented(format!("{} is not implemented", operation))
            }
            Error::MissingField(field) => {
                Status::invalid_argument(format!("missing required field: {}", field))
            }
            Error::Backend(status) => status,
            Error::Timeout { operation, duration } => Status::deadline_exceeded(format!(
                "{} timed out after {:?}",
                operation, duration
            )),
            Error::Cancelled => Status::cancelled("exec session cancelled"),
            Error::StreamClosed(_) | Error::Transport(_) => Status::unavailable(err.to_string()),
            Error::InvalidEndpoint { .. } | Error::Config(_) => {
                Status::failed_precondition(err.to_string())
            }
            other => Status::internal(other.to_string()),
        }
    }
}
