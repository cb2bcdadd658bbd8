//! Error types for the DevPod Kubernetes provider
//!
//! Errors are structured with fields so a failure can be diagnosed from the
//! message alone: the workspace, the offending container and the captured
//! stderr of the cluster call travel with the error.

use std::time::Duration;

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for workspace operations
#[derive(Debug, Error)]
pub enum Error {
    /// A required option is missing or an option value cannot be parsed
    #[error("configuration error [{option}]: {message}")]
    Configuration {
        /// Name of the offending option (e.g. "DISK_SIZE")
        option: String,
        /// Description of what's invalid
        message: String,
    },

    /// A cluster call failed
    #[error("{operation} failed: {message}{}", stderr_suffix(.stderr))]
    Command {
        /// The cluster operation that failed (e.g. "create pod")
        operation: String,
        /// Description of what failed
        message: String,
        /// Captured stderr or API server message, if any
        stderr: Option<String>,
        /// Remote exit code for exec sessions
        exit_code: Option<i32>,
    },

    /// The readiness deadline elapsed while the pod was still starting
    #[error("timed out after {waited:?} waiting for pod '{workspace}' to become ready")]
    Timeout {
        /// Pod being waited on
        workspace: String,
        /// How long the waiter polled
        waited: Duration,
    },

    /// A container is in a state it will not recover from without intervention
    #[error("pod '{workspace}' container '{container}' failed: {message} ({reason})")]
    CriticalWorkload {
        /// Pod the container belongs to
        workspace: String,
        /// Name of the failing container
        container: String,
        /// Waiting or termination reason reported by the kubelet
        reason: String,
        /// Message reported alongside the reason
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// The operation was cancelled before it finished
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation in flight when cancellation arrived
        operation: String,
    },

    /// The workspace has never been created
    #[error("persistent volume '{workspace}' not found")]
    WorkspaceNotFound {
        /// Workspace resource name
        workspace: String,
    },

    /// No run specification was supplied and none is persisted
    #[error("no options provided and no persistent volume claim found for workspace '{workspace}'")]
    MissingSpecification {
        /// Workspace resource name
        workspace: String,
    },
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => format!(": {s}"),
        _ => String::new(),
    }
}

impl Error {
    /// Create a configuration error for the named option
    pub fn configuration(option: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Configuration {
            option: option.into(),
            message: msg.into(),
        }
    }

    /// Create a command error with the given message
    pub fn command(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Command {
            operation: operation.into(),
            message: msg.into(),
            stderr: None,
            exit_code: None,
        }
    }

    /// Create a command error carrying captured stderr
    pub fn command_with_stderr(
        operation: impl Into<String>,
        msg: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Command {
            operation: operation.into(),
            message: msg.into(),
            stderr: Some(stderr.into()),
            exit_code: None,
        }
    }

    /// Create a command error for a remote process that exited non-zero
    pub fn exited(operation: impl Into<String>, exit_code: i32, stderr: Option<String>) -> Self {
        Self::Command {
            operation: operation.into(),
            message: format!("exit code {exit_code}"),
            stderr,
            exit_code: Some(exit_code),
        }
    }

    /// Wrap a kube-rs error, keeping the API server's message as stderr
    pub fn kube(operation: impl Into<String>, source: kube::Error) -> Self {
        let stderr = match &source {
            kube::Error::Api(ae) => Some(ae.message.clone()),
            _ => None,
        };
        Self::Command {
            operation: operation.into(),
            message: source.to_string(),
            stderr,
            exit_code: None,
        }
    }

    /// Create a timeout error for a pod
    pub fn timeout(workspace: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            workspace: workspace.into(),
            waited,
        }
    }

    /// Create a critical workload error for a container
    pub fn critical(
        workspace: impl Into<String>,
        container: impl Into<String>,
        reason: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::CriticalWorkload {
            workspace: workspace.into(),
            container: container.into(),
            reason: reason.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a cancellation error for the named operation
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Get the workspace name if this error is associated with one
    pub fn workspace(&self) -> Option<&str> {
        match self {
            Error::Timeout { workspace, .. }
            | Error::CriticalWorkload { workspace, .. }
            | Error::WorkspaceNotFound { workspace }
            | Error::MissingSpecification { workspace } => Some(workspace),
            _ => None,
        }
    }

    /// Process exit code to report for this error
    ///
    /// Remote exit codes from exec sessions pass through unchanged.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Command {
                exit_code: Some(code),
                ..
            } => *code,
            Error::Cancelled { .. } => 130,
            _ => 1,
        }
    }

    /// Check if this error came from cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
