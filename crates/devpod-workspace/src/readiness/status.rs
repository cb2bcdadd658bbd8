//! Container status classification

use k8s_openapi::api::core::v1::ContainerStatus;

/// Waiting reasons the kubelet will not recover from on its own
pub const CRITICAL_WAITING_REASONS: [&str; 8] = [
    "Error",
    "Unknown",
    "ImagePullBackOff",
    "CrashLoopBackOff",
    "RunContainerError",
    "ErrImagePull",
    "CreateContainerConfigError",
    "InvalidImageName",
];

/// What a single container status means for readiness
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContainerOutcome {
    /// Running and passing its readiness checks
    Ready,
    /// Running but not (yet) ready
    Running,
    /// Waiting for something that normally resolves (pulling, creating)
    WaitingTransient { reason: String, message: String },
    /// Waiting with a reason from [`CRITICAL_WAITING_REASONS`]
    WaitingCritical { reason: String, message: String },
    /// Exited with code 0
    TerminatedSuccess,
    /// Exited with a non-zero code
    TerminatedFailure {
        exit_code: i32,
        reason: String,
        message: String,
    },
}

/// Classify one container status
///
/// A status without any state is treated as waiting.
pub fn classify(status: &ContainerStatus) -> ContainerOutcome {
    let state = status.state.as_ref();

    if let Some(waiting) = state.and_then(|s| s.waiting.as_ref()) {
        let reason = waiting.reason.clone().unwrap_or_default();
        let message = waiting.message.clone().unwrap_or_default();
        return if CRITICAL_WAITING_REASONS.contains(&reason.as_str()) {
            ContainerOutcome::WaitingCritical { reason, message }
        } else {
            ContainerOutcome::WaitingTransient { reason, message }
        };
    }

    if let Some(terminated) = state.and_then(|s| s.terminated.as_ref()) {
        return if terminated.exit_code == 0 {
            ContainerOutcome::TerminatedSuccess
        } else {
            ContainerOutcome::TerminatedFailure {
                exit_code: terminated.exit_code,
                reason: terminated.reason.clone().unwrap_or_default(),
                message: terminated.message.clone().unwrap_or_default(),
            }
        };
    }

    if state.and_then(|s| s.running.as_ref()).is_some() {
        return if status.ready {
            ContainerOutcome::Ready
        } else {
            ContainerOutcome::Running
        };
    }

    ContainerOutcome::WaitingTransient {
        reason: String::new(),
        message: String::new(),
    }
}
