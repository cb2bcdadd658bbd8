//! Pod readiness
//!
//! Readiness is decided one observation at a time by [`tick`], a pure
//! function over the pod as last fetched. [`ReadinessWaiter`] drives it on
//! a fixed interval until the pod is ready, has failed for good or the
//! deadline passes.

mod status;
mod waiter;

use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod};

use devpod_common::CompletedPodPolicy;

pub use status::{classify, ContainerOutcome, CRITICAL_WAITING_REASONS};
pub use waiter::{ReadinessWaiter, WaitOutcome, POLL_INTERVAL};

/// Decision for one observation of a pod
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Tick {
    /// The pod no longer exists
    Gone,
    /// Every container is up
    Ready,
    /// Not there yet; the message says why
    Pending(String),
    /// The main container finished; delete the pod and keep waiting
    Recycle { container: String },
    /// The main container finished and the pod should be reported as exited
    Exited,
    /// A container failed in a way that will not resolve by waiting
    Critical {
        container: String,
        reason: String,
        message: String,
    },
}

/// Decide what one observation of `pod` means
pub fn tick(pod: Option<&Pod>, policy: CompletedPodPolicy) -> Tick {
    let Some(pod) = pod else {
        return Tick::Gone;
    };
    let name = pod.metadata.name.as_deref().unwrap_or_default();

    if pod.metadata.deletion_timestamp.is_some() {
        return Tick::Pending(format!("Waiting, since pod '{name}' is terminating"));
    }

    let declared = pod.spec.as_ref().map(|s| s.containers.len()).unwrap_or(0);
    let status = pod.status.as_ref();
    let container_statuses = status
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default();
    if container_statuses.len() < declared {
        return Tick::Pending(format!("Waiting, since pod '{name}' is starting"));
    }

    let init_specs = pod
        .spec
        .as_ref()
        .and_then(|s| s.init_containers.as_deref())
        .unwrap_or_default();
    let init_statuses = status
        .and_then(|s| s.init_container_statuses.as_deref())
        .unwrap_or_default();
    for init in init_statuses {
        if let Some(decision) = init_tick(name, init, init_specs) {
            return decision;
        }
    }

    for container in container_statuses {
        let which = &container.name;
        match classify(container) {
            ContainerOutcome::Ready => {}
            ContainerOutcome::TerminatedSuccess => {
                return match policy {
                    CompletedPodPolicy::Restart => Tick::Recycle {
                        container: which.clone(),
                    },
                    CompletedPodPolicy::Exit => Tick::Exited,
                }
            }
            ContainerOutcome::WaitingCritical { reason, message } => {
                return Tick::Critical {
                    container: which.clone(),
                    reason,
                    message,
                }
            }
            ContainerOutcome::TerminatedFailure {
                reason, message, ..
            } => {
                return Tick::Critical {
                    container: which.clone(),
                    reason,
                    message,
                }
            }
            ContainerOutcome::WaitingTransient { reason, message } => {
                return Tick::Pending(format!(
                    "Waiting, since pod '{name}' container '{which}' is waiting to start: {message} ({reason})"
                ))
            }
            ContainerOutcome::Running => {
                return Tick::Pending(format!(
                    "Waiting, since pod '{name}' container '{which}' is not ready yet"
                ))
            }
        }
    }

    Tick::Ready
}

fn init_tick(pod: &str, status: &ContainerStatus, specs: &[Container]) -> Option<Tick> {
    let which = &status.name;
    let outcome = classify(status);
    match &outcome {
        ContainerOutcome::WaitingCritical { reason, message }
        | ContainerOutcome::TerminatedFailure {
            reason, message, ..
        } => {
            return Some(Tick::Critical {
                container: which.clone(),
                reason: reason.clone(),
                message: message.clone(),
            })
        }
        ContainerOutcome::WaitingTransient { reason, message } => {
            return Some(Tick::Pending(format!(
                "Waiting, since pod '{pod}' init container '{which}' is waiting to start: {message} ({reason})"
            )))
        }
        _ => {}
    }

    // sidecars (restartPolicy Always) keep running; they only need to be up
    let restartable = specs
        .iter()
        .find(|c| &c.name == which)
        .and_then(|c| c.restart_policy.as_deref())
        == Some("Always");
    if restartable {
        if status.started != Some(true) || !status.ready {
            return Some(Tick::Pending(format!(
                "Waiting, since pod '{pod}' init container '{which}' is not ready yet"
            )));
        }
    } else if matches!(outcome, ContainerOutcome::Running | ContainerOutcome::Ready) {
        return Some(Tick::Pending(format!(
            "Waiting, since pod '{pod}' init container '{which}' is running"
        )));
    }
    None
}

/// Diagnostic lines for every pod condition that is False
pub fn false_conditions(pod: &Pod) -> Vec<String> {
    let conditions = pod
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();

    let mut lines = Vec::new();
    for condition in conditions.iter().filter(|c| c.status == "False") {
        lines.push(format!("Condition \"{}\" is False", condition.type_));
        if let Some(reason) = condition.reason.as_deref().filter(|r| !r.is_empty()) {
            lines.push(format!("{} Reason: {}", condition.type_, reason));
        }
        if let Some(message) = condition.message.as_deref().filter(|m| !m.is_empty()) {
            lines.push(format!("{} Message: {}", condition.type_, message));
        }
    }
    lines
}
