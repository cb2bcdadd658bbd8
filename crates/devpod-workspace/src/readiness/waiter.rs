//! Polling loop around [`tick`]

use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use devpod_common::{CompletedPodPolicy, Error, Result, Throttle};

use super::{false_conditions, tick, Tick};
use crate::cluster::{cancellable, WorkspaceCluster};

/// Interval between pod observations
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How a wait ended without error
#[derive(Clone, Debug, PartialEq)]
pub enum WaitOutcome {
    /// All containers are up
    Ready(Box<Pod>),
    /// The main container completed and the policy says to report it
    Exited(Box<Pod>),
    /// The pod disappeared while waiting
    Gone,
}

impl WaitOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Waits for a pod to become usable
pub struct ReadinessWaiter<'a> {
    cluster: &'a dyn WorkspaceCluster,
    cancel: &'a CancellationToken,
    timeout: Duration,
    policy: CompletedPodPolicy,
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(
        cluster: &'a dyn WorkspaceCluster,
        cancel: &'a CancellationToken,
        timeout: Duration,
        policy: CompletedPodPolicy,
    ) -> Self {
        Self {
            cluster,
            cancel,
            timeout,
            policy,
        }
    }

    /// Poll pod `name` until it is ready, gone, exited or has failed
    ///
    /// The first observation happens immediately. Critical container states
    /// end the wait with [`Error::CriticalWorkload`]; running out of time
    /// ends it with [`Error::Timeout`].
    pub async fn wait(&self, name: &str) -> Result<WaitOutcome> {
        let started = Instant::now();
        let mut throttle = Throttle::default();
        let mut interval = tokio::time::interval(POLL_INTERVAL);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Error::cancelled(format!("wait for pod {name}"))),
                _ = interval.tick() => {}
            }

            let pod = cancellable(self.cancel, "get pod", self.cluster.get_pod(name)).await?;
            let decision = tick(pod.as_ref(), self.policy);

            match (decision, pod) {
                (Tick::Gone, _) => {
                    debug!(pod = name, "Pod is gone");
                    return Ok(WaitOutcome::Gone);
                }
                (Tick::Ready, Some(pod)) => return Ok(WaitOutcome::Ready(Box::new(pod))),
                (Tick::Exited, Some(pod)) => {
                    info!(pod = name, "Pod has completed");
                    return Ok(WaitOutcome::Exited(Box::new(pod)));
                }
                (
                    Tick::Critical {
                        container,
                        reason,
                        message,
                    },
                    _,
                ) => return Err(Error::critical(name, container, reason, message)),
                (Tick::Recycle { container }, _) => {
                    debug!(pod = name, container = %container, "Delete pod because it has completed");
                    cancellable(self.cancel, "delete pod", self.cluster.delete_pod(name)).await?;
                }
                (Tick::Pending(reason), pod) => {
                    if throttle.allow() {
                        let mut lines = pod.as_ref().map(false_conditions).unwrap_or_default();
                        lines.push(reason);
                        info!(pod = name, "{}", lines.join("; "));
                    }
                }
                // ready and exited always come with a pod
                (Tick::Ready | Tick::Exited, None) => return Ok(WaitOutcome::Gone),
            }

            if started.elapsed() >= self.timeout {
                return Err(Error::timeout(name, self.timeout));
            }
        }
    }
}
