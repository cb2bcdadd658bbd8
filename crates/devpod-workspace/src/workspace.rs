//! Deterministic object names derived from the workspace id

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Prefix shared by every object the provider names
const NAME_PREFIX: &str = "devpod";

/// Kubernetes object names cannot exceed this for the detection pod
const ARCH_POD_NAME_MAX: usize = 32;

/// A workspace as seen by the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceName {
    id: String,
    resource: String,
}

impl WorkspaceName {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let resource = format!("{NAME_PREFIX}-{id}");
        Self { id, resource }
    }

    /// The raw DevPod workspace id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name shared by the PVC, the pod and the role binding
    pub fn resource_name(&self) -> &str {
        &self.resource
    }

    pub fn pull_secret_name(&self) -> String {
        format!("{NAME_PREFIX}-pull-secret-{}", self.id)
    }

    /// Label selector matching this workspace's architecture-detection pods
    pub fn detection_selector(&self) -> String {
        format!("{}={}", devpod_common::WORKSPACE_LABEL, self.resource)
    }

    /// Fresh name for an architecture-detection pod
    pub fn arch_pod_name(&self) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(|c| char::from(c).to_ascii_lowercase())
            .collect();
        self.arch_pod_name_with_suffix(&suffix)
    }

    fn arch_pod_name_with_suffix(&self, suffix: &str) -> String {
        let budget = ARCH_POD_NAME_MAX.saturating_sub(suffix.len() + 1);
        let mut head: String = self.resource.chars().take(budget).collect();
        while head.ends_with('-') {
            head.pop();
        }
        format!("{head}-{suffix}")
    }
}

impl std::fmt::Display for WorkspaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.resource)
    }
}
