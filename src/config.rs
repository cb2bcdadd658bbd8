//! Provider configuration from flags and environment
//!
//! DevPod hands provider options over as environment variables; every
//! option can also be given as a flag, which wins. Empty values count as
//! unset.

use std::path::PathBuf;

use clap::Args;

use devpod_common::options::{parse_flag, parse_pod_timeout};
use devpod_common::{
    ClusterConnection, ComparableOptions, CompletedPodPolicy, Error, Options, Result,
};

/// Options shared by every provider command
#[derive(Args, Clone, Debug, Default)]
pub struct ProviderArgs {
    /// Workspace id
    #[arg(long, env = "DEVCONTAINER_ID")]
    pub devcontainer_id: Option<String>,

    /// kubeconfig context to use
    #[arg(long, env = "KUBERNETES_CONTEXT")]
    pub kubernetes_context: Option<String>,

    /// Path to the kubeconfig file
    #[arg(long, env = "KUBERNETES_CONFIG")]
    pub kubernetes_config: Option<String>,

    /// Namespace for workspace objects; defaults to the context's namespace
    #[arg(long, env = "KUBERNETES_NAMESPACE")]
    pub kubernetes_namespace: Option<String>,

    /// Copy local registry credentials into a pull secret ("true" to enable)
    #[arg(long, env = "KUBERNETES_PULL_SECRETS_ENABLED")]
    pub kubernetes_pull_secrets_enabled: Option<String>,

    /// Create the namespace if missing ("true" to enable)
    #[arg(long, env = "CREATE_NAMESPACE")]
    pub create_namespace: Option<String>,

    /// ClusterRole bound to the service account
    #[arg(long, env = "CLUSTER_ROLE")]
    pub cluster_role: Option<String>,

    /// Service account for the workspace pod
    #[arg(long, env = "SERVICE_ACCOUNT")]
    pub service_account: Option<String>,

    /// Image for helper pods and containers
    #[arg(long, env = "HELPER_IMAGE")]
    pub helper_image: Option<String>,

    /// Resources for the init container (`requests.cpu=100m,...`)
    #[arg(long, env = "HELPER_RESOURCES")]
    pub helper_resources: Option<String>,

    #[arg(long, env = "STORAGE_CLASS")]
    pub storage_class: Option<String>,

    /// Size of the workspace volume
    #[arg(long, env = "DISK_SIZE")]
    pub disk_size: Option<String>,

    /// RWO, ROX, RWX or RWOP
    #[arg(long, env = "PVC_ACCESS_MODE")]
    pub pvc_access_mode: Option<String>,

    /// Extra PVC annotations (`key=value,...`)
    #[arg(long, env = "PVC_ANNOTATIONS")]
    pub pvc_annotations: Option<String>,

    /// Node selector (`key=value,...`)
    #[arg(long, env = "NODE_SELECTOR")]
    pub node_selector: Option<String>,

    /// Resources for the workspace container (`requests.cpu=1,limits.memory=2Gi`)
    #[arg(long, env = "RESOURCES")]
    pub resources: Option<String>,

    /// Mount the workspace volume here instead of at the workspace folder
    #[arg(long, env = "WORKSPACE_VOLUME_MOUNT")]
    pub workspace_volume_mount: Option<String>,

    /// Pod manifest to start from
    #[arg(long, env = "POD_MANIFEST_TEMPLATE")]
    pub pod_manifest_template: Option<String>,

    /// Pod manifest for the architecture-detection pod
    #[arg(long, env = "ARCH_DETECTION_POD_MANIFEST_TEMPLATE")]
    pub arch_detection_pod_manifest_template: Option<String>,

    /// Extra pod labels (`key=value,...`)
    #[arg(long, env = "LABELS")]
    pub labels: Option<String>,

    /// Run this image instead of the one DevPod built
    #[arg(long, env = "DANGEROUSLY_OVERRIDE_IMAGE")]
    pub dangerously_override_image: Option<String>,

    /// Leave security contexts to the template ("true" to enable)
    #[arg(long, env = "STRICT_SECURITY")]
    pub strict_security: Option<String>,

    /// How long to wait for the pod, e.g. `10m` or `1h30m`
    #[arg(long, env = "POD_TIMEOUT")]
    pub pod_timeout: Option<String>,

    /// `restart` or `exit`
    #[arg(long, env = "COMPLETED_POD_POLICY")]
    pub completed_pod_policy: Option<String>,

    /// Allow `can-reprovision` to succeed ("true" to enable)
    #[arg(long, env = "REPROVISIONING_MODE")]
    pub reprovisioning_mode: Option<String>,
}

/// Trim `value` and drop it when empty
pub fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ProviderArgs {
    /// Validate into [`Options`]
    pub fn into_options(self) -> Result<Options> {
        let devcontainer_id = non_empty(self.devcontainer_id)
            .ok_or_else(|| Error::configuration("DEVCONTAINER_ID", "is required"))?;

        let comparable = ComparableOptions {
            pull_secrets_enabled: parse_flag(self.kubernetes_pull_secrets_enabled.as_deref()),
            create_namespace: parse_flag(self.create_namespace.as_deref()),
            cluster_role: non_empty(self.cluster_role),
            service_account: non_empty(self.service_account),
            helper_image: non_empty(self.helper_image),
            helper_resources: non_empty(self.helper_resources),
            storage_class: non_empty(self.storage_class),
            disk_size: non_empty(self.disk_size),
            pvc_access_mode: non_empty(self.pvc_access_mode),
            pvc_annotations: non_empty(self.pvc_annotations),
            node_selector: non_empty(self.node_selector),
            resources: non_empty(self.resources),
            workspace_volume_mount: non_empty(self.workspace_volume_mount),
            pod_manifest_template: non_empty(self.pod_manifest_template),
            arch_detection_pod_manifest_template: non_empty(
                self.arch_detection_pod_manifest_template,
            ),
            labels: non_empty(self.labels),
            dangerously_override_image: non_empty(self.dangerously_override_image),
            strict_security: parse_flag(self.strict_security.as_deref()),
        };

        let connection = ClusterConnection {
            context: non_empty(self.kubernetes_context),
            kubeconfig: non_empty(self.kubernetes_config).map(PathBuf::from),
            namespace: non_empty(self.kubernetes_namespace),
        };

        let completed_pod_policy = match non_empty(self.completed_pod_policy) {
            Some(raw) => raw.parse()?,
            None => CompletedPodPolicy::default(),
        };

        Ok(Options {
            devcontainer_id,
            comparable,
            connection,
            pod_timeout: parse_pod_timeout(self.pod_timeout.as_deref())?,
            completed_pod_policy,
            reprovisioning_mode: parse_flag(self.reprovisioning_mode.as_deref()),
        })
    }
}
