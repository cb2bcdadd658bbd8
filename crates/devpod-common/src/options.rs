//! Provider options
//!
//! Options split into two groups. [`ComparableOptions`] holds everything that
//! shapes generated manifests; a snapshot of it is stored on every pod and
//! compared on the next run to decide whether the pod must be recreated.
//! Everything else (how to reach the cluster, how long to wait) lives on
//! [`Options`] directly and never triggers a recreate.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::parse_duration;
use crate::{Error, Result};

/// Readiness deadline used when `POD_TIMEOUT` is unset
pub const DEFAULT_POD_TIMEOUT: Duration = Duration::from_secs(600);

/// Interpret a provider flag value; only "true" (any case) enables it
pub fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
}

/// Parse `POD_TIMEOUT`, falling back to [`DEFAULT_POD_TIMEOUT`] when unset
pub fn parse_pod_timeout(value: Option<&str>) -> Result<Duration> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(DEFAULT_POD_TIMEOUT),
        Some(v) => parse_duration(v).map_err(|e| Error::configuration("POD_TIMEOUT", e)),
    }
}

/// Manifest-affecting provider configuration
///
/// Every field is a plain value so equality stays a straight comparison.
/// Add new fields to [`ComparableOptions::eq`] as well; the destructuring
/// there makes forgetting one a compile error.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComparableOptions {
    #[serde(skip_serializing_if = "is_false")]
    pub pull_secrets_enabled: bool,
    #[serde(skip_serializing_if = "is_false")]
    pub create_namespace: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helper_resources: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvc_access_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvc_annotations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_volume_mount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_manifest_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arch_detection_pod_manifest_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dangerously_override_image: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub strict_security: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl PartialEq for ComparableOptions {
    fn eq(&self, other: &Self) -> bool {
        let Self {
            pull_secrets_enabled,
            create_namespace,
            cluster_role,
            service_account,
            helper_image,
            helper_resources,
            storage_class,
            disk_size,
            pvc_access_mode,
            pvc_annotations,
            node_selector,
            resources,
            workspace_volume_mount,
            pod_manifest_template,
            arch_detection_pod_manifest_template,
            labels,
            dangerously_override_image,
            strict_security,
        } = self;

        *pull_secrets_enabled == other.pull_secrets_enabled
            && *create_namespace == other.create_namespace
            && *cluster_role == other.cluster_role
            && *service_account == other.service_account
            && *helper_image == other.helper_image
            && *helper_resources == other.helper_resources
            && *storage_class == other.storage_class
            && *disk_size == other.disk_size
            && *pvc_access_mode == other.pvc_access_mode
            && *pvc_annotations == other.pvc_annotations
            && *node_selector == other.node_selector
            && *resources == other.resources
            && *workspace_volume_mount == other.workspace_volume_mount
            && *pod_manifest_template == other.pod_manifest_template
            && *arch_detection_pod_manifest_template == other.arch_detection_pod_manifest_template
            && *labels == other.labels
            && *dangerously_override_image == other.dangerously_override_image
            && *strict_security == other.strict_security
    }
}

impl Eq for ComparableOptions {}

impl ComparableOptions {
    /// Serialize as the last-applied-configuration snapshot
    pub fn to_snapshot(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::serialization_for_kind("ComparableOptions", e.to_string()))
    }

    /// Decode a last-applied-configuration snapshot
    pub fn from_snapshot(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::serialization_for_kind("ComparableOptions", e.to_string()))
    }
}

/// How to reach the cluster; never part of change detection
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterConnection {
    /// kubeconfig context (`KUBERNETES_CONTEXT`)
    pub context: Option<String>,
    /// kubeconfig path (`KUBERNETES_CONFIG`)
    pub kubeconfig: Option<PathBuf>,
    /// Namespace for all workspace objects (`KUBERNETES_NAMESPACE`)
    pub namespace: Option<String>,
}

/// What the readiness waiter does when the main container exits with code 0
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompletedPodPolicy {
    /// Delete the pod and keep waiting for a fresh one
    #[default]
    Restart,
    /// Report the pod as finished
    Exit,
}

impl FromStr for CompletedPodPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "restart" => Ok(Self::Restart),
            "exit" => Ok(Self::Exit),
            other => Err(Error::configuration(
                "COMPLETED_POD_POLICY",
                format!("unknown policy '{other}', expected 'restart' or 'exit'"),
            )),
        }
    }
}

impl fmt::Display for CompletedPodPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restart => write!(f, "restart"),
            Self::Exit => write!(f, "exit"),
        }
    }
}

/// Fully validated provider configuration
#[derive(Clone, Debug)]
pub struct Options {
    /// Workspace id as handed over by DevPod (`DEVCONTAINER_ID`)
    pub devcontainer_id: String,
    pub comparable: ComparableOptions,
    pub connection: ClusterConnection,
    /// Readiness deadline
    pub pod_timeout: Duration,
    pub completed_pod_policy: CompletedPodPolicy,
    pub reprovisioning_mode: bool,
}

impl Options {
    /// Options for a workspace with everything else defaulted
    pub fn for_workspace(devcontainer_id: impl Into<String>) -> Self {
        Self {
            devcontainer_id: devcontainer_id.into(),
            comparable: ComparableOptions::default(),
            connection: ClusterConnection::default(),
            pod_timeout: DEFAULT_POD_TIMEOUT,
            completed_pod_policy: CompletedPodPolicy::default(),
            reprovisioning_mode: false,
        }
    }
}

impl fmt::Display for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("")
        }
        let c = &self.comparable;

        writeln!(f, "DevContainerID: {}", self.devcontainer_id)?;
        writeln!(f, "Namespace: {}", show(&self.connection.namespace))?;
        writeln!(f, "Context: {}", show(&self.connection.context))?;
        writeln!(
            f,
            "KubeConfig: {}",
            self.connection
                .kubeconfig
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        )?;
        writeln!(f, "KubernetesPullSecretsEnabled: {}", c.pull_secrets_enabled)?;
        writeln!(f, "CreateNamespace: {}", c.create_namespace)?;
        writeln!(f, "ClusterRole: {}", show(&c.cluster_role))?;
        writeln!(f, "ServiceAccount: {}", show(&c.service_account))?;
        writeln!(f, "HelperImage: {}", show(&c.helper_image))?;
        writeln!(f, "HelperResources: {}", show(&c.helper_resources))?;
        writeln!(f, "StorageClass: {}", show(&c.storage_class))?;
        writeln!(f, "DiskSize: {}", show(&c.disk_size))?;
        writeln!(f, "PvcAccessMode: {}", show(&c.pvc_access_mode))?;
        writeln!(f, "PvcAnnotations: {}", show(&c.pvc_annotations))?;
        writeln!(f, "NodeSelector: {}", show(&c.node_selector))?;
        writeln!(f, "Resources: {}", show(&c.resources))?;
        writeln!(f, "WorkspaceVolumeMount: {}", show(&c.workspace_volume_mount))?;
        writeln!(f, "PodManifestTemplate: {}", show(&c.pod_manifest_template))?;
        writeln!(
            f,
            "ArchDetectionPodManifestTemplate: {}",
            show(&c.arch_detection_pod_manifest_template)
        )?;
        writeln!(f, "Labels: {}", show(&c.labels))?;
        writeln!(
            f,
            "DangerouslyOverrideImage: {}",
            show(&c.dangerously_override_image)
        )?;
        writeln!(f, "StrictSecurity: {}", c.strict_security)?;
        writeln!(f, "PodTimeout: {:?}", self.pod_timeout)?;
        write!(f, "CompletedPodPolicy: {}", self.completed_pod_policy)
    }
}
