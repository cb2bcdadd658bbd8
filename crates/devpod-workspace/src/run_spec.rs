//! What a workspace container should look like, and how that is persisted
//!
//! The PVC is the only durable record of a workspace: its info annotation
//! carries the [`ContainerInfo`] so `start` can rebuild the pod without the
//! caller resending the run specification.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use devpod_common::{Error, Result};

/// Mount types that end up as volume mounts on the pod
pub const MOUNT_TYPE_BIND: &str = "bind";
pub const MOUNT_TYPE_VOLUME: &str = "volume";

/// Container run specification handed over by DevPod
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSpecification {
    /// Workspace UID, copied into the `devpod.sh/workspace-uid` label
    pub uid: String,
    pub user: String,
    pub image: String,
    pub entrypoint: String,
    /// Arguments passed to the entrypoint
    pub cmd: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cap_add: Vec<String>,
    pub security_opt: Vec<String>,
    /// Container labels as `key=value` entries
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    /// Resource string in the `requests.cpu=1,limits.memory=2Gi` format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_mount: Option<Mount>,
    pub mounts: Vec<Mount>,
}

impl RunSpecification {
    /// Decode the JSON passed in `DEVCONTAINER_RUN_OPTIONS`
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::serialization_for_kind("RunSpecification", e.to_string()))
    }

    /// Labels as a map; entries without `=` map to an empty value
    pub fn label_map(&self) -> BTreeMap<String, String> {
        self.labels
            .iter()
            .map(|entry| match entry.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (entry.clone(), String::new()),
            })
            .collect()
    }
}

/// A bind or volume mount
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mount {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
}

impl Mount {
    pub fn volume(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: MOUNT_TYPE_VOLUME.to_string(),
            source: source.into(),
            target: target.into(),
            other: Vec::new(),
        }
    }

    pub fn bind(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            kind: MOUNT_TYPE_BIND.to_string(),
            source: source.into(),
            target: target.into(),
            other: Vec::new(),
        }
    }

    pub fn is_volume(&self) -> bool {
        self.kind == MOUNT_TYPE_VOLUME
    }

    /// Only bind and volume mounts can be expressed on the pod
    pub fn is_supported(&self) -> bool {
        self.kind == MOUNT_TYPE_BIND || self.kind == MOUNT_TYPE_VOLUME
    }
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type={},src={},dst={}", self.kind, self.source, self.target)?;
        for extra in &self.other {
            write!(f, ",{extra}")?;
        }
        Ok(())
    }
}

/// Persisted workspace record stored in the PVC info annotation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    #[serde(rename = "workspaceId", alias = "WorkspaceID")]
    pub workspace_id: String,
    #[serde(alias = "Options")]
    pub spec: RunSpecification,
}

impl ContainerInfo {
    pub fn new(workspace_id: impl Into<String>, spec: RunSpecification) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            spec,
        }
    }

    pub fn to_annotation(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::serialization_for_kind("ContainerInfo", e.to_string()))
    }

    pub fn from_annotation(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::serialization_for_kind("ContainerInfo", e.to_string()))
    }
}
