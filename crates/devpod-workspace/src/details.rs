//! Container details reported by `find`
//!
//! Field names follow the `docker inspect` casing DevPod reads.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use serde::{Deserialize, Serialize};

use crate::run_spec::ContainerInfo;

pub const STATUS_RUNNING: &str = "running";
pub const STATUS_EXITED: &str = "exited";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetails {
    #[serde(rename = "ID", default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "Created", default, skip_serializing_if = "String::is_empty")]
    pub created: String,
    #[serde(rename = "State", default)]
    pub state: ContainerState,
    #[serde(rename = "Config", default)]
    pub config: ContainerConfig,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerState {
    #[serde(rename = "Status", default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(rename = "StartedAt", default, skip_serializing_if = "String::is_empty")]
    pub started_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(rename = "Labels", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ContainerDetails {
    /// Details for a workspace whose PVC exists
    ///
    /// `running` is the pod when it came up; without it the workspace is
    /// reported as exited and started at PVC creation.
    pub fn from_objects(
        pvc: &PersistentVolumeClaim,
        info: &ContainerInfo,
        running: Option<&Pod>,
    ) -> Self {
        let created = timestamp(pvc.metadata.creation_timestamp.as_ref());
        let (status, started_at) = match running {
            Some(pod) => (
                STATUS_RUNNING,
                timestamp(pod.metadata.creation_timestamp.as_ref()),
            ),
            None => (STATUS_EXITED, created.clone()),
        };

        Self {
            id: pvc.metadata.name.clone().unwrap_or_default(),
            created,
            state: ContainerState {
                status: status.to_string(),
                started_at,
            },
            config: ContainerConfig {
                labels: info.spec.label_map(),
            },
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.status == STATUS_RUNNING
    }
}

fn timestamp(time: Option<&Time>) -> String {
    time.map(|t| t.0.to_rfc3339()).unwrap_or_default()
}
