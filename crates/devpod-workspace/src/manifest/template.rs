//! User-supplied pod templates

use std::path::Path;

use k8s_openapi::api::core::v1::Pod;

use devpod_common::{Error, Result};

/// Read a pod manifest template from a YAML (or JSON) file
pub fn load_pod_template(option: &str, path: impl AsRef<Path>) -> Result<Pod> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|e| {
        Error::configuration(
            option,
            format!("failed to read pod template {}: {}", path.display(), e),
        )
    })?;
    serde_yaml::from_str(&raw).map_err(|e| {
        Error::configuration(
            option,
            format!("failed to parse pod template {}: {}", path.display(), e),
        )
    })
}
