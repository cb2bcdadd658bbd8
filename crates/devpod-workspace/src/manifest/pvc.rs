//! Persistent volume claim for workspace storage

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::warn;

use devpod_common::{Result, INFO_ANNOTATION, WORKSPACE_UID_LABEL};

use super::parse::{parse_key_values, parse_quantity};
use super::{created_labels, ManifestBuilder, DEFAULT_DISK_SIZE};
use crate::run_spec::ContainerInfo;
use crate::workspace::WorkspaceName;

/// Map the short `PVC_ACCESS_MODE` values to Kubernetes access modes
///
/// Anything unrecognized falls back to ReadWriteOnce.
pub fn access_mode(raw: Option<&str>) -> &'static str {
    match raw.map(str::trim) {
        Some("ROX") => "ReadOnlyMany",
        Some("RWX") => "ReadWriteMany",
        Some("RWOP") => "ReadWriteOncePod",
        _ => "ReadWriteOnce",
    }
}

impl ManifestBuilder<'_> {
    /// Build the PVC that stores the workspace and its persisted info
    pub fn build_pvc(
        &self,
        workspace: &WorkspaceName,
        info: &ContainerInfo,
    ) -> Result<PersistentVolumeClaim> {
        let options = self.options();
        let size = options.disk_size.as_deref().unwrap_or(DEFAULT_DISK_SIZE);
        let quantity = parse_quantity("DISK_SIZE", size)?;

        let mut labels = created_labels();
        labels.insert(WORKSPACE_UID_LABEL.to_string(), info.spec.uid.clone());

        let mut annotations = BTreeMap::new();
        if let Some(raw) = options.pvc_annotations.as_deref() {
            match parse_key_values("PVC_ANNOTATIONS", raw) {
                Ok(extra) => annotations.extend(extra),
                Err(e) => warn!(error = %e, "Ignoring unparsable PVC annotations"),
            }
        }
        // inserted last so extra annotations cannot shadow it
        annotations.insert(INFO_ANNOTATION.to_string(), info.to_annotation()?);

        Ok(PersistentVolumeClaim {
            metadata: ObjectMeta {
                name: Some(workspace.resource_name().to_string()),
                namespace: Some(self.namespace().to_string()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..Default::default()
            },
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec![
                    access_mode(options.pvc_access_mode.as_deref()).to_string()
                ]),
                resources: Some(VolumeResourceRequirements {
                    requests: Some(BTreeMap::from([("storage".to_string(), quantity)])),
                    ..Default::default()
                }),
                storage_class_name: options.storage_class.clone(),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}
