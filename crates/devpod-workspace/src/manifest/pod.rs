//! Workspace pod
//!
//! The pod is rebuilt on every run, either from a minimal default or from the
//! configured template, and merged with the run specification.

use std::path::Path;

use k8s_openapi::api::core::v1::{
    Affinity, Capabilities, Container, EnvVar, LocalObjectReference,
    PersistentVolumeClaimVolumeSource, Pod, PodAffinity, PodAffinityTerm, PodSpec,
    ResourceRequirements, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use tracing::{debug, warn};

use devpod_common::{Error, Result, WORKSPACE_LABEL, WORKSPACE_UID_LABEL};

use super::parse::{parse_key_values, parse_resources};
use super::{
    created_labels, merge_template_container, take_container, ManifestBuilder,
    DEV_CONTAINER_NAME, PVC_VOLUME_NAME,
};
use crate::run_spec::{Mount, RunSpecification};
use crate::workspace::WorkspaceName;

const HOSTNAME_TOPOLOGY_KEY: &str = "kubernetes.io/hostname";

/// Cluster-side decisions made before the pod is built
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodPlacement {
    /// Service account to run the pod as
    pub service_account: Option<String>,
    /// Pull secret to attach; only set when the secret exists for this image
    pub pull_secret: Option<String>,
    /// Workspace whose architecture-detection pod the new pod should join
    pub affinity_workspace: Option<String>,
}

/// Volume mount for the n-th mount of a workspace, stored on the PVC
///
/// Named volumes keep their data under their source name so it survives
/// reordering; everything else is keyed by position.
pub(crate) fn pvc_volume_mount(index: usize, mount: &Mount) -> VolumeMount {
    let sub_path = if mount.is_volume() && !mount.source.is_empty() {
        mount
            .source
            .strip_prefix('/')
            .unwrap_or(&mount.source)
            .to_string()
    } else {
        index.to_string()
    };

    VolumeMount {
        name: PVC_VOLUME_NAME.to_string(),
        mount_path: mount.target.clone(),
        sub_path: Some(format!("devpod/{sub_path}")),
        ..Default::default()
    }
}

/// Root security context, or none in strict mode
pub(crate) fn root_security_context(
    strict: bool,
    capabilities: Option<Capabilities>,
    privileged: Option<bool>,
) -> Option<SecurityContext> {
    (!strict).then(|| SecurityContext {
        capabilities,
        privileged,
        run_as_user: Some(0),
        run_as_group: Some(0),
        run_as_non_root: Some(false),
        ..Default::default()
    })
}

impl ManifestBuilder<'_> {
    /// The workspace mount with the `WORKSPACE_VOLUME_MOUNT` override applied
    pub fn workspace_mount(&self, spec: &RunSpecification) -> Result<Mount> {
        let mut mount = spec
            .workspace_mount
            .clone()
            .filter(|m| !m.target.is_empty())
            .ok_or_else(|| {
                Error::configuration("DEVCONTAINER_RUN_OPTIONS", "workspace mount target is empty")
            })?;

        if let Some(volume_mount) = self.options().workspace_volume_mount.as_deref() {
            if Path::new(&mount.target).starts_with(volume_mount) {
                debug!(mount = volume_mount, "Using workspace volume mount");
                mount.target = volume_mount.to_string();
            } else {
                warn!(
                    workspace_volume_mount = volume_mount,
                    mount_target = %mount.target,
                    "Workspace volume mount needs to be the same as the workspace mount or a parent, skipping option"
                );
            }
        }
        Ok(mount)
    }

    /// Build the workspace pod
    ///
    /// `template` is the parsed `POD_MANIFEST_TEMPLATE`, if any. `initialize`
    /// is set on the first run of a workspace and adds the init container
    /// that seeds named volumes.
    pub fn build_pod(
        &self,
        workspace: &WorkspaceName,
        spec: &RunSpecification,
        template: Option<Pod>,
        initialize: bool,
        placement: &PodPlacement,
    ) -> Result<Pod> {
        let options = self.options();
        let workspace_mount = self.workspace_mount(spec)?;

        let mut pod = template.unwrap_or_else(|| Pod {
            spec: Some(PodSpec {
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut pod_spec = pod.spec.take().unwrap_or_default();

        // labels: template, then LABELS, then ours
        let mut labels = pod.metadata.labels.take().unwrap_or_default();
        if let Some(raw) = options.labels.as_deref() {
            labels.extend(parse_key_values("LABELS", raw)?);
        }
        labels.extend(created_labels());
        labels.insert(WORKSPACE_UID_LABEL.to_string(), spec.uid.clone());

        let mut node_selector = pod_spec.node_selector.take().unwrap_or_default();
        if let Some(raw) = options.node_selector.as_deref() {
            node_selector.extend(parse_key_values("NODE_SELECTOR", raw)?);
        }

        let resources = self.container_resources(spec, &pod_spec.containers)?;

        let mut volume_mounts = vec![pvc_volume_mount(0, &workspace_mount)];
        for (index, mount) in spec.mounts.iter().enumerate() {
            if mount.is_supported() {
                volume_mounts.push(pvc_volume_mount(index + 1, mount));
            } else {
                warn!(
                    mount_type = %mount.kind,
                    mount = %mount,
                    "Unsupported mount type, will skip"
                );
            }
        }

        let capabilities = (!spec.cap_add.is_empty()).then(|| Capabilities {
            add: Some(spec.cap_add.clone()),
            drop: None,
        });
        let env: Vec<EnvVar> = spec
            .env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: Some(value.clone()),
                ..Default::default()
            })
            .collect();

        let mut container = Container {
            name: DEV_CONTAINER_NAME.to_string(),
            image: Some(self.image(spec)),
            command: Some(vec![spec.entrypoint.clone()]),
            args: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
            env: (!env.is_empty()).then_some(env),
            resources: Some(resources),
            volume_mounts: Some(volume_mounts),
            security_context: root_security_context(
                options.strict_security,
                capabilities,
                spec.privileged,
            ),
            ..Default::default()
        };

        let (existing, mut containers) =
            take_container(std::mem::take(&mut pod_spec.containers), DEV_CONTAINER_NAME);
        if let Some(existing) = existing {
            merge_template_container(&mut container, existing);
        }
        containers.push(container);
        pod_spec.containers = containers;

        let template_init = pod_spec.init_containers.take().unwrap_or_default();
        let init_containers = self.init_containers(spec, template_init, initialize)?;
        pod_spec.init_containers = (!init_containers.is_empty()).then_some(init_containers);

        let mut volumes = vec![Volume {
            name: PVC_VOLUME_NAME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: workspace.resource_name().to_string(),
                read_only: None,
            }),
            ..Default::default()
        }];
        volumes.extend(pod_spec.volumes.take().unwrap_or_default());
        pod_spec.volumes = Some(volumes);

        pod_spec.node_selector = (!node_selector.is_empty()).then_some(node_selector);
        if let Some(account) = &placement.service_account {
            pod_spec.service_account_name = Some(account.clone());
        }
        if let Some(secret) = &placement.pull_secret {
            pod_spec.image_pull_secrets = Some(vec![LocalObjectReference {
                name: secret.clone(),
            }]);
        }
        if let Some(target) = &placement.affinity_workspace {
            if options.node_selector.is_none() {
                self.add_workspace_affinity(&mut pod_spec, target);
            }
        }

        pod.metadata.name = Some(workspace.resource_name().to_string());
        pod.metadata.namespace = Some(self.namespace().to_string());
        pod.metadata.labels = Some(labels);
        pod.spec = Some(pod_spec);
        Ok(pod)
    }

    /// Image for workspace containers, honoring `DANGEROUSLY_OVERRIDE_IMAGE`
    pub(crate) fn image(&self, spec: &RunSpecification) -> String {
        self.options()
            .dangerously_override_image
            .clone()
            .unwrap_or_else(|| spec.image.clone())
    }

    /// Resources for the workspace container
    ///
    /// The template's workspace container (or its first container) sets the
    /// default, the run specification replaces it and `RESOURCES` replaces
    /// both.
    fn container_resources(
        &self,
        spec: &RunSpecification,
        template_containers: &[Container],
    ) -> Result<ResourceRequirements> {
        if let Some(raw) = self.options().resources.as_deref() {
            return parse_resources("RESOURCES", raw);
        }
        if let Some(raw) = spec.resources.as_deref().filter(|r| !r.trim().is_empty()) {
            return parse_resources("DEVCONTAINER_RUN_OPTIONS", raw);
        }

        Ok(template_containers
            .iter()
            .find(|c| c.name == DEV_CONTAINER_NAME)
            .or_else(|| template_containers.first())
            .and_then(|c| c.resources.clone())
            .unwrap_or_default())
    }

    fn add_workspace_affinity(&self, pod_spec: &mut PodSpec, workspace: &str) {
        debug!(workspace, "Add pod affinity to architecture detection pod");
        let term = PodAffinityTerm {
            label_selector: Some(LabelSelector {
                match_expressions: Some(vec![LabelSelectorRequirement {
                    key: WORKSPACE_LABEL.to_string(),
                    operator: "In".to_string(),
                    values: Some(vec![workspace.to_string()]),
                }]),
                match_labels: None,
            }),
            namespaces: Some(vec![self.namespace().to_string()]),
            topology_key: HOSTNAME_TOPOLOGY_KEY.to_string(),
            ..Default::default()
        };

        let affinity = pod_spec.affinity.get_or_insert_with(Affinity::default);
        let pod_affinity = affinity.pod_affinity.get_or_insert_with(PodAffinity::default);
        pod_affinity
            .required_during_scheduling_ignored_during_execution
            .get_or_insert_with(Vec::new)
            .push(term);
    }
}
