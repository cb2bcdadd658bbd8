//! Helper pod that reports the node architecture

use k8s_openapi::api::core::v1::{Container, Pod};

use devpod_common::WORKSPACE_LABEL;

use super::{
    merge_template_container, take_container, ManifestBuilder, DEFAULT_HELPER_IMAGE,
    DEV_CONTAINER_NAME,
};
use crate::workspace::WorkspaceName;

/// Prints the machine hardware name, then idles so the pod stays ready
const DETECTION_ARGS: [&str; 3] = ["sh", "-c", "uname -m && tail -f /dev/null"];

impl ManifestBuilder<'_> {
    /// Image used for helper pods
    pub fn helper_image(&self) -> &str {
        self.options()
            .helper_image
            .as_deref()
            .unwrap_or(DEFAULT_HELPER_IMAGE)
    }

    /// Build an architecture-detection pod named `name`
    ///
    /// `template` is the parsed `ARCH_DETECTION_POD_MANIFEST_TEMPLATE`. The pod
    /// carries the workspace label so the workspace pod can be scheduled next
    /// to it.
    pub fn build_arch_detection_pod(
        &self,
        workspace: &WorkspaceName,
        name: &str,
        template: Option<Pod>,
    ) -> Pod {
        let mut pod = template.unwrap_or_default();
        let mut pod_spec = pod.spec.take().unwrap_or_default();

        let mut labels = pod.metadata.labels.take().unwrap_or_default();
        labels.insert(
            WORKSPACE_LABEL.to_string(),
            workspace.resource_name().to_string(),
        );

        let mut container = Container {
            name: DEV_CONTAINER_NAME.to_string(),
            image: Some(self.helper_image().to_string()),
            args: Some(DETECTION_ARGS.iter().map(|a| a.to_string()).collect()),
            ..Default::default()
        };
        let (existing, mut containers) =
            take_container(std::mem::take(&mut pod_spec.containers), DEV_CONTAINER_NAME);
        if let Some(existing) = existing {
            container.resources = existing.resources.clone();
            merge_template_container(&mut container, existing);
        }
        containers.push(container);

        pod_spec.containers = containers;
        pod_spec.restart_policy = Some("Never".to_string());

        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some(self.namespace().to_string());
        pod.metadata.labels = Some(labels);
        pod.spec = Some(pod_spec);
        pod
    }
}
