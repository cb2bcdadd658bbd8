//! Init container that seeds named volumes from the image
//!
//! On the first run of a workspace each `volume` mount is staged at
//! `/<sub-path>` and the image's content at the mount target is copied in,
//! so the volume starts out with what the image shipped.

use k8s_openapi::api::core::v1::Container;

use devpod_common::Result;

use super::parse::parse_resources;
use super::pod::{pvc_volume_mount, root_security_context};
use super::{merge_template_container, take_container, ManifestBuilder, INIT_CONTAINER_NAME};
use crate::run_spec::RunSpecification;

impl ManifestBuilder<'_> {
    /// Init containers for the workspace pod
    ///
    /// Template init containers other than ours are always kept, ahead of
    /// ours. Ours is only added when initializing a workspace that has at
    /// least one volume mount.
    pub(super) fn init_containers(
        &self,
        spec: &RunSpecification,
        template: Vec<Container>,
        initialize: bool,
    ) -> Result<Vec<Container>> {
        let (existing, mut containers) = take_container(template, INIT_CONTAINER_NAME);
        if !initialize {
            return Ok(containers);
        }

        let mut volume_mounts = Vec::new();
        let mut commands = Vec::new();
        for (index, mount) in spec.mounts.iter().enumerate() {
            if !mount.is_volume() {
                continue;
            }
            let mut volume_mount = pvc_volume_mount(index + 1, mount);
            let copy_from = volume_mount.mount_path.trim_end_matches('/').to_string();
            let staged = format!("/{}", volume_mount.sub_path.as_deref().unwrap_or_default());
            commands.push(format!(
                "cp -a {copy_from}/. {}/ || true",
                staged.trim_end_matches('/')
            ));
            volume_mount.mount_path = staged;
            volume_mounts.push(volume_mount);
        }

        if volume_mounts.is_empty() {
            return Ok(containers);
        }

        let resources = self
            .options()
            .helper_resources
            .as_deref()
            .map(|raw| parse_resources("HELPER_RESOURCES", raw))
            .transpose()?;

        let mut init = Container {
            name: INIT_CONTAINER_NAME.to_string(),
            image: Some(self.image(spec)),
            command: Some(vec!["sh".to_string()]),
            args: Some(vec!["-c".to_string(), format!("{}\n", commands.join("\n"))]),
            resources,
            volume_mounts: Some(volume_mounts),
            security_context: root_security_context(self.options().strict_security, None, None),
            ..Default::default()
        };
        if let Some(existing) = existing {
            merge_template_container(&mut init, existing);
        }
        containers.push(init);
        Ok(containers)
    }
}
