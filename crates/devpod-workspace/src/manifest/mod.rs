//! Manifest generation for workspace objects
//!
//! [`ManifestBuilder`] turns a run specification plus the manifest-affecting
//! options into concrete PVC and pod objects. Every build starts from
//! scratch (or from a user-supplied template); nothing here talks to the
//! cluster.
//!
//! Template merge rules for a container that the template pre-declares under
//! one of our names:
//! - its env vars come first, followed by ours
//! - its ports, `envFrom` and `imagePullPolicy` are kept as-is
//! - its volume mounts come first, followed by ours
//! - its security context is kept only when ours is empty

mod detection;
mod init_container;
mod parse;
mod pod;
mod pvc;
mod template;

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Container;

use devpod_common::{ComparableOptions, CREATED_LABEL};

pub use parse::{parse_key_values, parse_quantity, parse_resources};
pub use pod::PodPlacement;
pub use template::load_pod_template;

/// Name of the workspace container
pub const DEV_CONTAINER_NAME: &str = "devpod";

/// Name of the init container that seeds volume mounts
pub const INIT_CONTAINER_NAME: &str = "devpod-init";

/// Name of the pod volume backed by the workspace PVC
pub const PVC_VOLUME_NAME: &str = "devpod";

/// PVC size when `DISK_SIZE` is unset
pub const DEFAULT_DISK_SIZE: &str = "10Gi";

/// Image for helper pods when `HELPER_IMAGE` is unset
pub const DEFAULT_HELPER_IMAGE: &str = "busybox:latest";

/// Builds workspace manifests for one namespace
#[derive(Clone, Copy, Debug)]
pub struct ManifestBuilder<'a> {
    options: &'a ComparableOptions,
    namespace: &'a str,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(options: &'a ComparableOptions, namespace: &'a str) -> Self {
        Self { options, namespace }
    }

    pub fn options(&self) -> &ComparableOptions {
        self.options
    }

    pub fn namespace(&self) -> &str {
        self.namespace
    }
}

/// Labels stamped on every object the provider creates
pub fn created_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(CREATED_LABEL.to_string(), "true".to_string())])
}

/// Split template containers into the one named `name` and the rest
///
/// Every container carrying `name` is removed; the last one is returned.
fn take_container(containers: Vec<Container>, name: &str) -> (Option<Container>, Vec<Container>) {
    let mut existing = None;
    let mut others = Vec::with_capacity(containers.len());
    for container in containers {
        if container.name == name {
            existing = Some(container);
        } else {
            others.push(container);
        }
    }
    (existing, others)
}

/// Fold a template's definition of a container into the one we built
fn merge_template_container(built: &mut Container, template: Container) {
    built.env = concat(template.env, built.env.take());
    built.volume_mounts = concat(template.volume_mounts, built.volume_mounts.take());
    built.env_from = template.env_from;
    built.ports = template.ports;
    built.image_pull_policy = template.image_pull_policy;
    if built.security_context.is_none() {
        built.security_context = template.security_context;
    }
}

fn concat<T>(first: Option<Vec<T>>, second: Option<Vec<T>>) -> Option<Vec<T>> {
    match (first, second) {
        (None, None) => None,
        (first, second) => {
            let mut out = first.unwrap_or_default();
            out.extend(second.unwrap_or_default());
            Some(out)
        }
    }
}
