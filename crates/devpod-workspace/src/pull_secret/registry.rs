//! Registry resolution for image references

use devpod_common::{Error, Result};

/// Credential key docker uses for Docker Hub
pub const OFFICIAL_DOCKER_REGISTRY: &str = "https://index.docker.io/v1/";

/// Hosts that all mean Docker Hub
const DOCKER_HUB_HOSTS: [&str; 4] = [
    "docker.io",
    "index.docker.io",
    "registry-1.docker.io",
    "hub.docker.com",
];

/// Registry host an image is pulled from
///
/// Images without an explicit host (`ubuntu`, `library/ubuntu`) and every
/// Docker Hub alias resolve to [`OFFICIAL_DOCKER_REGISTRY`]; any other host
/// is returned unchanged.
pub fn registry_for_image(image: &str) -> Result<String> {
    let invalid = |why: &str| {
        Error::serialization_for_kind("ImageReference", format!("invalid image '{image}': {why}"))
    };

    if image.is_empty() {
        return Err(invalid("empty reference"));
    }
    if image.chars().any(char::is_whitespace) {
        return Err(invalid("contains whitespace"));
    }

    let (host, path) = match image.split_once('/') {
        Some((first, rest)) if is_host(first) => (Some(first), rest),
        _ => (None, image),
    };

    let repository = path
        .split(['@', ':'])
        .next()
        .unwrap_or_default();
    if repository.is_empty() || repository.split('/').any(str::is_empty) {
        return Err(invalid("empty path component"));
    }
    if repository.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid("repository name must be lowercase"));
    }

    Ok(match host {
        Some(host) if !DOCKER_HUB_HOSTS.contains(&host) => host.to_string(),
        _ => OFFICIAL_DOCKER_REGISTRY.to_string(),
    })
}

fn is_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}
