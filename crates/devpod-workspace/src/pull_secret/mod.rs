//! Image pull secret lifecycle
//!
//! One secret per workspace, holding the local credentials for the
//! registry of the workspace image. The secret is replaced (delete, then
//! create) whenever its payload no longer matches; it is never patched.

mod credentials;
mod docker_config;
mod registry;

use tracing::{debug, info};

use devpod_common::Result;

use crate::cluster::WorkspaceCluster;

pub use credentials::{
    normalize_registry, CredentialStore, DockerCredentialStore, RegistryCredentials,
};
pub use docker_config::{
    build_pull_secret, secret_payload, DockerConfigEntry, DockerConfigJson,
    DOCKER_CONFIG_JSON_KEY, DOCKER_CONFIG_JSON_TYPE, PULL_SECRET_EMAIL,
};
pub use registry::{registry_for_image, OFFICIAL_DOCKER_REGISTRY};

#[cfg(test)]
pub use credentials::MockCredentialStore;

/// What [`PullSecretManager::ensure`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullSecretOutcome {
    /// A secret was created (or replaced) in this call
    Created,
    /// The existing secret already holds the current credentials
    Unchanged,
    /// No usable local credentials; nothing was touched
    NoCredentials,
}

impl PullSecretOutcome {
    pub fn created(&self) -> bool {
        matches!(self, Self::Created)
    }

    /// Whether the secret exists with current credentials and can be used
    pub fn attachable(&self) -> bool {
        matches!(self, Self::Created | Self::Unchanged)
    }
}

/// Keeps a workspace's pull secret in sync with local credentials
pub struct PullSecretManager<'a> {
    cluster: &'a dyn WorkspaceCluster,
    credentials: &'a dyn CredentialStore,
    namespace: &'a str,
}

impl<'a> PullSecretManager<'a> {
    pub fn new(
        cluster: &'a dyn WorkspaceCluster,
        credentials: &'a dyn CredentialStore,
        namespace: &'a str,
    ) -> Self {
        Self {
            cluster,
            credentials,
            namespace,
        }
    }

    /// Make sure secret `name` holds the credentials for `image`'s registry
    ///
    /// Missing or incomplete credentials are not an error.
    pub async fn ensure(&self, name: &str, image: &str) -> Result<PullSecretOutcome> {
        debug!(secret = name, "Ensure pull secret");
        let registry = registry_for_image(image)?;

        let credentials = match self.credentials.lookup(&registry).await {
            Ok(Some(credentials)) if credentials.is_complete() => credentials,
            Ok(_) => {
                debug!(registry = %registry, "No credentials for registry");
                return Ok(PullSecretOutcome::NoCredentials);
            }
            Err(e) => {
                debug!(registry = %registry, error = %e, "Couldn't retrieve credentials for registry");
                return Ok(PullSecretOutcome::NoCredentials);
            }
        };

        let key = if credentials.server_url.is_empty() {
            registry.as_str()
        } else {
            credentials.server_url.as_str()
        };
        let payload = DockerConfigJson::single(key, &credentials.auth_token()).to_bytes()?;

        if let Some(existing) = self.cluster.get_secret(name).await? {
            if secret_payload(&existing) == Some(payload.as_slice()) {
                debug!(secret = name, "Pull secret is up to date");
                return Ok(PullSecretOutcome::Unchanged);
            }
            debug!(secret = name, "Pull secret changed, recreating");
            self.cluster.delete_secret(name).await?;
        }

        self.cluster
            .create_secret(&build_pull_secret(name, self.namespace, payload))
            .await?;
        info!(secret = name, "Pull secret created");
        Ok(PullSecretOutcome::Created)
    }

    /// Delete secret `name`; a missing secret is not an error
    pub async fn delete(&self, name: &str) -> Result<()> {
        if self.cluster.get_secret(name).await?.is_none() {
            debug!(secret = name, "Pull secret does not exist");
            return Ok(());
        }
        self.cluster.delete_secret(name).await
    }

    /// Decoded auth token stored in secret `name` for `registry`
    pub async fn read_contents(&self, name: &str, registry: &str) -> Result<Option<String>> {
        let Some(secret) = self.cluster.get_secret(name).await? else {
            return Ok(None);
        };
        let Some(payload) = secret_payload(&secret) else {
            return Ok(None);
        };
        let config = DockerConfigJson::from_bytes(payload)?;

        let wanted = normalize_registry(registry);
        match config
            .auths
            .keys()
            .find(|key| normalize_registry(key) == wanted)
        {
            Some(key) => config.auth_token(key),
            None => Ok(None),
        }
    }
}
