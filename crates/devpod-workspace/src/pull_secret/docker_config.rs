//! `kubernetes.io/dockerconfigjson` payloads

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};

use devpod_common::{Error, Result};

use crate::manifest::created_labels;

/// Secret type for image pull secrets
pub const DOCKER_CONFIG_JSON_TYPE: &str = "kubernetes.io/dockerconfigjson";

/// Data key holding the docker config
pub const DOCKER_CONFIG_JSON_KEY: &str = ".dockerconfigjson";

/// Email recorded with every generated auth entry
pub const PULL_SECRET_EMAIL: &str = "noreply@loft.sh";

/// Docker config file shape stored in the secret
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfigJson {
    pub auths: BTreeMap<String, DockerConfigEntry>,
}

/// One registry's credentials
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerConfigEntry {
    /// base64 of `user:secret`, or of the bare secret
    pub auth: String,
    #[serde(default)]
    pub email: String,
}

impl DockerConfigJson {
    /// Config with a single registry entry for `auth_token`
    pub fn single(registry: &str, auth_token: &str) -> Self {
        let entry = DockerConfigEntry {
            auth: STANDARD.encode(auth_token),
            email: PULL_SECRET_EMAIL.to_string(),
        };
        Self {
            auths: BTreeMap::from([(registry.to_string(), entry)]),
        }
    }

    /// Serialized payload as stored under [`DOCKER_CONFIG_JSON_KEY`]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::serialization_for_kind("DockerConfigJson", e.to_string()))
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| Error::serialization_for_kind("DockerConfigJson", e.to_string()))
    }

    /// Decoded auth token for a registry
    pub fn auth_token(&self, registry: &str) -> Result<Option<String>> {
        let Some(entry) = self.auths.get(registry) else {
            return Ok(None);
        };
        let raw = STANDARD
            .decode(entry.auth.as_bytes())
            .map_err(|e| Error::serialization_for_kind("DockerConfigJson", e.to_string()))?;
        String::from_utf8(raw)
            .map(Some)
            .map_err(|e| Error::serialization_for_kind("DockerConfigJson", e.to_string()))
    }
}

/// Build the pull secret object
pub fn build_pull_secret(name: &str, namespace: &str, payload: Vec<u8>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(created_labels()),
            ..Default::default()
        },
        type_: Some(DOCKER_CONFIG_JSON_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            DOCKER_CONFIG_JSON_KEY.to_string(),
            ByteString(payload),
        )])),
        ..Default::default()
    }
}

/// The docker config payload of an existing secret, if it has one
pub fn secret_payload(secret: &Secret) -> Option<&[u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(DOCKER_CONFIG_JSON_KEY))
        .map(|bytes| bytes.0.as_slice())
}
