//! Locally stored registry credentials
//!
//! Credentials are looked up the way the docker CLI does it: a per-registry
//! credential helper wins, then inline `auths` entries, then the default
//! credentials store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use devpod_common::{Error, Result};

#[cfg(test)]
use mockall::automock;

/// How long a credential helper may take to answer
const HELPER_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials for one registry
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub server_url: String,
    pub username: String,
    pub secret: String,
}

impl RegistryCredentials {
    /// Token stored in the pull secret: `user:secret`, or the bare secret
    pub fn auth_token(&self) -> String {
        if self.username.is_empty() {
            self.secret.clone()
        } else {
            format!("{}:{}", self.username, self.secret)
        }
    }

    /// Credentials without a secret cannot authenticate anything
    pub fn is_complete(&self) -> bool {
        !self.secret.is_empty()
    }
}

/// Source of registry credentials
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Credentials for `registry`, or None when nothing is stored
    async fn lookup(&self, registry: &str) -> Result<Option<RegistryCredentials>>;
}

/// The docker CLI's `config.json` as far as credentials go
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DockerCliConfig {
    auths: BTreeMap<String, AuthEntry>,
    creds_store: Option<String>,
    cred_helpers: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AuthEntry {
    auth: Option<String>,
    username: Option<String>,
    password: Option<String>,
    identitytoken: Option<String>,
}

/// Reply of `docker-credential-<helper> get`
#[derive(Debug, Deserialize)]
struct HelperReply {
    #[serde(rename = "ServerURL", default)]
    server_url: String,
    #[serde(rename = "Username", default)]
    username: String,
    #[serde(rename = "Secret", default)]
    secret: String,
}

/// Reads credentials from the local docker configuration
#[derive(Clone, Debug)]
pub struct DockerCredentialStore {
    config_path: PathBuf,
}

impl DockerCredentialStore {
    pub fn new(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Store for `$DOCKER_CONFIG/config.json`, else `~/.docker/config.json`
    pub fn from_environment() -> Self {
        let dir = std::env::var_os("DOCKER_CONFIG")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|home| home.join(".docker")))
            .unwrap_or_else(|| PathBuf::from(".docker"));
        Self::new(dir.join("config.json"))
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    async fn load_config(&self) -> Result<Option<DockerCliConfig>> {
        let raw = match tokio::fs::read(&self.config_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::command(
                    format!("read {}", self.config_path.display()),
                    e.to_string(),
                ))
            }
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|e| Error::serialization_for_kind("DockerConfig", e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for DockerCredentialStore {
    async fn lookup(&self, registry: &str) -> Result<Option<RegistryCredentials>> {
        let Some(config) = self.load_config().await? else {
            trace!(path = %self.config_path.display(), "No docker config");
            return Ok(None);
        };
        let host = normalize_registry(registry);

        if let Some(helper) = config
            .cred_helpers
            .iter()
            .find(|(key, _)| normalize_registry(key) == host)
            .map(|(_, helper)| helper)
        {
            return run_helper(helper, registry).await;
        }

        if let Some((key, entry)) = config
            .auths
            .iter()
            .find(|(key, _)| normalize_registry(key) == host)
        {
            if let Some(credentials) = entry.credentials(key)? {
                return Ok(Some(credentials));
            }
        }

        match config.creds_store.as_deref().filter(|s| !s.is_empty()) {
            Some(store) => run_helper(store, registry).await,
            None => Ok(None),
        }
    }
}

impl AuthEntry {
    fn credentials(&self, server_url: &str) -> Result<Option<RegistryCredentials>> {
        let (mut username, mut secret) = match self.auth.as_deref().filter(|a| !a.is_empty()) {
            Some(auth) => decode_auth(auth)?,
            None => (
                self.username.clone().unwrap_or_default(),
                self.password.clone().unwrap_or_default(),
            ),
        };
        if let Some(token) = self.identitytoken.as_deref().filter(|t| !t.is_empty()) {
            secret = token.to_string();
            if username == "<token>" {
                username.clear();
            }
        }

        if username.is_empty() && secret.is_empty() {
            return Ok(None);
        }
        Ok(Some(RegistryCredentials {
            server_url: server_url.to_string(),
            username,
            secret,
        }))
    }
}

fn decode_auth(auth: &str) -> Result<(String, String)> {
    let decoded = STANDARD
        .decode(auth.trim())
        .map_err(|e| Error::serialization_for_kind("DockerConfig", e.to_string()))?;
    let decoded = String::from_utf8(decoded)
        .map_err(|e| Error::serialization_for_kind("DockerConfig", e.to_string()))?;
    match decoded.split_once(':') {
        Some((user, secret)) => Ok((user.to_string(), secret.to_string())),
        None => Err(Error::serialization_for_kind(
            "DockerConfig",
            "auth entry is not in user:secret form",
        )),
    }
}

/// Reduce a registry URL or config key to its host
///
/// All Docker Hub aliases collapse to `index.docker.io`.
pub fn normalize_registry(registry: &str) -> String {
    let without_scheme = registry
        .strip_prefix("https://")
        .or_else(|| registry.strip_prefix("http://"))
        .unwrap_or(registry);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    match host.as_str() {
        "docker.io" | "registry-1.docker.io" | "hub.docker.com" => "index.docker.io".to_string(),
        _ => host,
    }
}

/// Ask `docker-credential-<helper>` for the credentials of `registry`
async fn run_helper(helper: &str, registry: &str) -> Result<Option<RegistryCredentials>> {
    let program = format!("docker-credential-{helper}");
    debug!(helper = %program, registry, "Querying credential helper");

    let mut child = Command::new(&program)
        .arg("get")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::command(format!("run {program}"), e.to_string()))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(registry.as_bytes())
            .await
            .map_err(|e| Error::command(format!("run {program}"), e.to_string()))?;
    }

    let output = tokio::time::timeout(HELPER_TIMEOUT, child.wait_with_output())
        .await
        .map_err(|_| Error::command(format!("run {program}"), "credential helper timed out"))?
        .map_err(|e| Error::command(format!("run {program}"), e.to_string()))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !output.status.success() {
        if is_not_found(&stdout) {
            return Ok(None);
        }
        return Err(Error::command_with_stderr(
            format!("run {program}"),
            format!("exited with {}", output.status),
            String::from_utf8_lossy(&output.stderr),
        ));
    }
    parse_helper_reply(&stdout, registry)
}

fn is_not_found(output: &str) -> bool {
    output.to_ascii_lowercase().contains("credentials not found")
}

fn parse_helper_reply(stdout: &str, registry: &str) -> Result<Option<RegistryCredentials>> {
    let reply: HelperReply = serde_json::from_str(stdout.trim())
        .map_err(|e| Error::serialization_for_kind("CredentialHelperReply", e.to_string()))?;
    let server_url = if reply.server_url.is_empty() {
        registry.to_string()
    } else {
        reply.server_url
    };
    Ok(Some(RegistryCredentials {
        server_url,
        username: reply.username,
        secret: reply.secret,
    }))
}
