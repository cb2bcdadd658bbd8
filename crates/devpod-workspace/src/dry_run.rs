//! Offline cluster that records manifests instead of applying them
//!
//! Every lookup reports the object as absent, so a reconciliation against
//! the recorder walks the "fresh workspace" path and emits every object it
//! would create. Deletes are no-ops. Exec and logs are not available.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod, Secret, ServiceAccount};
use k8s_openapi::api::rbac::v1::RoleBinding;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use devpod_common::{Error, Result};

use crate::cluster::{ExecIo, WorkspaceCluster};

/// Placeholder written in place of secret payloads
pub const REDACTED: &str = "<redacted>";

/// Captures created objects as YAML documents
#[derive(Clone, Debug, Default)]
pub struct DryRunRecorder {
    manifests: Arc<Mutex<Vec<String>>>,
}

impl DryRunRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured documents in creation order
    pub fn manifests(&self) -> Vec<String> {
        self.manifests.lock().clone()
    }

    /// All documents joined into one multi-document YAML stream
    pub fn render(&self) -> String {
        self.manifests
            .lock()
            .iter()
            .map(|m| m.trim())
            .collect::<Vec<_>>()
            .join("\n---\n")
    }

    fn record<T: Serialize>(&self, kind: &str, object: &T) -> Result<()> {
        let yaml = serde_yaml::to_string(object)
            .map_err(|e| Error::serialization_for_kind(kind, e.to_string()))?;
        debug!(kind, "Captured manifest");
        self.manifests.lock().push(yaml);
        Ok(())
    }
}

fn redact(secret: &Secret) -> Secret {
    let mut redacted = secret.clone();
    let keys = redacted
        .data
        .take()
        .into_iter()
        .flat_map(BTreeMap::into_keys)
        .chain(
            redacted
                .string_data
                .take()
                .into_iter()
                .flat_map(BTreeMap::into_keys),
        );
    redacted.string_data = Some(keys.map(|k| (k, REDACTED.to_string())).collect());
    redacted
}

#[async_trait]
impl WorkspaceCluster for DryRunRecorder {
    async fn create_namespace(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn get_pvc(&self, _name: &str) -> Result<Option<PersistentVolumeClaim>> {
        Ok(None)
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<()> {
        self.record("PersistentVolumeClaim", pvc)
    }

    async fn delete_pvc(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn get_pod(&self, _name: &str) -> Result<Option<Pod>> {
        Ok(None)
    }

    async fn create_pod(&self, pod: &Pod) -> Result<()> {
        self.record("Pod", pod)
    }

    async fn delete_pod(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_pod_and_wait(&self, _name: &str, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    async fn list_pod_names(&self, _selector: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn force_delete_pods(&self, _selector: &str) -> Result<()> {
        Ok(())
    }

    async fn pod_logs(&self, pod: &str, _container: &str) -> Result<String> {
        Err(Error::command(
            format!("logs {pod}"),
            "not available in dry-run mode",
        ))
    }

    async fn exec(
        &self,
        pod: &str,
        _container: &str,
        _command: Vec<String>,
        _io: ExecIo,
    ) -> Result<()> {
        Err(Error::command(
            format!("exec in {pod}"),
            "not available in dry-run mode",
        ))
    }

    async fn get_secret(&self, _name: &str) -> Result<Option<Secret>> {
        Ok(None)
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        self.record("Secret", &redact(secret))
    }

    async fn delete_secret(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    async fn get_service_account(&self, _name: &str) -> Result<Option<ServiceAccount>> {
        Ok(None)
    }

    async fn create_service_account(&self, account: &ServiceAccount) -> Result<()> {
        self.record("ServiceAccount", account)
    }

    async fn get_role_binding(&self, _name: &str) -> Result<Option<RoleBinding>> {
        Ok(None)
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        self.record("RoleBinding", binding)
    }

    async fn delete_role_binding(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}
