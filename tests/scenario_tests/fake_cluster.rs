//! In-memory cluster for scenario tests
//!
//! Objects live in maps keyed by name. Created pods come up immediately:
//! init containers report completed, main containers report running and
//! ready. Deletes take effect at once.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStatus,
    PersistentVolumeClaim, Pod, PodStatus, Secret, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use parking_lot::Mutex;
use tokio::io::AsyncWriteExt;

use devpod_common::{Error, Result, WORKSPACE_LABEL};
use devpod_workspace::{CredentialStore, ExecIo, RegistryCredentials, WorkspaceCluster};

#[derive(Default)]
struct State {
    namespaces: Vec<String>,
    pvcs: BTreeMap<String, PersistentVolumeClaim>,
    pods: BTreeMap<String, Pod>,
    secrets: BTreeMap<String, Secret>,
    service_accounts: BTreeMap<String, ServiceAccount>,
    role_bindings: BTreeMap<String, RoleBinding>,
    /// Every mutating call, in order, as "verb kind/name"
    calls: Vec<String>,
}

pub struct FakeCluster {
    state: Mutex<State>,
    /// What `uname -m` prints inside architecture detection pods
    uname: String,
    /// Exit code returned by every exec
    exec_exit_code: i32,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::with_uname("x86_64")
    }

    pub fn with_uname(uname: &str) -> Self {
        Self {
            state: Mutex::new(State::default()),
            uname: uname.to_string(),
            exec_exit_code: 0,
        }
    }

    pub fn failing_exec(exit_code: i32) -> Self {
        Self {
            exec_exit_code: exit_code,
            ..Self::new()
        }
    }

    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.state.lock().pods.get(name).cloned()
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.state.lock().pods.keys().cloned().collect()
    }

    pub fn pvc(&self, name: &str) -> Option<PersistentVolumeClaim> {
        self.state.lock().pvcs.get(name).cloned()
    }

    pub fn secret(&self, name: &str) -> Option<Secret> {
        self.state.lock().secrets.get(name).cloned()
    }

    pub fn role_binding(&self, name: &str) -> Option<RoleBinding> {
        self.state.lock().role_bindings.get(name).cloned()
    }

    pub fn has_service_account(&self, name: &str) -> bool {
        self.state.lock().service_accounts.contains_key(name)
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state.lock().namespaces.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.pvcs.is_empty()
            && state.pods.is_empty()
            && state.secrets.is_empty()
            && state.role_bindings.is_empty()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

fn matches_selector(pod: &Pod, selector: &str) -> bool {
    let Some((key, value)) = selector.split_once('=') else {
        return false;
    };
    pod.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .is_some_and(|v| v == value)
}

fn completed(name: &str) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        state: Some(ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code: 0,
                reason: Some("Completed".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn ready(name: &str) -> ContainerStatus {
    ContainerStatus {
        name: name.to_string(),
        ready: true,
        started: Some(true),
        state: Some(ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// The pod as the kubelet would report it once everything started
fn started(mut pod: Pod) -> Pod {
    let spec = pod.spec.clone().unwrap_or_default();
    pod.status = Some(PodStatus {
        phase: Some("Running".to_string()),
        init_container_statuses: spec
            .init_containers
            .map(|c| c.iter().map(|c| completed(&c.name)).collect()),
        container_statuses: Some(spec.containers.iter().map(|c| ready(&c.name)).collect()),
        ..Default::default()
    });
    pod
}

fn name_of(metadata: &ObjectMeta) -> Result<String> {
    metadata
        .name
        .clone()
        .ok_or_else(|| Error::command("create", "object has no name"))
}

#[async_trait]
impl WorkspaceCluster for FakeCluster {
    async fn create_namespace(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if !state.namespaces.iter().any(|n| n == name) {
            state.namespaces.push(name.to_string());
        }
        Ok(())
    }

    async fn get_pvc(&self, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        Ok(self.pvc(name))
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<()> {
        let name = name_of(&pvc.metadata)?;
        self.record(format!("create pvc/{name}"));
        self.state.lock().pvcs.insert(name, pvc.clone());
        Ok(())
    }

    async fn delete_pvc(&self, name: &str) -> Result<()> {
        self.record(format!("delete pvc/{name}"));
        self.state.lock().pvcs.remove(name);
        Ok(())
    }

    async fn get_pod(&self, name: &str) -> Result<Option<Pod>> {
        Ok(self.pod(name))
    }

    async fn create_pod(&self, pod: &Pod) -> Result<()> {
        let name = name_of(&pod.metadata)?;
        self.record(format!("create pod/{name}"));
        let mut state = self.state.lock();
        if state.pods.contains_key(&name) {
            return Err(Error::command("create pod", format!("pod {name} already exists")));
        }
        state.pods.insert(name, started(pod.clone()));
        Ok(())
    }

    async fn delete_pod(&self, name: &str) -> Result<()> {
        self.record(format!("delete pod/{name}"));
        self.state.lock().pods.remove(name);
        Ok(())
    }

    async fn delete_pod_and_wait(&self, name: &str, _timeout: Duration) -> Result<()> {
        self.delete_pod(name).await
    }

    async fn list_pod_names(&self, selector: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .lock()
            .pods
            .iter()
            .filter(|(_, pod)| matches_selector(pod, selector))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn force_delete_pods(&self, selector: &str) -> Result<()> {
        self.record(format!("force-delete pods/{selector}"));
        self.state
            .lock()
            .pods
            .retain(|_, pod| !matches_selector(pod, selector));
        Ok(())
    }

    async fn pod_logs(&self, pod: &str, _container: &str) -> Result<String> {
        let state = self.state.lock();
        let Some(found) = state.pods.get(pod) else {
            return Err(Error::command("logs", format!("pod {pod} not found")));
        };
        if is_detection(found) {
            return Ok(format!("{}\n", self.uname));
        }
        Ok("workspace started\n".to_string())
    }

    async fn exec(
        &self,
        pod: &str,
        _container: &str,
        command: Vec<String>,
        mut io: ExecIo,
    ) -> Result<()> {
        if self.pod(pod).is_none() {
            return Err(Error::command("exec", format!("pod {pod} not found")));
        }
        let line = format!("{}\n", command.join(" "));
        io.stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::command("exec", e.to_string()))?;
        if self.exec_exit_code != 0 {
            return Err(Error::exited("exec", self.exec_exit_code, None));
        }
        Ok(())
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.secret(name))
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        let name = name_of(&secret.metadata)?;
        self.record(format!("create secret/{name}"));
        self.state.lock().secrets.insert(name, secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        self.record(format!("delete secret/{name}"));
        self.state.lock().secrets.remove(name);
        Ok(())
    }

    async fn get_service_account(&self, name: &str) -> Result<Option<ServiceAccount>> {
        Ok(self.state.lock().service_accounts.get(name).cloned())
    }

    async fn create_service_account(&self, account: &ServiceAccount) -> Result<()> {
        let name = name_of(&account.metadata)?;
        self.record(format!("create serviceaccount/{name}"));
        self.state
            .lock()
            .service_accounts
            .insert(name, account.clone());
        Ok(())
    }

    async fn get_role_binding(&self, name: &str) -> Result<Option<RoleBinding>> {
        Ok(self.role_binding(name))
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        let name = name_of(&binding.metadata)?;
        self.record(format!("create rolebinding/{name}"));
        self.state.lock().role_bindings.insert(name, binding.clone());
        Ok(())
    }

    async fn delete_role_binding(&self, name: &str) -> Result<()> {
        self.record(format!("delete rolebinding/{name}"));
        self.state.lock().role_bindings.remove(name);
        Ok(())
    }
}

fn is_detection(pod: &Pod) -> bool {
    pod.metadata
        .labels
        .as_ref()
        .is_some_and(|labels| labels.contains_key(WORKSPACE_LABEL))
}

/// Credential store with a fixed answer for every registry
pub struct StaticCredentials(pub Option<RegistryCredentials>);

impl StaticCredentials {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn for_user(username: &str, secret: &str) -> Self {
        Self(Some(RegistryCredentials {
            server_url: String::new(),
            username: username.to_string(),
            secret: secret.to_string(),
        }))
    }
}

#[async_trait]
impl CredentialStore for StaticCredentials {
    async fn lookup(&self, registry: &str) -> Result<Option<RegistryCredentials>> {
        Ok(self.0.clone().map(|mut creds| {
            creds.server_url = registry.to_string();
            creds
        }))
    }
}
