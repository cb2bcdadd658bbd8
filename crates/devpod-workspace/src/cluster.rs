//! Cluster access for workspace objects
//!
//! [`WorkspaceCluster`] is the seam between the reconciler and the API
//! server. [`KubeCluster`] is the real implementation over kube-rs; the
//! dry-run recorder implements the same trait without touching a cluster.
//! All methods operate in the namespace the implementation was built for.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Namespace, PersistentVolumeClaim, Pod, Secret, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::RoleBinding;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, AttachParams, DeleteParams, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use devpod_common::{ClusterConnection, Error, Result};

#[cfg(test)]
use mockall::automock;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for a pod deletion to finish
const DELETE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period for workspace pod deletion
pub const POD_DELETE_GRACE_SECONDS: u32 = 10;

/// Grace period for workspace PVC deletion
pub const PVC_DELETE_GRACE_SECONDS: u32 = 5;

/// Streams wired to a remote exec session
pub struct ExecIo {
    pub stdin: Option<Box<dyn AsyncRead + Send + Unpin>>,
    pub stdout: Box<dyn AsyncWrite + Send + Unpin>,
    pub stderr: Box<dyn AsyncWrite + Send + Unpin>,
}

impl ExecIo {
    /// Wire the session to this process's stdio
    pub fn stdio(attach_stdin: bool) -> Self {
        Self {
            stdin: attach_stdin
                .then(|| Box::new(tokio::io::stdin()) as Box<dyn AsyncRead + Send + Unpin>),
            stdout: Box::new(tokio::io::stdout()),
            stderr: Box::new(tokio::io::stderr()),
        }
    }
}

/// Trait abstracting the cluster operations the reconciler needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkspaceCluster: Send + Sync {
    /// Create a namespace; an existing namespace is not an error
    async fn create_namespace(&self, name: &str) -> Result<()>;

    async fn get_pvc(&self, name: &str) -> Result<Option<PersistentVolumeClaim>>;
    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<()>;
    /// Delete a PVC, ignoring a missing one
    async fn delete_pvc(&self, name: &str) -> Result<()>;

    async fn get_pod(&self, name: &str) -> Result<Option<Pod>>;
    async fn create_pod(&self, pod: &Pod) -> Result<()>;
    /// Delete a pod without waiting, ignoring a missing one
    async fn delete_pod(&self, name: &str) -> Result<()>;
    /// Delete a pod and block until the API server no longer returns it
    async fn delete_pod_and_wait(&self, name: &str, timeout: Duration) -> Result<()>;
    /// Names of the pods matching a label selector
    async fn list_pod_names(&self, selector: &str) -> Result<Vec<String>>;
    /// Delete every pod matching a label selector with no grace period
    async fn force_delete_pods(&self, selector: &str) -> Result<()>;
    async fn pod_logs(&self, pod: &str, container: &str) -> Result<String>;
    /// Run a command in a container, streaming through `io`
    ///
    /// A non-zero remote exit status is returned as [`Error::Command`] with
    /// the exit code set.
    async fn exec(&self, pod: &str, container: &str, command: Vec<String>, io: ExecIo)
        -> Result<()>;

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>>;
    async fn create_secret(&self, secret: &Secret) -> Result<()>;
    async fn delete_secret(&self, name: &str) -> Result<()>;

    async fn get_service_account(&self, name: &str) -> Result<Option<ServiceAccount>>;
    async fn create_service_account(&self, account: &ServiceAccount) -> Result<()>;

    async fn get_role_binding(&self, name: &str) -> Result<Option<RoleBinding>>;
    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<()>;
    /// Delete a role binding, ignoring a missing one
    async fn delete_role_binding(&self, name: &str) -> Result<()>;
}

/// Race a cluster call against cancellation
pub async fn cancellable<T>(
    cancel: &CancellationToken,
    operation: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        result = fut => result,
    }
}

/// Build a kube client for the configured kubeconfig and context
///
/// Returns the client and the namespace to operate in: the configured one,
/// else the kubeconfig context's default.
pub async fn connect(connection: &ClusterConnection) -> Result<(Client, String)> {
    let options = KubeConfigOptions {
        context: connection.context.clone(),
        ..Default::default()
    };

    let mut config = match (&connection.kubeconfig, &connection.context) {
        (Some(path), _) => {
            let kubeconfig = read_kubeconfig(path)?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| {
                    Error::configuration(
                        "KUBERNETES_CONFIG",
                        format!("failed to load kubeconfig: {}", e),
                    )
                })?
        }
        (None, Some(_)) => Config::from_kubeconfig(&options).await.map_err(|e| {
            Error::configuration(
                "KUBERNETES_CONTEXT",
                format!("failed to load kubeconfig context: {}", e),
            )
        })?,
        (None, None) => Config::infer().await.map_err(|e| {
            Error::configuration(
                "KUBERNETES_CONFIG",
                format!("failed to infer config: {}", e),
            )
        })?,
    };
    // exec sessions can sit idle for a long time, so only the connect
    // timeout is tightened
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);

    let namespace = connection
        .namespace
        .clone()
        .unwrap_or_else(|| config.default_namespace.clone());
    debug!(namespace = %namespace, "Use Kubernetes namespace");

    let client = Client::try_from(config)
        .map_err(|e| Error::command("create client", e.to_string()))?;
    Ok((client, namespace))
}

fn read_kubeconfig(path: &Path) -> Result<Kubeconfig> {
    Kubeconfig::read_from(path).map_err(|e| {
        Error::configuration(
            "KUBERNETES_CONFIG",
            format!("failed to read kubeconfig {}: {}", path.display(), e),
        )
    })
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// Real implementation of WorkspaceCluster over kube-rs
pub struct KubeCluster {
    client: Client,
    namespace: String,
}

impl KubeCluster {
    /// Create a new KubeCluster for one namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    async fn get_opt<K>(&self, kind: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        self.api::<K>()
            .get_opt(name)
            .await
            .map_err(|e| Error::kube(format!("get {kind} {name}"), e))
    }

    async fn create<K>(&self, kind: &str, object: &K) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Serialize
            + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let name = object.meta().name.clone().unwrap_or_default();
        self.api::<K>()
            .create(&PostParams::default(), object)
            .await
            .map(|_| ())
            .map_err(|e| Error::kube(format!("create {kind} {name}"), e))
    }

    async fn delete_ignore_missing<K>(
        &self,
        kind: &str,
        name: &str,
        grace_period_seconds: Option<u32>,
    ) -> Result<()>
    where
        K: Resource<Scope = NamespaceResourceScope> + Clone + DeserializeOwned + std::fmt::Debug,
        <K as Resource>::DynamicType: Default,
    {
        let params = DeleteParams {
            grace_period_seconds,
            ..Default::default()
        };
        match self.api::<K>().delete(name, &params).await {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => {
                trace!(kind, name, "Already deleted");
                Ok(())
            }
            Err(e) => Err(Error::kube(format!("delete {kind} {name}"), e)),
        }
    }
}

#[async_trait]
impl WorkspaceCluster for KubeCluster {
    async fn create_namespace(&self, name: &str) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        match api.create(&PostParams::default(), &namespace).await {
            Ok(_) => Ok(()),
            Err(e) if is_conflict(&e) => Ok(()),
            Err(e) => Err(Error::kube(format!("create namespace {name}"), e)),
        }
    }

    async fn get_pvc(&self, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        self.get_opt("pvc", name).await
    }

    async fn create_pvc(&self, pvc: &PersistentVolumeClaim) -> Result<()> {
        self.create("pvc", pvc).await
    }

    async fn delete_pvc(&self, name: &str) -> Result<()> {
        self.delete_ignore_missing::<PersistentVolumeClaim>(
            "pvc",
            name,
            Some(PVC_DELETE_GRACE_SECONDS),
        )
        .await
    }

    async fn get_pod(&self, name: &str) -> Result<Option<Pod>> {
        self.get_opt("pod", name).await
    }

    async fn create_pod(&self, pod: &Pod) -> Result<()> {
        self.create("pod", pod).await
    }

    async fn delete_pod(&self, name: &str) -> Result<()> {
        self.delete_ignore_missing::<Pod>("pod", name, Some(POD_DELETE_GRACE_SECONDS))
            .await
    }

    async fn delete_pod_and_wait(&self, name: &str, timeout: Duration) -> Result<()> {
        let Some(existing) = self.get_pod(name).await? else {
            return Ok(());
        };
        let uid = existing.metadata.uid;
        self.delete_ignore_missing::<Pod>("pod", name, None).await?;

        let wait = async {
            loop {
                match self.get_pod(name).await? {
                    None => return Ok(()),
                    // a pod with the same name but another uid is a replacement
                    Some(pod) if pod.metadata.uid != uid => return Ok(()),
                    Some(_) => {
                        trace!(pod = name, "Waiting for pod deletion");
                        tokio::time::sleep(DELETE_POLL_INTERVAL).await;
                    }
                }
            }
        };
        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            Error::command(
                format!("delete pod {name}"),
                format!("pod still present after {timeout:?}"),
            )
        })?
    }

    async fn list_pod_names(&self, selector: &str) -> Result<Vec<String>> {
        let pods = self
            .api::<Pod>()
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|e| Error::kube(format!("list pods {selector}"), e))?;
        Ok(pods
            .items
            .into_iter()
            .filter_map(|p| p.metadata.name)
            .collect())
    }

    async fn force_delete_pods(&self, selector: &str) -> Result<()> {
        let params = DeleteParams {
            grace_period_seconds: Some(0),
            ..Default::default()
        };
        self.api::<Pod>()
            .delete_collection(&params, &ListParams::default().labels(selector))
            .await
            .map(|_| ())
            .map_err(|e| Error::kube(format!("delete pods {selector}"), e))
    }

    async fn pod_logs(&self, pod: &str, container: &str) -> Result<String> {
        let params = LogParams {
            container: Some(container.to_string()),
            ..Default::default()
        };
        self.api::<Pod>()
            .logs(pod, &params)
            .await
            .map_err(|e| Error::kube(format!("logs {pod}"), e))
    }

    async fn exec(
        &self,
        pod: &str,
        container: &str,
        command: Vec<String>,
        io: ExecIo,
    ) -> Result<()> {
        let ExecIo {
            stdin,
            mut stdout,
            mut stderr,
        } = io;

        let params = AttachParams::default()
            .container(container)
            .stdin(stdin.is_some())
            .stdout(true)
            .stderr(true);

        let mut attached = self
            .api::<Pod>()
            .exec(pod, command, &params)
            .await
            .map_err(|e| Error::kube(format!("exec in {pod}"), e))?;

        let remote_stdout = attached.stdout();
        let remote_stderr = attached.stderr();
        let stdin_task = match (stdin, attached.stdin()) {
            (Some(mut local), Some(mut remote)) => Some(tokio::spawn(async move {
                let _ = tokio::io::copy(&mut local, &mut remote).await;
                let _ = remote.shutdown().await;
            })),
            _ => None,
        };
        let status = attached.take_status();

        let copy_stdout = async {
            if let Some(mut remote) = remote_stdout {
                tokio::io::copy(&mut remote, &mut stdout).await?;
            }
            stdout.flush().await
        };
        let copy_stderr = async {
            if let Some(mut remote) = remote_stderr {
                tokio::io::copy(&mut remote, &mut stderr).await?;
            }
            stderr.flush().await
        };
        let (out, err) = tokio::join!(copy_stdout, copy_stderr);

        if let Some(task) = stdin_task {
            task.abort();
        }
        out.and(err)
            .map_err(|e| Error::command(format!("exec in {pod}"), e.to_string()))?;

        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        match status {
            Some(status) => exec_result(pod, &status),
            None => Ok(()),
        }
    }

    async fn get_secret(&self, name: &str) -> Result<Option<Secret>> {
        self.get_opt("secret", name).await
    }

    async fn create_secret(&self, secret: &Secret) -> Result<()> {
        self.create("secret", secret).await
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        self.delete_ignore_missing::<Secret>("secret", name, None)
            .await
    }

    async fn get_service_account(&self, name: &str) -> Result<Option<ServiceAccount>> {
        self.get_opt("serviceaccount", name).await
    }

    async fn create_service_account(&self, account: &ServiceAccount) -> Result<()> {
        self.create("serviceaccount", account).await
    }

    async fn get_role_binding(&self, name: &str) -> Result<Option<RoleBinding>> {
        self.get_opt("rolebinding", name).await
    }

    async fn create_role_binding(&self, binding: &RoleBinding) -> Result<()> {
        self.create("rolebinding", binding).await
    }

    async fn delete_role_binding(&self, name: &str) -> Result<()> {
        self.delete_ignore_missing::<RoleBinding>("rolebinding", name, None)
            .await
    }
}

/// Translate the exec status channel into a result
///
/// The API server reports a failed command as `Failure` with reason
/// `NonZeroExitCode` and the code in a cause of type `ExitCode`.
fn exec_result(pod: &str, status: &Status) -> Result<()> {
    if status.status.as_deref() == Some("Success") {
        return Ok(());
    }

    let exit_code = status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
                .and_then(|c| c.message.as_deref())
                .and_then(|m| m.trim().parse::<i32>().ok())
        });

    match exit_code {
        Some(code) => Err(Error::exited(
            format!("exec in {pod}"),
            code,
            status.message.clone(),
        )),
        None => Err(Error::command_with_stderr(
            format!("exec in {pod}"),
            status.reason.clone().unwrap_or_else(|| "unknown failure".into()),
            status.message.clone().unwrap_or_default(),
        )),
    }
}
