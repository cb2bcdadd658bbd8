//! Workspace reconciler
//!
//! One bounded reconciliation per invocation: look at what exists, build
//! what should exist, apply the difference and wait until the workspace pod
//! is usable. The cluster is the only state store; nothing is cached between
//! invocations.
//!
//! Ordering:
//! 1. Namespace (optional, failures ignored)
//! 2. PVC, created only on first run; carries the run specification
//! 3. Service account and role binding
//! 4. Pull secret, before the pod that references it
//! 5. Pod, replaced only when the manifest-affecting options changed

use std::sync::Arc;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use devpod_common::{Error, Options, Result, INFO_ANNOTATION, LAST_APPLIED_ANNOTATION};

use crate::cluster::{cancellable, ExecIo, WorkspaceCluster};
use crate::details::ContainerDetails;
use crate::manifest::{load_pod_template, ManifestBuilder, PodPlacement, DEV_CONTAINER_NAME};
use crate::pull_secret::{CredentialStore, PullSecretManager};
use crate::readiness::{ReadinessWaiter, WaitOutcome};
use crate::run_spec::{ContainerInfo, RunSpecification};
use crate::service_account::ensure_service_account;
use crate::workspace::WorkspaceName;

pub const ARCH_ARM64: &str = "arm64";
pub const ARCH_AMD64: &str = "amd64";

/// Map `uname -m` output to a DevPod architecture name
pub fn architecture_from_uname(output: &str) -> &'static str {
    if output.contains("arm") || output.contains("aarch") {
        ARCH_ARM64
    } else {
        ARCH_AMD64
    }
}

/// Shell invocation for `command`
///
/// Non-root users go through `su` so the command runs with their
/// environment.
pub fn exec_command(user: Option<&str>, command: &str) -> Vec<String> {
    match user.map(str::trim).filter(|u| !u.is_empty() && *u != "root") {
        Some(user) => vec![
            "su".to_string(),
            user.to_string(),
            "-c".to_string(),
            command.to_string(),
        ],
        None => vec!["sh".to_string(), "-c".to_string(), command.to_string()],
    }
}

/// Drives one workspace through its lifecycle operations
pub struct WorkspaceReconciler {
    cluster: Arc<dyn WorkspaceCluster>,
    credentials: Arc<dyn CredentialStore>,
    options: Options,
    namespace: String,
    cancel: CancellationToken,
}

impl WorkspaceReconciler {
    pub fn new(
        cluster: Arc<dyn WorkspaceCluster>,
        credentials: Arc<dyn CredentialStore>,
        options: Options,
        namespace: impl Into<String>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cluster,
            credentials,
            options,
            namespace: namespace.into(),
            cancel,
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn workspace(&self) -> WorkspaceName {
        WorkspaceName::new(self.options.devcontainer_id.clone())
    }

    fn builder(&self) -> ManifestBuilder<'_> {
        ManifestBuilder::new(&self.options.comparable, &self.namespace)
    }

    fn waiter(&self) -> ReadinessWaiter<'_> {
        ReadinessWaiter::new(
            self.cluster.as_ref(),
            &self.cancel,
            self.options.pod_timeout,
            self.options.completed_pod_policy,
        )
    }

    fn pull_secrets(&self) -> PullSecretManager<'_> {
        PullSecretManager::new(
            self.cluster.as_ref(),
            self.credentials.as_ref(),
            &self.namespace,
        )
    }

    /// Create and start the workspace
    ///
    /// Without `spec` the persisted run specification is reused; a
    /// workspace that was never created then fails with
    /// [`Error::MissingSpecification`].
    pub async fn run(&self, spec: Option<RunSpecification>) -> Result<()> {
        let workspace = self.workspace();
        self.ensure_namespace().await;

        let (spec, new_pvc) = match self.find_pvc(&workspace).await? {
            Some((_, persisted)) => (spec.unwrap_or(persisted.spec), None),
            None => {
                let spec = spec.ok_or_else(|| Error::MissingSpecification {
                    workspace: workspace.resource_name().to_string(),
                })?;
                let info = ContainerInfo::new(workspace.id(), spec.clone());
                let pvc = self.builder().build_pvc(&workspace, &info)?;
                (spec, Some(pvc))
            }
        };
        let initialize = new_pvc.is_some();

        let template = self.pod_template()?;
        self.validate_pod(&workspace, &spec, template.as_ref(), initialize)?;

        if let Some(pvc) = new_pvc {
            info!(workspace = %workspace, "Create persistent volume claim");
            cancellable(&self.cancel, "create pvc", self.cluster.create_pvc(&pvc)).await?;
        }

        self.apply_pod(&workspace, &spec, template, initialize)
            .await
    }

    /// Start a previously created workspace from its persisted specification
    pub async fn start(&self) -> Result<()> {
        let workspace = self.workspace();
        let Some((_, info)) = self.find_pvc(&workspace).await? else {
            return Err(Error::WorkspaceNotFound {
                workspace: workspace.resource_name().to_string(),
            });
        };

        let template = self.pod_template()?;
        self.validate_pod(&workspace, &info.spec, template.as_ref(), false)?;
        self.apply_pod(&workspace, &info.spec, template, false)
            .await
    }

    /// Delete the pod; the PVC keeps the workspace
    pub async fn stop(&self) -> Result<()> {
        let workspace = self.workspace();
        info!(workspace = %workspace, "Delete pod");
        cancellable(
            &self.cancel,
            "delete pod",
            self.cluster.delete_pod(workspace.resource_name()),
        )
        .await
    }

    /// Remove everything the workspace owns; safe to repeat
    pub async fn delete(&self) -> Result<()> {
        let workspace = self.workspace();
        let name = workspace.resource_name();

        info!(workspace = %workspace, "Delete pod");
        cancellable(&self.cancel, "delete pod", self.cluster.delete_pod(name)).await?;

        info!(workspace = %workspace, "Delete persistent volume claim");
        cancellable(&self.cancel, "delete pvc", self.cluster.delete_pvc(name)).await?;

        if self.options.comparable.cluster_role.is_some() {
            info!(workspace = %workspace, "Delete role binding");
            cancellable(
                &self.cancel,
                "delete role binding",
                self.cluster.delete_role_binding(name),
            )
            .await?;
        }

        if self.options.comparable.pull_secrets_enabled {
            let secret = workspace.pull_secret_name();
            info!(workspace = %workspace, secret = %secret, "Delete pull secret");
            cancellable(
                &self.cancel,
                "delete pull secret",
                self.pull_secrets().delete(&secret),
            )
            .await?;
        }

        Ok(())
    }

    /// Report the workspace state, or `None` if it was never created
    pub async fn find(&self) -> Result<Option<ContainerDetails>> {
        let workspace = self.workspace();
        let Some((pvc, info)) = self.find_pvc(&workspace).await? else {
            return Ok(None);
        };

        let running = match self.waiter().wait(workspace.resource_name()).await {
            Ok(WaitOutcome::Ready(pod)) => Some(pod),
            Ok(_) => None,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                info!(workspace = %workspace, error = %e, "Error finding pod");
                warn!(
                    "If the pod does not come up automatically it is stuck in an error state. \
                     Recreate the workspace to recover from this"
                );
                None
            }
        };

        Ok(Some(ContainerDetails::from_objects(
            &pvc,
            &info,
            running.as_deref(),
        )))
    }

    /// Run `command` in the workspace container as `user`
    ///
    /// A non-zero remote exit code comes back as [`Error::Command`] carrying
    /// that code.
    pub async fn command(&self, user: Option<&str>, command: &str, io: ExecIo) -> Result<()> {
        let workspace = self.workspace();
        debug!(workspace = %workspace, user = user.unwrap_or("root"), "Exec command");
        cancellable(
            &self.cancel,
            "exec",
            self.cluster.exec(
                workspace.resource_name(),
                DEV_CONTAINER_NAME,
                exec_command(user, command),
                io,
            ),
        )
        .await
    }

    /// Logs of the workspace container
    pub async fn logs(&self) -> Result<String> {
        let workspace = self.workspace();
        cancellable(
            &self.cancel,
            "logs",
            self.cluster
                .pod_logs(workspace.resource_name(), DEV_CONTAINER_NAME),
        )
        .await
    }

    /// Find the architecture of the node the workspace would land on
    ///
    /// The helper pod is left running; the next `run` schedules the
    /// workspace pod next to it and then removes it.
    pub async fn target_architecture(&self) -> Result<&'static str> {
        let workspace = self.workspace();
        self.ensure_namespace().await;

        let template = match self
            .options
            .comparable
            .arch_detection_pod_manifest_template
            .as_deref()
        {
            Some(path) => Some(load_pod_template(
                "ARCH_DETECTION_POD_MANIFEST_TEMPLATE",
                path,
            )?),
            None => None,
        };

        let name = workspace.arch_pod_name();
        let pod = self
            .builder()
            .build_arch_detection_pod(&workspace, &name, template);

        info!(workspace = %workspace, pod = %name, "Find out cluster architecture");
        cancellable(
            &self.cancel,
            "create architecture detection pod",
            self.cluster.create_pod(&pod),
        )
        .await?;

        if !self.waiter().wait(&name).await?.is_ready() {
            return Err(Error::command(
                "detect architecture",
                format!("pod {name} stopped before reporting"),
            ));
        }

        let output = cancellable(
            &self.cancel,
            "logs",
            self.cluster.pod_logs(&name, DEV_CONTAINER_NAME),
        )
        .await?;
        let arch = architecture_from_uname(&output);
        debug!(workspace = %workspace, uname = output.trim(), arch, "Detected architecture");
        Ok(arch)
    }

    async fn ensure_namespace(&self) {
        if !self.options.comparable.create_namespace || self.namespace.is_empty() {
            return;
        }
        debug!(namespace = %self.namespace, "Create namespace");
        if let Err(e) = cancellable(
            &self.cancel,
            "create namespace",
            self.cluster.create_namespace(&self.namespace),
        )
        .await
        {
            debug!(namespace = %self.namespace, error = %e, "Error creating namespace");
        }
    }

    /// The workspace PVC with its decoded info annotation
    async fn find_pvc(
        &self,
        workspace: &WorkspaceName,
    ) -> Result<Option<(PersistentVolumeClaim, ContainerInfo)>> {
        let name = workspace.resource_name();
        let Some(pvc) = cancellable(&self.cancel, "get pvc", self.cluster.get_pvc(name)).await?
        else {
            return Ok(None);
        };

        let raw = pvc
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(INFO_ANNOTATION))
            .filter(|raw| !raw.is_empty())
            .ok_or_else(|| {
                Error::serialization_for_kind(
                    "ContainerInfo",
                    format!("pvc {name} is missing the {INFO_ANNOTATION} annotation"),
                )
            })?;
        let info = ContainerInfo::from_annotation(raw)?;
        Ok(Some((pvc, info)))
    }

    fn pod_template(&self) -> Result<Option<Pod>> {
        match self.options.comparable.pod_manifest_template.as_deref() {
            Some(path) => {
                debug!(path, "Load pod manifest template");
                load_pod_template("POD_MANIFEST_TEMPLATE", path).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Build the pod once without cluster input so bad options fail before
    /// anything is created
    fn validate_pod(
        &self,
        workspace: &WorkspaceName,
        spec: &RunSpecification,
        template: Option<&Pod>,
        initialize: bool,
    ) -> Result<()> {
        self.builder()
            .build_pod(
                workspace,
                spec,
                template.cloned(),
                initialize,
                &PodPlacement::default(),
            )
            .map(drop)
    }

    async fn apply_pod(
        &self,
        workspace: &WorkspaceName,
        spec: &RunSpecification,
        template: Option<Pod>,
        initialize: bool,
    ) -> Result<()> {
        let options = &self.options.comparable;
        let builder = self.builder();
        let name = workspace.resource_name();

        if let Some(account) = options.service_account.as_deref() {
            ensure_service_account(
                self.cluster.as_ref(),
                &self.cancel,
                workspace,
                account,
                options.cluster_role.as_deref(),
                &self.namespace,
            )
            .await?;
        }

        let mut placement = PodPlacement {
            service_account: options.service_account.clone(),
            ..Default::default()
        };

        if options.pull_secrets_enabled {
            let secret = workspace.pull_secret_name();
            let outcome = cancellable(
                &self.cancel,
                "ensure pull secret",
                self.pull_secrets().ensure(&secret, &builder.image(spec)),
            )
            .await?;
            if outcome.attachable() {
                placement.pull_secret = Some(secret);
            }
        }

        let selector = workspace.detection_selector();
        let detection_pods = match cancellable(
            &self.cancel,
            "list pods",
            self.cluster.list_pod_names(&selector),
        )
        .await
        {
            Ok(names) => names,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                debug!(error = %e, "Skipping architecture detection pod lookup");
                Vec::new()
            }
        };
        // an explicit node selector already decides placement
        if let Some(found) = detection_pods.first() {
            if options.node_selector.is_none() {
                info!(pod = %found, "Found architecture detection pod, using pod affinity");
                placement.affinity_workspace = Some(name.to_string());
            }
        }

        let mut pod = builder.build_pod(workspace, spec, template, initialize, &placement)?;

        let existing = cancellable(&self.cancel, "get pod", self.cluster.get_pod(name)).await?;
        if let Some(existing) = existing {
            if self.options_unchanged(&existing) {
                debug!(workspace = %workspace, "Provider options did not change, skipping update");
                return Ok(());
            }
            info!(workspace = %workspace, "Provider options changed, recreating pod");
            cancellable(
                &self.cancel,
                "delete pod",
                self.cluster
                    .delete_pod_and_wait(name, self.options.pod_timeout),
            )
            .await?;
        }

        pod.metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(LAST_APPLIED_ANNOTATION.to_string(), options.to_snapshot()?);

        info!(workspace = %workspace, "Create pod");
        cancellable(&self.cancel, "create pod", self.cluster.create_pod(&pod)).await?;

        info!(workspace = %workspace, "Waiting for pod to come up");
        match self.waiter().wait(name).await? {
            WaitOutcome::Ready(_) => {}
            WaitOutcome::Exited(_) => info!(workspace = %workspace, "Pod exited"),
            WaitOutcome::Gone => debug!(workspace = %workspace, "Pod not found after create"),
        }

        if !detection_pods.is_empty() {
            info!(workspace = %workspace, "Cleaning up architecture detection pod");
            cancellable(
                &self.cancel,
                "delete architecture detection pods",
                self.cluster.force_delete_pods(&selector),
            )
            .await?;
        }

        Ok(())
    }

    /// Compare a running pod's last-applied snapshot with the current options
    fn options_unchanged(&self, existing: &Pod) -> bool {
        let Some(raw) = existing
            .metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(LAST_APPLIED_ANNOTATION))
        else {
            debug!("Existing pod has no last-applied configuration");
            return false;
        };

        match devpod_common::ComparableOptions::from_snapshot(raw) {
            Ok(previous) => previous == self.options.comparable,
            Err(e) => {
                warn!(error = %e, "Error decoding existing provider options, continuing");
                false
            }
        }
    }
}
