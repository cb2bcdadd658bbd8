//! Provider commands

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use devpod_common::{Options, Result};
use devpod_workspace::{connect, DockerCredentialStore, KubeCluster, WorkspaceReconciler};

pub mod can_reprovision;
pub mod command;
pub mod find;
pub mod lifecycle;
pub mod logs;
pub mod render_template;
pub mod run;
pub mod target_architecture;

/// Connect to the configured cluster and build a reconciler for the workspace
pub async fn reconciler(options: Options, cancel: CancellationToken) -> Result<WorkspaceReconciler> {
    if let Some(path) = &options.connection.kubeconfig {
        debug!(kubeconfig = %path.display(), "Use Kubernetes config");
    }
    if let Some(context) = &options.connection.context {
        debug!(context = %context, "Use Kubernetes context");
    }

    let (client, namespace) = connect(&options.connection).await?;
    let cluster = KubeCluster::new(client, namespace.clone());
    Ok(WorkspaceReconciler::new(
        Arc::new(cluster),
        Arc::new(DockerCredentialStore::from_environment()),
        options,
        namespace,
        cancel,
    ))
}
