//! Service account and cluster role binding for workspace pods

use k8s_openapi::api::core::v1::ServiceAccount;
use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use devpod_common::Result;

use crate::cluster::{cancellable, WorkspaceCluster};
use crate::manifest::created_labels;
use crate::workspace::WorkspaceName;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

pub fn build_service_account(name: &str, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(created_labels()),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// RoleBinding named after the workspace that grants `cluster_role` to `account`
pub fn build_role_binding(
    workspace: &WorkspaceName,
    account: &str,
    cluster_role: &str,
    namespace: &str,
) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(workspace.resource_name().to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(created_labels()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: cluster_role.to_string(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: account.to_string(),
            ..Default::default()
        }]),
    }
}

/// Create the service account and, with a cluster role, its binding
///
/// Existing objects are left alone.
pub async fn ensure_service_account(
    cluster: &dyn WorkspaceCluster,
    cancel: &CancellationToken,
    workspace: &WorkspaceName,
    account: &str,
    cluster_role: Option<&str>,
    namespace: &str,
) -> Result<()> {
    let existing = cancellable(
        cancel,
        "get service account",
        cluster.get_service_account(account),
    )
    .await?;
    if existing.is_none() {
        info!(service_account = account, "Create service account");
        cancellable(
            cancel,
            "create service account",
            cluster.create_service_account(&build_service_account(account, namespace)),
        )
        .await?;
    } else {
        debug!(service_account = account, "Service account exists");
    }

    let Some(cluster_role) = cluster_role else {
        return Ok(());
    };

    let name = workspace.resource_name();
    if cancellable(cancel, "get role binding", cluster.get_role_binding(name))
        .await?
        .is_some()
    {
        debug!(role_binding = name, "Role binding exists");
        return Ok(());
    }

    info!(role_binding = name, cluster_role, "Create role binding");
    cancellable(
        cancel,
        "create role binding",
        cluster.create_role_binding(&build_role_binding(workspace, account, cluster_role, namespace)),
    )
    .await
}
