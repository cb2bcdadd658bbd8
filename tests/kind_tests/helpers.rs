//! Cluster setup shared by the kind tests

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, PostParams};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use devpod_common::{ClusterConnection, ComparableOptions, Options};
use devpod_workspace::{
    connect, DockerCredentialStore, KubeCluster, Mount, RunSpecification, WorkspaceReconciler,
};

/// Small image with a shell and `uname`
pub const TEST_IMAGE: &str = "docker.io/library/alpine:3.20";

/// Connect through the current kubeconfig context
pub async fn ensure_test_cluster() -> Result<Client, String> {
    let (client, _) = connect(&ClusterConnection::default())
        .await
        .map_err(|e| format!("no cluster reachable: {e}"))?;
    client
        .apiserver_version()
        .await
        .map_err(|e| format!("cluster did not answer: {e}"))?;
    Ok(client)
}

/// Create a namespace unique to this test process
pub async fn fresh_namespace(client: &Client, story: &str) -> String {
    let name = format!("devpod-it-{story}-{}", std::process::id());
    let api: Api<Namespace> = Api::all(client.clone());
    let namespace = Namespace {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            ..Default::default()
        },
        ..Default::default()
    };
    api.create(&PostParams::default(), &namespace)
        .await
        .expect("failed to create test namespace");
    name
}

/// Remove a test namespace and everything in it
pub async fn cleanup_namespace(client: &Client, name: &str) {
    let api: Api<Namespace> = Api::all(client.clone());
    let _ = api.delete(name, &DeleteParams::default()).await;
}

/// Workspace that sleeps until it is stopped
pub fn sleeping_workspace(id: &str) -> RunSpecification {
    RunSpecification {
        uid: format!("{id}-uid"),
        image: TEST_IMAGE.to_string(),
        entrypoint: "/bin/sh".to_string(),
        cmd: vec!["-c".to_string(), "echo workspace started; sleep 3600".to_string()],
        labels: vec![format!("dev.containers.id={id}")],
        workspace_mount: Some(Mount::volume(id, format!("/workspaces/{id}"))),
        ..Default::default()
    }
}

pub fn reconciler(
    client: &Client,
    namespace: &str,
    id: &str,
    comparable: ComparableOptions,
) -> WorkspaceReconciler {
    let mut options = Options::for_workspace(id);
    options.comparable = comparable;
    options.pod_timeout = Duration::from_secs(180);

    WorkspaceReconciler::new(
        Arc::new(KubeCluster::new(client.clone(), namespace)),
        Arc::new(DockerCredentialStore::from_environment()),
        options,
        namespace,
        CancellationToken::new(),
    )
}

/// Poll until `name` no longer exists; false after a minute
pub async fn wait_until_gone<K>(api: &Api<K>, name: &str) -> bool
where
    K: Resource + Clone + DeserializeOwned + std::fmt::Debug,
{
    for _ in 0..60 {
        if matches!(api.get_opt(name).await, Ok(None)) {
            return true;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    false
}
