//! Workspace lifecycle stories
//!
//! A developer creates a workspace, checks on it, stops it overnight,
//! starts it again and finally throws it away. Each step is checked against
//! what ends up in the cluster.

use std::sync::Arc;

use devpod_common::{ComparableOptions, Error, LAST_APPLIED_ANNOTATION};
use devpod_workspace::{ContainerInfo, ExecIo};

use super::fake_cluster::{FakeCluster, StaticCredentials};
use super::helpers::{reconciler, run_spec, NAMESPACE, RESOURCE_NAME, WORKSPACE_ID};

// =============================================================================
// Full Lifecycle
// =============================================================================

/// Story: run, find, stop, start, delete
#[tokio::test]
async fn story_workspace_lifecycle() {
    let cluster = Arc::new(FakeCluster::new());
    let workspace = reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default());

    // Chapter 1: the first run creates the PVC and the pod
    workspace.run(Some(run_spec())).await.unwrap();

    let pvc = cluster.pvc(RESOURCE_NAME).expect("pvc should exist");
    let info = pvc
        .metadata
        .annotations
        .as_ref()
        .and_then(|a| a.get(devpod_common::INFO_ANNOTATION))
        .expect("pvc should carry the container info");
    let info = ContainerInfo::from_annotation(info).unwrap();
    assert_eq!(info.workspace_id, WORKSPACE_ID);
    assert_eq!(info.spec.image, "ghcr.io/loft-sh/devpod:latest");

    let pod = cluster.pod(RESOURCE_NAME).expect("pod should exist");
    assert!(pod
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(LAST_APPLIED_ANNOTATION)));
    let init = pod.spec.as_ref().and_then(|s| s.init_containers.as_ref());
    assert!(init.is_some_and(|c| !c.is_empty()), "first run initializes volumes");

    // Chapter 2: find reports the running container and its labels
    let details = workspace.find().await.unwrap().expect("workspace exists");
    assert!(details.is_running());
    assert_eq!(details.id, RESOURCE_NAME);
    assert_eq!(details.config.labels["dev.containers.id"], "scenario");

    // Chapter 3: stop removes the pod, the volume stays
    workspace.stop().await.unwrap();
    assert!(cluster.pod(RESOURCE_NAME).is_none());
    assert!(cluster.pvc(RESOURCE_NAME).is_some());

    let details = workspace.find().await.unwrap().expect("workspace exists");
    assert!(!details.is_running());

    // Chapter 4: start brings the pod back from the persisted spec
    workspace.start().await.unwrap();
    let pod = cluster.pod(RESOURCE_NAME).expect("pod should be back");
    let init = pod.spec.as_ref().and_then(|s| s.init_containers.as_ref());
    assert!(init.map_or(true, |c| c.is_empty()), "start does not reinitialize");
    assert_eq!(cluster.count("create pvc/"), 1);

    // Chapter 5: delete leaves nothing behind, find no longer sees it
    workspace.delete().await.unwrap();
    assert!(cluster.is_empty());
    assert!(workspace.find().await.unwrap().is_none());

    // deleting again is harmless
    workspace.delete().await.unwrap();
}

/// Story: a rerun without option changes leaves the pod alone
#[tokio::test]
async fn story_rerun_with_same_options_is_a_no_op() {
    let cluster = Arc::new(FakeCluster::new());
    let workspace = reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default());

    workspace.run(Some(run_spec())).await.unwrap();
    workspace.run(None).await.unwrap();
    workspace.start().await.unwrap();

    assert_eq!(cluster.count("create pod/"), 1);
    assert_eq!(cluster.count("delete pod/"), 0);
}

/// Story: changing provider options recreates the pod, keeping the volume
#[tokio::test]
async fn story_changed_options_recreate_the_pod() {
    let cluster = Arc::new(FakeCluster::new());
    reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default())
        .run(Some(run_spec()))
        .await
        .unwrap();

    let resized = ComparableOptions {
        resources: Some("limits.cpu=2".to_string()),
        ..Default::default()
    };
    reconciler(&cluster, StaticCredentials::none(), resized)
        .run(None)
        .await
        .unwrap();

    assert_eq!(
        cluster.calls(),
        vec![
            format!("create pvc/{RESOURCE_NAME}"),
            format!("create pod/{RESOURCE_NAME}"),
            format!("delete pod/{RESOURCE_NAME}"),
            format!("create pod/{RESOURCE_NAME}"),
        ]
    );
}

// =============================================================================
// Failure Paths
// =============================================================================

#[tokio::test]
async fn start_of_unknown_workspace_fails_without_side_effects() {
    let cluster = Arc::new(FakeCluster::new());
    let workspace = reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default());

    let err = workspace.start().await.unwrap_err();
    assert!(matches!(err, Error::WorkspaceNotFound { .. }));

    let err = workspace.run(None).await.unwrap_err();
    assert!(matches!(err, Error::MissingSpecification { .. }));

    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn invalid_options_fail_before_anything_is_created() {
    let cluster = Arc::new(FakeCluster::new());
    let broken = ComparableOptions {
        node_selector: Some("no-equals-sign".to_string()),
        ..Default::default()
    };
    let workspace = reconciler(&cluster, StaticCredentials::none(), broken);

    assert!(workspace.run(Some(run_spec())).await.is_err());
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn remote_exit_codes_come_back_as_errors() {
    let cluster = Arc::new(FakeCluster::failing_exec(3));
    let workspace = reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default());
    workspace.run(Some(run_spec())).await.unwrap();

    let io = ExecIo {
        stdin: None,
        stdout: Box::new(tokio::io::sink()),
        stderr: Box::new(tokio::io::sink()),
    };
    let err = workspace.command(Some("vscode"), "exit 3", io).await.unwrap_err();
    assert_eq!(err.exit_code(), 3);
}

// =============================================================================
// Namespace, Service Account and Pull Secret
// =============================================================================

/// Story: a team workspace with its own namespace, identity and registry
#[tokio::test]
async fn story_namespace_identity_and_pull_secret() {
    let cluster = Arc::new(FakeCluster::new());
    let team = ComparableOptions {
        create_namespace: true,
        service_account: Some("devpod-sa".to_string()),
        cluster_role: Some("edit".to_string()),
        pull_secrets_enabled: true,
        ..Default::default()
    };
    let workspace = reconciler(
        &cluster,
        StaticCredentials::for_user("octocat", "hunter2"),
        team,
    );

    workspace.run(Some(run_spec())).await.unwrap();

    assert_eq!(cluster.namespaces(), vec![NAMESPACE.to_string()]);
    assert!(cluster.has_service_account("devpod-sa"));
    let binding = cluster.role_binding(RESOURCE_NAME).expect("role binding");
    assert_eq!(binding.role_ref.name, "edit");

    let secret_name = format!("devpod-pull-secret-{WORKSPACE_ID}");
    assert!(cluster.secret(&secret_name).is_some());

    let pod = cluster.pod(RESOURCE_NAME).unwrap();
    let spec = pod.spec.unwrap();
    assert_eq!(spec.service_account_name.as_deref(), Some("devpod-sa"));
    let pull_secrets: Vec<_> = spec
        .image_pull_secrets
        .unwrap_or_default()
        .into_iter()
        .map(|r| r.name)
        .collect();
    assert_eq!(pull_secrets, vec![secret_name.clone()]);

    // the same credentials on the next run do not touch the secret
    workspace.run(None).await.unwrap();
    assert_eq!(cluster.count("create secret/"), 1);

    workspace.delete().await.unwrap();
    assert!(cluster.role_binding(RESOURCE_NAME).is_none());
    assert!(cluster.secret(&secret_name).is_none());
    assert!(cluster.is_empty());
}

#[tokio::test]
async fn no_local_credentials_means_no_pull_secret() {
    let cluster = Arc::new(FakeCluster::new());
    let options = ComparableOptions {
        pull_secrets_enabled: true,
        ..Default::default()
    };
    let workspace = reconciler(&cluster, StaticCredentials::none(), options);

    workspace.run(Some(run_spec())).await.unwrap();

    assert_eq!(cluster.count("create secret/"), 0);
    let spec = cluster.pod(RESOURCE_NAME).unwrap().spec.unwrap();
    assert!(spec.image_pull_secrets.map_or(true, |s| s.is_empty()));
}
