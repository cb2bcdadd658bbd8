//! Integration tests for the workspace lifecycle
//!
//! These tests walk a workspace through everything DevPod does with it and
//! check the objects the API server ends up holding.

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::Api;

use devpod_common::{ComparableOptions, Error, INFO_ANNOTATION, LAST_APPLIED_ANNOTATION};

use super::helpers::{
    cleanup_namespace, ensure_test_cluster, fresh_namespace, reconciler, sleeping_workspace,
    wait_until_gone,
};

// =============================================================================
// Workspace Lifecycle Stories
// =============================================================================

/// Story: A developer creates a workspace, pauses it and comes back to it
///
/// Expected behavior:
/// - run creates a PVC carrying the run specification and a ready pod
/// - stop removes the pod but keeps the PVC
/// - start recreates the pod from the PVC alone
/// - delete removes both, and find stops reporting the workspace
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_developer_pauses_and_resumes_a_workspace() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = fresh_namespace(&client, "lifecycle").await;
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), &namespace);
    let pods: Api<Pod> = Api::namespaced(client.clone(), &namespace);
    let workspace = reconciler(&client, &namespace, "lifecycle", ComparableOptions::default());

    // Act: first run
    workspace
        .run(Some(sleeping_workspace("lifecycle")))
        .await
        .expect("run failed");

    // Assert: PVC with info annotation, pod with last-applied snapshot
    let pvc = pvcs.get("devpod-lifecycle").await.expect("pvc missing");
    assert!(pvc
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(INFO_ANNOTATION)));
    let pod = pods.get("devpod-lifecycle").await.expect("pod missing");
    assert!(pod
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|a| a.contains_key(LAST_APPLIED_ANNOTATION)));

    let details = workspace.find().await.unwrap().expect("workspace exists");
    assert!(details.is_running());

    // Act: stop, then start
    workspace.stop().await.expect("stop failed");
    workspace.start().await.expect("start failed");
    let details = workspace.find().await.unwrap().expect("workspace exists");
    assert!(details.is_running());

    // Act: delete
    workspace.delete().await.expect("delete failed");
    assert!(
        wait_until_gone(&pvcs, "devpod-lifecycle").await,
        "pvc should be removed"
    );
    assert!(workspace.find().await.unwrap().is_none());

    cleanup_namespace(&client, &namespace).await;
}

/// Story: A developer changes the workspace resources
///
/// Expected behavior:
/// - the running pod is replaced
/// - the new pod carries the new limits
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_changed_resources_replace_the_pod() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = fresh_namespace(&client, "resize").await;
    let pods: Api<Pod> = Api::namespaced(client.clone(), &namespace);

    reconciler(&client, &namespace, "resize", ComparableOptions::default())
        .run(Some(sleeping_workspace("resize")))
        .await
        .expect("run failed");
    let first_uid = pods.get("devpod-resize").await.unwrap().metadata.uid;

    let resized = ComparableOptions {
        resources: Some("limits.memory=256Mi".to_string()),
        ..Default::default()
    };
    reconciler(&client, &namespace, "resize", resized)
        .run(None)
        .await
        .expect("second run failed");

    let pod = pods.get("devpod-resize").await.unwrap();
    assert_ne!(pod.metadata.uid, first_uid, "pod should have been recreated");
    let limits = pod.spec.unwrap().containers[0]
        .resources
        .clone()
        .and_then(|r| r.limits)
        .unwrap_or_default();
    assert!(limits.contains_key("memory"));

    cleanup_namespace(&client, &namespace).await;
}

#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn integration_start_of_unknown_workspace_fails() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = fresh_namespace(&client, "unknown").await;

    let err = reconciler(&client, &namespace, "unknown", ComparableOptions::default())
        .start()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::WorkspaceNotFound { .. }));

    cleanup_namespace(&client, &namespace).await;
}
