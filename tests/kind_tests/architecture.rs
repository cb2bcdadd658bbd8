//! Integration tests for architecture detection

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};

use devpod_common::{ComparableOptions, WORKSPACE_LABEL};

use super::helpers::{
    cleanup_namespace, ensure_test_cluster, fresh_namespace, reconciler, sleeping_workspace,
    wait_until_gone,
};

// =============================================================================
// Detection Stories
// =============================================================================

/// Story: DevPod asks which architecture to build for, then runs the workspace
///
/// Expected behavior:
/// - the answer is arm64 or amd64
/// - the helper pod stays until the workspace pod is up, then goes away
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_detect_architecture_then_run() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = fresh_namespace(&client, "arch").await;
    let pods: Api<Pod> = Api::namespaced(client.clone(), &namespace);
    let selector = ListParams::default().labels(&format!("{WORKSPACE_LABEL}=devpod-arch"));
    let workspace = reconciler(&client, &namespace, "arch", ComparableOptions::default());

    let arch = workspace
        .target_architecture()
        .await
        .expect("detection failed");
    assert!(arch == "arm64" || arch == "amd64", "unexpected arch {arch}");

    let helpers = pods.list(&selector).await.unwrap();
    assert_eq!(helpers.items.len(), 1, "helper pod should be left running");
    let helper = helpers.items[0].metadata.name.clone().unwrap();

    workspace
        .run(Some(sleeping_workspace("arch")))
        .await
        .expect("run failed");
    assert!(
        wait_until_gone(&pods, &helper).await,
        "helper pod should be removed after the run"
    );
    assert!(pods.get_opt("devpod-arch").await.unwrap().is_some());

    cleanup_namespace(&client, &namespace).await;
}
