//! Architecture detection stories
//!
//! DevPod asks for the target architecture before it builds an image. The
//! helper pod used for that stays behind so the workspace pod can be
//! scheduled onto the same node, and is removed once the workspace is up.

use std::sync::Arc;

use devpod_common::{ComparableOptions, WORKSPACE_LABEL};

use super::fake_cluster::{FakeCluster, StaticCredentials};
use super::helpers::{reconciler, run_spec, RESOURCE_NAME};

// =============================================================================
// Detection Then Run
// =============================================================================

/// Story: detect arm64, then land the workspace next to the helper pod
#[tokio::test]
async fn story_detection_pod_pins_the_workspace_node() {
    let cluster = Arc::new(FakeCluster::with_uname("aarch64"));
    let workspace = reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default());

    // Chapter 1: detection leaves one labelled helper pod running
    assert_eq!(workspace.target_architecture().await.unwrap(), "arm64");

    let helpers: Vec<_> = cluster
        .pod_names()
        .into_iter()
        .filter(|name| name != RESOURCE_NAME)
        .collect();
    assert_eq!(helpers.len(), 1);
    let helper = cluster.pod(&helpers[0]).unwrap();
    assert_eq!(
        helper.metadata.labels.as_ref().unwrap()[WORKSPACE_LABEL],
        RESOURCE_NAME
    );

    // Chapter 2: the run requires co-location with the helper pod
    workspace.run(Some(run_spec())).await.unwrap();

    let pod = cluster.pod(RESOURCE_NAME).expect("workspace pod");
    let terms = pod
        .spec
        .and_then(|s| s.affinity)
        .and_then(|a| a.pod_affinity)
        .and_then(|a| a.required_during_scheduling_ignored_during_execution)
        .expect("pod affinity");
    let requirement = &terms[0]
        .label_selector
        .as_ref()
        .and_then(|s| s.match_expressions.as_ref())
        .unwrap()[0];
    assert_eq!(requirement.key, WORKSPACE_LABEL);
    assert_eq!(requirement.values, Some(vec![RESOURCE_NAME.to_string()]));

    // Chapter 3: the helper pod is gone, the workspace pod is not
    assert_eq!(cluster.pod_names(), vec![RESOURCE_NAME.to_string()]);
}

#[tokio::test]
async fn intel_nodes_report_amd64() {
    let cluster = Arc::new(FakeCluster::with_uname("x86_64"));
    let workspace = reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default());

    assert_eq!(workspace.target_architecture().await.unwrap(), "amd64");
}

#[tokio::test]
async fn runs_without_detection_have_no_affinity() {
    let cluster = Arc::new(FakeCluster::new());
    let workspace = reconciler(&cluster, StaticCredentials::none(), ComparableOptions::default());

    workspace.run(Some(run_spec())).await.unwrap();

    let pod = cluster.pod(RESOURCE_NAME).unwrap();
    assert!(pod.spec.unwrap().affinity.is_none());
    assert_eq!(cluster.count("force-delete"), 0);
}
