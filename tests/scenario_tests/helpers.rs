//! Shared fixtures for scenario tests

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use devpod_common::{ComparableOptions, Options};
use devpod_workspace::{Mount, RunSpecification, WorkspaceReconciler};

use super::fake_cluster::{FakeCluster, StaticCredentials};

pub const WORKSPACE_ID: &str = "scenario";
pub const RESOURCE_NAME: &str = "devpod-scenario";
pub const NAMESPACE: &str = "devpod";

pub fn run_spec() -> RunSpecification {
    RunSpecification {
        uid: "uid-scenario".to_string(),
        user: "vscode".to_string(),
        image: "ghcr.io/loft-sh/devpod:latest".to_string(),
        entrypoint: "/bin/sh".to_string(),
        cmd: vec!["-c".to_string(), "sleep infinity".to_string()],
        labels: vec!["dev.containers.id=scenario".to_string()],
        workspace_mount: Some(Mount::volume(WORKSPACE_ID, "/workspaces/scenario")),
        mounts: vec![Mount::volume("cache", "/home/vscode/.cache")],
        ..Default::default()
    }
}

pub fn options(comparable: ComparableOptions) -> Options {
    let mut options = Options::for_workspace(WORKSPACE_ID);
    options.comparable = comparable;
    options.pod_timeout = Duration::from_secs(30);
    options
}

pub fn reconciler(
    cluster: &Arc<FakeCluster>,
    credentials: StaticCredentials,
    comparable: ComparableOptions,
) -> WorkspaceReconciler {
    WorkspaceReconciler::new(
        cluster.clone(),
        Arc::new(credentials),
        options(comparable),
        NAMESPACE,
        CancellationToken::new(),
    )
}
