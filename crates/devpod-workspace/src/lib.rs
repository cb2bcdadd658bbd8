//! DevPod workspaces on Kubernetes
//!
//! Builds the PVC and pod for a workspace, keeps its pull secret in sync
//! with local registry credentials, waits for the pod to become usable and
//! drives the provider operations through [`WorkspaceReconciler`].

pub mod cluster;
pub mod details;
pub mod dry_run;
pub mod manifest;
pub mod pull_secret;
pub mod readiness;
pub mod reconciler;
pub mod render;
pub mod run_spec;
pub mod service_account;
pub mod workspace;

pub use cluster::{connect, ExecIo, KubeCluster, WorkspaceCluster};
pub use details::ContainerDetails;
pub use dry_run::DryRunRecorder;
pub use manifest::ManifestBuilder;
pub use pull_secret::{
    CredentialStore, DockerCredentialStore, PullSecretManager, PullSecretOutcome,
    RegistryCredentials,
};
pub use readiness::{ReadinessWaiter, WaitOutcome};
pub use reconciler::WorkspaceReconciler;
pub use render::{render_template, RenderedTemplate};
pub use run_spec::{ContainerInfo, Mount, RunSpecification};
pub use workspace::WorkspaceName;
