//! Template preview
//!
//! Runs a full reconciliation with placeholder values against a
//! [`DryRunRecorder`] and returns what would have been created. Log output
//! of the run is captured in a [`LogBuffer`] under a scoped subscriber and
//! only replayed when a verbose render fails.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;

use devpod_common::{Error, LogBuffer, Options};

use crate::dry_run::DryRunRecorder;
use crate::pull_secret::CredentialStore;
use crate::reconciler::WorkspaceReconciler;
use crate::run_spec::{Mount, RunSpecification};

/// Run specification used for previews
pub fn placeholder_spec() -> RunSpecification {
    RunSpecification {
        uid: "FAKE-UID".to_string(),
        user: "FAKE-USER".to_string(),
        image: "devpod-sh:fake".to_string(),
        entrypoint: "entrypoint".to_string(),
        cmd: vec!["cmd".to_string()],
        env: BTreeMap::new(),
        privileged: Some(false),
        workspace_mount: Some(Mount::volume("FAKE", "/workspaces/FAKE")),
        ..Default::default()
    }
}

/// Result of a preview
#[derive(Debug)]
pub struct RenderedTemplate {
    /// YAML documents separated by `---`
    pub manifests: String,
    /// Why the run stopped early; `manifests` then holds what was captured
    pub error: Option<Error>,
}

/// Render the manifests a `run` would apply
pub async fn render_template(
    options: Options,
    namespace: &str,
    credentials: Arc<dyn CredentialStore>,
    verbose: bool,
) -> RenderedTemplate {
    if verbose {
        info!("Rendering template with provider options:\n\n{options}");
    }

    let recorder = DryRunRecorder::new();
    let reconciler = WorkspaceReconciler::new(
        Arc::new(recorder.clone()),
        credentials,
        options,
        namespace,
        CancellationToken::new(),
    );

    let buffer = LogBuffer::new();
    let subscriber = tracing_subscriber::registry().with(buffer.layer());
    let result = reconciler
        .run(Some(placeholder_spec()))
        .with_subscriber(subscriber)
        .await;

    let error = result.err();
    if let Some(e) = &error {
        warn!(error = %e, "Encountered an error, manifests might not be complete");
    }
    buffer.finish(error.is_some() && verbose);

    RenderedTemplate {
        manifests: recorder.render(),
        error,
    }
}
