//! `render-template`: print the manifests a run would create
//!
//! Works offline; no cluster connection is made. A failed render still
//! prints what was captured and exits successfully.

use std::sync::Arc;

use clap::Args;

use devpod_common::options::parse_flag;
use devpod_common::Result;
use devpod_workspace::{render_template, DockerCredentialStore};

use crate::config::ProviderArgs;

/// Namespace used in manifests when none is configured
const DEFAULT_NAMESPACE: &str = "default";

#[derive(Args, Debug)]
pub struct RenderTemplateArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Log provider options, and the run's log on failure ("true" to enable)
    #[arg(long, env = "DEVPOD_VERBOSE")]
    pub verbose: Option<String>,
}

pub async fn run(args: RenderTemplateArgs) -> Result<()> {
    let verbose = parse_flag(args.verbose.as_deref());
    let options = args.provider.into_options()?;
    let namespace = options
        .connection
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());

    let rendered = render_template(
        options,
        &namespace,
        Arc::new(DockerCredentialStore::from_environment()),
        verbose,
    )
    .await;
    println!("{}", rendered.manifests);
    Ok(())
}
