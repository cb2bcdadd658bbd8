//! `run`: create or update the workspace

use clap::Args;
use tokio_util::sync::CancellationToken;

use devpod_common::Result;
use devpod_workspace::RunSpecification;

use crate::config::{non_empty, ProviderArgs};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Run specification as JSON
    #[arg(long, env = "DEVCONTAINER_RUN_OPTIONS")]
    pub run_options: Option<String>,
}

pub async fn run(args: RunArgs, cancel: CancellationToken) -> Result<()> {
    let options = args.provider.into_options()?;
    let spec = non_empty(args.run_options)
        .map(|raw| RunSpecification::from_json(&raw))
        .transpose()?;

    super::reconciler(options, cancel).await?.run(spec).await
}
