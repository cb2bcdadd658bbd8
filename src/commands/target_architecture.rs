//! `target-architecture`: print `arm64` or `amd64`

use clap::Args;
use tokio_util::sync::CancellationToken;

use devpod_common::Result;

use crate::config::ProviderArgs;

#[derive(Args, Debug)]
pub struct TargetArchitectureArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,
}

pub async fn run(args: TargetArchitectureArgs, cancel: CancellationToken) -> Result<()> {
    let options = args.provider.into_options()?;
    let arch = super::reconciler(options, cancel)
        .await?
        .target_architecture()
        .await?;
    println!("{arch}");
    Ok(())
}
