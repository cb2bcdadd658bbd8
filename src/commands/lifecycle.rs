//! `start`, `stop` and `delete`

use clap::Args;
use tokio_util::sync::CancellationToken;

use devpod_common::Result;

use crate::config::ProviderArgs;

#[derive(Args, Debug)]
pub struct LifecycleArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    Start,
    Stop,
    Delete,
}

pub async fn run(action: Lifecycle, args: LifecycleArgs, cancel: CancellationToken) -> Result<()> {
    let options = args.provider.into_options()?;
    let reconciler = super::reconciler(options, cancel).await?;

    match action {
        Lifecycle::Start => reconciler.start().await,
        Lifecycle::Stop => reconciler.stop().await,
        Lifecycle::Delete => reconciler.delete().await,
    }
}
