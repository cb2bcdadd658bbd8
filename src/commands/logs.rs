//! `logs`: print the workspace container's logs

use std::io::Write;

use clap::Args;
use tokio_util::sync::CancellationToken;

use devpod_common::{Error, Result};

use crate::config::ProviderArgs;

#[derive(Args, Debug)]
pub struct LogsArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,
}

pub async fn run(args: LogsArgs, cancel: CancellationToken) -> Result<()> {
    let options = args.provider.into_options()?;
    let logs = super::reconciler(options, cancel).await?.logs().await?;

    std::io::stdout()
        .lock()
        .write_all(logs.as_bytes())
        .map_err(|e| Error::command("write logs", e.to_string()))
}
