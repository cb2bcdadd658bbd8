//! `find`: print container details, or nothing for an unknown workspace

use clap::Args;
use tokio_util::sync::CancellationToken;

use devpod_common::{Error, Result};

use crate::config::ProviderArgs;

#[derive(Args, Debug)]
pub struct FindArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,
}

pub async fn run(args: FindArgs, cancel: CancellationToken) -> Result<()> {
    let options = args.provider.into_options()?;
    let Some(details) = super::reconciler(options, cancel).await?.find().await? else {
        return Ok(());
    };

    let out = serde_json::to_string(&details)
        .map_err(|e| Error::serialization_for_kind("ContainerDetails", e.to_string()))?;
    println!("{out}");
    Ok(())
}
