//! `can-reprovision`: tell DevPod whether the workspace may be rebuilt in place

use clap::Args;

use devpod_common::options::parse_flag;
use devpod_common::{Error, Result};

#[derive(Args, Debug)]
pub struct CanReprovisionArgs {
    /// "true" to allow reprovisioning
    #[arg(long, env = "REPROVISIONING_MODE")]
    pub reprovisioning_mode: Option<String>,

    /// Accepted for symmetry with the other commands; unused
    #[arg(long, env = "DEVCONTAINER_ID", hide = true)]
    pub devcontainer_id: Option<String>,
}

pub fn run(args: CanReprovisionArgs) -> Result<()> {
    if parse_flag(args.reprovisioning_mode.as_deref()) {
        Ok(())
    } else {
        Err(Error::configuration(
            "REPROVISIONING_MODE",
            "reprovisioning disabled",
        ))
    }
}
