//! `command`: run a shell command in the workspace container
//!
//! The remote exit code becomes the process exit code.

use clap::Args;
use tokio_util::sync::CancellationToken;

use devpod_common::{Error, Result};
use devpod_workspace::ExecIo;

use crate::config::{non_empty, ProviderArgs};

#[derive(Args, Debug)]
pub struct CommandArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// User to run the command as; root when unset
    #[arg(long, env = "DEVCONTAINER_USER")]
    pub user: Option<String>,

    /// Shell command to run
    #[arg(long, env = "DEVCONTAINER_COMMAND")]
    pub command: Option<String>,

    /// Misspelled variable older DevPod versions set
    #[arg(long, env = "DEVCONTIANER_COMMAND", hide = true)]
    pub legacy_command: Option<String>,
}

impl CommandArgs {
    fn shell_command(&mut self) -> Result<String> {
        non_empty(self.command.take())
            .or_else(|| non_empty(self.legacy_command.take()))
            .ok_or_else(|| Error::configuration("DEVCONTAINER_COMMAND", "is required"))
    }
}

pub async fn run(mut args: CommandArgs, cancel: CancellationToken) -> Result<()> {
    let command = args.shell_command()?;
    let user = non_empty(args.user.take());
    let options = args.provider.into_options()?;

    super::reconciler(options, cancel)
        .await?
        .command(user.as_deref(), &command, ExecIo::stdio(true))
        .await
}
