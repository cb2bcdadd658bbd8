//! DevPod Kubernetes provider binary

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use devpod_common::telemetry::init_logging;
use devpod_common::Error;
use devpod_kubernetes::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug_enabled());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    let code = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                debug!("Interrupted, cancelling");
                on_interrupt.cancel();
            }
        });

        match cli.run(cancel).await {
            Ok(()) => 0,
            Err(e) => {
                report(&e);
                e.exit_code()
            }
        }
    });

    std::process::exit(code)
}

fn report(err: &Error) {
    match err {
        // the remote command already wrote its own output
        Error::Command {
            exit_code: Some(code),
            ..
        } => debug!(exit_code = code, error = %err, "Command exited"),
        _ => error!("{err}"),
    }
}
