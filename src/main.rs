use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use ceph_rolling_upgrade::ceph::CephClient;
use ceph_rolling_upgrade::config::{self, Args, Config};
use ceph_rolling_upgrade::delay::TokioDelay;
use ceph_rolling_upgrade::hosts;
use ceph_rolling_upgrade::logging;
use ceph_rolling_upgrade::remote::SshUpgrader;
use ceph_rolling_upgrade::upgrader::{RollingUpgrader, RunOutcome};

/// Exit status for a run stopped by SIGINT/SIGTERM.
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    logging::init(&args.log_format, &args.log_level);

    info!(
        version = config::VERSION,
        commit = config::COMMIT,
        build_date = config::BUILD_DATE,
        "Ceph rolling upgrade starting"
    );

    match run(args).await {
        Ok(RunOutcome::Completed { hosts_upgraded }) => {
            info!(hosts_upgraded = hosts_upgraded, "Shutdown complete");
        }
        Ok(RunOutcome::Interrupted {
            hosts_upgraded,
            next_host,
        }) => {
            warn!(
                hosts_upgraded = hosts_upgraded,
                next_host = next_host.as_deref().unwrap_or("none"),
                "Stopped before finishing, rerun with the remaining hosts to continue"
            );
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => {
            error!(error = format!("{:#}", e), "Rolling upgrade failed");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<RunOutcome> {
    let config = Config::from_args(args).context("Invalid configuration")?;
    let hosts = hosts::load_host_list(&config.hosts_file).context("Failed to load host list")?;
    config.display(hosts.len());

    let cancel = CancellationToken::new();
    tokio::spawn(forward_shutdown_signal(cancel.clone()));

    let probe = CephClient::new(config.ceph_bin.clone());
    let action = SshUpgrader::new(
        config.ssh_user.clone(),
        config.ssh_connect_timeout_seconds,
        config.upgrade_command.clone(),
        config.dry_run,
    );

    let mut upgrader = RollingUpgrader::new(
        config.identity.clone(),
        hosts,
        config.settings,
        Box::new(probe),
        Box::new(action),
        Box::new(TokioDelay),
    )
    .with_cancellation(cancel);

    upgrader.run().await.context("Rolling upgrade aborted")
}

/// Cancel the run on SIGINT or SIGTERM. The driver only honours it between hosts
/// or while waiting, so a host is never left mid-upgrade.
async fn forward_shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler, only SIGINT is handled");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Received SIGINT/SIGTERM, stopping at the next safe point");
    cancel.cancel();
}
