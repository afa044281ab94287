//! icinga2-usersyncd: one ApiUser per Icinga 2 Host
//!
//! Usage:
//!   icinga2-usersyncd                          → run with /etc/icinga2-usersyncd/config.toml
//!   icinga2-usersyncd -c ./config.toml         → run with an explicit config
//!   icinga2-usersyncd --dump-config            → print resolved settings and exit

use anyhow::Context;
use clap::Parser;
use icinga2_usersyncd::{cli::Cli, logging};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use usersyncd_client::Icinga2Client;
use usersyncd_sync::{CancellationToken, Daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init_logging(&cli.log_level, cli.log_file.as_deref(), cli.json_logs)?;

    let settings = cli.load_settings()?;
    if cli.dump_config {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    let client = Icinga2Client::new(&settings.api)
        .with_context(|| format!("cannot set up API client for {}", settings.api.url))?;
    tracing::info!(url = %client.base_url(), queue = %settings.queue, "Starting icinga2-usersyncd");

    let shutdown = CancellationToken::new();
    let mut signals = Signals::install()?;
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let name = signals.recv().await;
            tracing::info!("Received {}, shutting down", name);
            shutdown.cancel();
        });
    }

    let daemon = Daemon::new(Arc::new(client), settings);
    daemon.run(shutdown).await?;

    tracing::info!("Stopped.");
    Ok(())
}

struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

impl Signals {
    fn install() -> anyhow::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt()).context("installing SIGINT handler")?,
            terminate: signal(SignalKind::terminate()).context("installing SIGTERM handler")?,
            quit: signal(SignalKind::quit()).context("installing SIGQUIT handler")?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
            _ = self.quit.recv() => "SIGQUIT",
        }
    }
}
