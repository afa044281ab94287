//! Connection supervision
//!
//! Each cycle builds a fresh [`EventListener`], connects it, and runs it
//! alongside a comparator worker. When the listener's stream ends the
//! comparator is aborted and the whole cycle starts over after the
//! configured delay. Neither loop gives up; only the shutdown token
//! stops the daemon.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use usersyncd_client::DirectoryClient;
use usersyncd_core::{Result, Settings};

use crate::comparator::Comparator;
use crate::credentials::CredentialManager;
use crate::listener::EventListener;

pub struct Daemon {
    client: Arc<dyn DirectoryClient>,
    manager: CredentialManager,
    settings: Settings,
}

impl Daemon {
    pub fn new(client: Arc<dyn DirectoryClient>, settings: Settings) -> Self {
        let manager = CredentialManager::from_settings(client.clone(), &settings);
        Self {
            client,
            manager,
            settings,
        }
    }

    /// Run until `shutdown` is cancelled. Returns an error only for
    /// failures that retrying cannot fix.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        info!("Trying to connect the listener...");

        loop {
            let listener = EventListener::new(
                self.client.clone(),
                self.manager.clone(),
                self.settings.queue.clone(),
                self.settings.filter.clone(),
            );

            let connected = tokio::select! {
                r = listener.connect() => r,
                _ = shutdown.cancelled() => return Ok(()),
            };
            if let Err(e) = connected {
                if e.is_fatal() {
                    error!("Listener cannot be connected: {}", e);
                    return Err(e);
                }
                debug!("Listener not connected ({}). Making a retry after a timeout...", e);
                if !pause(self.settings.delay, &shutdown).await {
                    return Ok(());
                }
                continue;
            }
            info!("Listener connected.");

            let comparator = tokio::spawn(comparator_loop(
                self.client.clone(),
                self.manager.clone(),
                self.settings.filter.clone(),
                self.settings.delay,
                self.settings.full_sync_interval,
            ));

            let finished = tokio::select! {
                r = listener.run() => Some(r),
                _ = shutdown.cancelled() => None,
            };

            comparator.abort();
            if let Err(e) = comparator.await {
                if e.is_panic() {
                    error!("Comparator panicked: {}", e);
                }
            }

            match finished {
                None => return Ok(()),
                Some(Err(e)) if e.is_fatal() => {
                    error!("Listener failed: {}", e);
                    return Err(e);
                }
                Some(Err(e)) => warn!("Listener finished with an error: {}", e),
                Some(Ok(())) => {}
            }
            info!("Listener finished. Making a retry after a timeout...");

            if !pause(self.settings.delay, &shutdown).await {
                return Ok(());
            }
        }
    }
}

/// Run full passes until one succeeds, retrying after `delay` on error.
/// With an `interval`, keep running a pass every `interval` afterwards.
///
/// Never returns when `interval` is set; the daemon aborts the task.
pub async fn comparator_loop(
    client: Arc<dyn DirectoryClient>,
    manager: CredentialManager,
    filter: Option<String>,
    delay: Duration,
    interval: Option<Duration>,
) {
    loop {
        let comparator = Comparator::new(client.clone(), manager.clone(), filter.clone());
        match comparator.run().await {
            Ok(_) => match interval {
                Some(interval) => {
                    debug!("Next comparator pass in {:?}", interval);
                    tokio::time::sleep(interval).await;
                }
                None => break,
            },
            Err(e) => {
                debug!("Comparator exited with an error ({}). Making a retry after a timeout...", e);
                tokio::time::sleep(delay).await;
            }
        }
    }

    info!("Comparator finished.");
}

/// Sleep for `delay` unless shut down first. Returns false on shutdown.
async fn pause(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.cancelled() => false,
    }
}
