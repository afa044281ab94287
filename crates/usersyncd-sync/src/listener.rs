//! Event-driven reconciliation
//!
//! The listener seeds its set of known host names from a full listing,
//! subscribes to host create/delete events, and turns each event into a
//! credential add or remove. Per-event failures are logged and skipped;
//! a failure of the stream itself ends [`EventListener::run`] so the
//! daemon can reconnect with a fresh snapshot.

use futures::StreamExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};
use usersyncd_client::{DirectoryClient, EventStream, Subscription};
use usersyncd_core::{Error, Event, EventKind, Result, HOST_TYPE};

use crate::credentials::CredentialManager;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Unconnected,
    Connected,
    Closed,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unconnected => write!(f, "unconnected"),
            Self::Connected => write!(f, "connected"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// What applying one event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not a host event.
    Ignored,
    Added,
    Removed,
    /// The host is gone or filtered out by the time of the re-fetch.
    NotQualified,
    /// Delete of a name that is not known.
    Unknown,
}

/// Incremental state: the host names believed to be live, and the rules
/// for updating them from events.
pub struct EventReconciler {
    client: Arc<dyn DirectoryClient>,
    manager: CredentialManager,
    filter: Option<String>,
    known: HashSet<String>,
}

impl EventReconciler {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        manager: CredentialManager,
        filter: Option<String>,
        seed: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            client,
            manager,
            filter,
            known: seed.into_iter().collect(),
        }
    }

    pub fn known_names(&self) -> &HashSet<String> {
        &self.known
    }

    /// Apply one event. Errors are per-event and never poison the state.
    pub async fn apply(&mut self, event: &Event) -> Result<Outcome> {
        if !event.is_about(HOST_TYPE) {
            debug!(object_type = %event.object_type, "discarding event");
            return Ok(Outcome::Ignored);
        }
        let name = event.object_name.as_str();

        match event.kind {
            EventKind::Created => {
                // The payload only names the host; check it still exists
                // and passes the filter before issuing a credential.
                let found = self
                    .client
                    .get_resource(name, self.filter.as_deref())
                    .await
                    .map_err(|e| Error::operation("fetch", name, e))?;
                if found.is_none() {
                    debug!(resource = name, "created host no longer qualifies");
                    return Ok(Outcome::NotQualified);
                }
                self.known.insert(name.to_string());
                self.manager.add(name).await?;
                info!(resource = name, "ApiUser added for new host");
                Ok(Outcome::Added)
            }
            EventKind::Deleted => {
                if !self.known.remove(name) {
                    debug!(resource = name, "delete for unknown host ignored");
                    return Ok(Outcome::Unknown);
                }
                self.manager.remove(name).await?;
                info!(resource = name, "ApiUser removed for deleted host");
                Ok(Outcome::Removed)
            }
        }
    }
}

struct Session {
    reconciler: EventReconciler,
    stream: EventStream,
}

struct State {
    phase: Phase,
    session: Option<Session>,
}

/// Rejects a second `connect()`/`run()` while one is in flight.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Marks the listener closed however `run()` exits, including when its
/// future is dropped.
struct CloseOnDrop<'a>(&'a EventListener);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        self.0.lock_state().phase = Phase::Closed;
    }
}

/// One subscription's worth of event reconciliation.
///
/// Lifecycle: `connect()` once, then `run()` once. A fresh listener is
/// built for every reconnect, so known names never carry over.
pub struct EventListener {
    client: Arc<dyn DirectoryClient>,
    manager: CredentialManager,
    queue: String,
    filter: Option<String>,
    busy: AtomicBool,
    state: Mutex<State>,
}

impl EventListener {
    pub fn new(
        client: Arc<dyn DirectoryClient>,
        manager: CredentialManager,
        queue: impl Into<String>,
        filter: Option<String>,
    ) -> Self {
        Self {
            client,
            manager,
            queue: queue.into(),
            filter,
            busy: AtomicBool::new(false),
            state: Mutex::new(State {
                phase: Phase::Unconnected,
                session: None,
            }),
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock_state().phase
    }

    /// Snapshot of known names; `None` unless connected and not yet running.
    pub fn known_names(&self) -> Option<HashSet<String>> {
        self.lock_state()
            .session
            .as_ref()
            .map(|s| s.reconciler.known_names().clone())
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: &str) -> Result<BusyGuard<'_>> {
        if self.busy.swap(true, Ordering::AcqRel) {
            return Err(Error::misuse(format!(
                "{}() while another connect/run is in progress",
                op
            )));
        }
        Ok(BusyGuard(&self.busy))
    }

    /// Seed known names from a full listing and open the subscription.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.enter("connect")?;
        let phase = self.phase();
        if phase != Phase::Unconnected {
            return Err(Error::misuse(format!("connect() on a {} listener", phase)));
        }

        debug!("[EventListener] Requesting list of Hosts...");
        let resources = self
            .client
            .list_resources(self.filter.as_deref())
            .await
            .map_err(|e| Error::connection(format!("listing hosts: {}", e)))?;

        let subscription = Subscription::hosts(self.queue.clone());
        let stream = self
            .client
            .subscribe(&subscription)
            .await
            .map_err(|e| Error::connection(format!("subscribing to {}: {}", self.queue, e)))?;

        let reconciler = EventReconciler::new(
            self.client.clone(),
            self.manager.clone(),
            self.filter.clone(),
            resources.into_iter().map(|r| r.name),
        );
        info!(
            known = reconciler.known_names().len(),
            queue = %self.queue,
            "[EventListener] Subscribed"
        );

        let mut state = self.lock_state();
        state.session = Some(Session { reconciler, stream });
        state.phase = Phase::Connected;
        Ok(())
    }

    /// Drain the event stream until it ends or fails.
    ///
    /// `Ok(())` means the server closed the stream; `Err(Stream)` means
    /// it broke. Either way the listener is closed and must be replaced.
    pub async fn run(&self) -> Result<()> {
        let _guard = self.enter("run")?;
        let Session {
            mut reconciler,
            mut stream,
        } = {
            let mut state = self.lock_state();
            match (state.phase, state.session.take()) {
                (Phase::Connected, Some(session)) => session,
                (phase, _) => {
                    return Err(Error::misuse(format!("run() on a {} listener", phase)));
                }
            }
        };
        let _closed = CloseOnDrop(self);

        let result = loop {
            match stream.next().await {
                None => {
                    info!("[EventListener] Event stream closed");
                    break Ok(());
                }
                Some(Ok(event)) => {
                    if let Err(e) = reconciler.apply(&event).await {
                        warn!("[EventListener] {}", e);
                    }
                }
                Some(Err(e)) if e.is_item_error() => {
                    warn!("[EventListener] Skipping event: {}", e);
                }
                Some(Err(e)) => {
                    warn!("[EventListener] Event stream failed: {}", e);
                    break Err(Error::stream(e));
                }
            }
        };

        drop(stream);
        result
    }
}
