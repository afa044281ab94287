//! usersyncd sync - keeps one ApiUser per Host
//!
//! Two reconcilers share a [`CredentialManager`]: the [`EventListener`]
//! applies host create/delete events as they stream in, and the
//! [`Comparator`] diffs full listings to correct whatever the stream
//! missed. The [`Daemon`] supervises both and reconnects on failure.

pub mod comparator;
pub mod credentials;
pub mod daemon;
pub mod listener;

pub use comparator::{Comparator, PassReport, SyncPlan};
pub use credentials::CredentialManager;
pub use daemon::{comparator_loop, Daemon};
pub use listener::{EventListener, EventReconciler, Outcome, Phase};
pub use tokio_util::sync::CancellationToken;
